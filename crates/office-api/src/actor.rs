//! Resolves the acting user from `X-User-Id` and attaches an `ActorContext`.

use crate::error::ApiError;
use crate::server::AppState;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use office_types::{ActorContext, UserId};
use std::net::SocketAddr;
use std::sync::Arc;

pub const USER_ID_HEADER: &str = "x-user-id";

pub async fn resolve_actor(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user_id: UserId = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| ApiError::unauthorized("missing or invalid X-User-Id header"))?;

    let user = state
        .users
        .get_user(user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized(format!("unknown user {}", user_id)))?;
    if !user.is_active {
        return Err(ApiError::forbidden(format!("user {} is inactive", user_id)));
    }

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let actor = ActorContext {
        user_id,
        role: user.role,
        ip_address: client_ip(req.headers(), peer),
        user_agent: req
            .headers()
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string(),
    };
    req.extensions_mut().insert(actor);
    Ok(next.run(req).await)
}

/// First `X-Forwarded-For` hop, then `X-Real-IP`, then the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    if let Some(first) = header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return first.to_string();
    }
    if let Some(real) = header("x-real-ip") {
        return real.to_string();
    }
    peer.map(|p| p.ip().to_string()).unwrap_or_default()
}
