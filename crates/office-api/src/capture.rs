//! Audit capture middleware: classifies each mutating request, tees the
//! request and response bodies, and writes one audit row per request.

use crate::error::ApiError;
use crate::server::AppState;
use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use office_audit::{describe, should_skip, Activity, Classification};
use office_types::ActorContext;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Upper bound on buffered request and response bodies.
const MAX_CAPTURED_BODY: usize = 4 * 1024 * 1024;

pub async fn capture_audit(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    if should_skip(&path) {
        debug!(%method, path = %path, "audit skipped");
        return next.run(req).await;
    }
    let Some(class) = state.classifier.classify(method.as_str(), &path) else {
        return next.run(req).await;
    };
    let Some(actor) = req.extensions().get::<ActorContext>().cloned() else {
        debug!(%method, path = %path, "no actor, audit skipped");
        return next.run(req).await;
    };

    // The handler and the audit write share one spawned task so a client
    // disconnect cannot drop the row after the mutation committed.
    let work = tokio::spawn(async move {
        let started = Instant::now();
        let (parts, body) = req.into_parts();
        let request_body = if method == Method::POST || method == Method::PUT {
            match to_bytes(body, MAX_CAPTURED_BODY).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    let message = format!("failed to read request body: {}", e);
                    let failure = Failure {
                        method: &method,
                        path: &path,
                        status: StatusCode::BAD_REQUEST,
                        message: message.clone(),
                    };
                    record_failure(&state, &actor, class, failure).await;
                    return ApiError::bad_request(message).into_response();
                }
            }
        } else {
            Bytes::new()
        };
        let req = Request::from_parts(parts, Body::from(request_body.clone()));

        let response = next.run(req).await;
        let (parts, body) = response.into_parts();
        let response_body = match to_bytes(body, MAX_CAPTURED_BODY).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, path = %path, "failed to buffer response body");
                let failure = Failure {
                    method: &method,
                    path: &path,
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: format!("failed to buffer response body: {}", e),
                };
                record_failure(&state, &actor, class, failure).await;
                return ApiError::internal("failed to produce response body").into_response();
            }
        };

        let captured = Captured {
            method: &method,
            path: &path,
            status: parts.status,
            request_body: &request_body,
            response_body: &response_body,
        };
        record(&state, &actor, class, captured, started).await;

        Response::from_parts(parts, Body::from(response_body))
    });

    match work.await {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "audited request task failed");
            ApiError::internal("request handling failed").into_response()
        }
    }
}

struct Captured<'a> {
    method: &'a Method,
    path: &'a str,
    status: StatusCode,
    request_body: &'a [u8],
    response_body: &'a [u8],
}

/// A request that ends without a usable response body to inspect.
struct Failure<'a> {
    method: &'a Method,
    path: &'a str,
    status: StatusCode,
    message: String,
}

fn activity_for(
    actor: &ActorContext,
    class: Classification,
    method: &Method,
    path: &str,
    status: StatusCode,
) -> Activity {
    let metadata = json!({
        "method": method.as_str(),
        "endpoint": path,
        "status_code": status.as_u16(),
        "user_agent": actor.user_agent,
    });
    Activity::new(class.action, class.entity_type)
        .entity(class.entity_id)
        .description(describe(class.action, method.as_str(), path))
        .with_metadata_json(metadata)
}

async fn record_failure(
    state: &AppState,
    actor: &ActorContext,
    class: Classification,
    failure: Failure<'_>,
) {
    let activity = activity_for(actor, class, failure.method, failure.path, failure.status);
    if let Err(e) = state
        .audit
        .log_failed_activity(Some(actor), activity, failure.message)
        .await
    {
        warn!(error = %e, action = %class.action, path = failure.path, "failed to write audit row");
    }
}

async fn record(
    state: &AppState,
    actor: &ActorContext,
    class: Classification,
    captured: Captured<'_>,
    started: Instant,
) {
    if captured.status.as_u16() >= 400 {
        let failure = Failure {
            method: captured.method,
            path: captured.path,
            status: captured.status,
            message: error_message(captured.response_body),
        };
        record_failure(state, actor, class, failure).await;
        return;
    }

    let result = {
        let mut activity =
            activity_for(actor, class, captured.method, captured.path, captured.status);
        if class.entity_id == 0 {
            if let Some(id) = response_id(captured.response_body) {
                activity = activity.entity(id);
            }
        }
        if let Ok(values) = serde_json::from_slice::<Value>(captured.request_body) {
            activity = activity.with_new_json(values);
        }
        state
            .audit
            .log_with_duration(Some(actor), activity, started.elapsed())
            .await
    };

    if let Err(e) = result {
        warn!(error = %e, action = %class.action, path = captured.path, "failed to write audit row");
    }
}

/// `error` field of a JSON error body, or a generic message.
fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| "Request failed".to_string())
}

fn response_id(body: &[u8]) -> Option<u64> {
    serde_json::from_slice::<Value>(body)
        .ok()?
        .get("id")?
        .as_u64()
        .filter(|id| *id > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_users;
    use crate::server::Backends;
    use axum::middleware::from_fn_with_state;
    use axum::routing::post;
    use axum::Router;
    use office_store::InMemoryUserDirectory;
    use office_types::{AuditAction, AuditFilter, AuditStore, Role};
    use tower::util::ServiceExt;

    #[tokio::test]
    async fn unbufferable_response_writes_failed_row() {
        let backends = Backends::in_memory(InMemoryUserDirectory::with_users(default_users()));
        let audit_log = Arc::clone(&backends.audit_log);
        let state = Arc::new(AppState::new(backends, 365));
        let app = Router::new()
            .route(
                "/api/tasks",
                post(|| async { "x".repeat(MAX_CAPTURED_BODY + 1) }),
            )
            .layer(from_fn_with_state(Arc::clone(&state), capture_audit))
            .with_state(state);

        let mut req = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/api/tasks")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut().insert(ActorContext::new(4, Role::Secretary));
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let rows = audit_log.scan(&AuditFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].success);
        assert_eq!(rows[0].action, AuditAction::TaskCreate);
        assert!(rows[0]
            .error_message
            .as_deref()
            .unwrap()
            .starts_with("failed to buffer response body"));
        assert!(rows[0].metadata.contains("\"status_code\":500"));
    }

    #[test]
    fn error_message_falls_back() {
        assert_eq!(error_message(br#"{"error":"task 9 not found"}"#), "task 9 not found");
        assert_eq!(error_message(b"<html>"), "Request failed");
        assert_eq!(error_message(br#"{"message":"x"}"#), "Request failed");
    }

    #[test]
    fn response_id_reads_top_level_id() {
        assert_eq!(response_id(br#"{"id": 12, "status": "not_started"}"#), Some(12));
        assert_eq!(response_id(br#"{"id": 0}"#), None);
        assert_eq!(response_id(b""), None);
    }
}
