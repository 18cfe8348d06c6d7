//! Axum server: shared state, router and store wiring.

use crate::actor::resolve_actor;
use crate::capture::capture_audit;
use crate::config::{ServerConfig, StoreKind};
use crate::{audit, tasks};
use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post, put};
use axum::Router;
use office_audit::{AuditService, PathRouteClassifier, RouteClassifier};
use office_store::{InMemoryAuditStore, InMemoryDocumentDirectory, InMemoryTaskStore, InMemoryUserDirectory};
use office_types::{AuditStore, DocumentDirectory, StoreError, TaskStore, UserDirectory};
use office_workflow::TaskEngine;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub engine: TaskEngine,
    pub audit: Arc<AuditService>,
    pub users: Arc<dyn UserDirectory + Send + Sync>,
    pub classifier: Arc<dyn RouteClassifier>,
    pub default_retention_days: u32,
}

/// Stores and directories behind the engine and audit service.
pub struct Backends {
    pub tasks: Arc<dyn TaskStore + Send + Sync>,
    pub audit_log: Arc<dyn AuditStore + Send + Sync>,
    pub users: Arc<dyn UserDirectory + Send + Sync>,
    pub documents: Arc<dyn DocumentDirectory + Send + Sync>,
}

impl Backends {
    /// In-memory stores seeded with `users`.
    pub fn in_memory(users: InMemoryUserDirectory) -> Self {
        Self {
            tasks: Arc::new(InMemoryTaskStore::new()),
            audit_log: Arc::new(InMemoryAuditStore::new()),
            users: Arc::new(users),
            documents: Arc::new(InMemoryDocumentDirectory::new()),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, StoreError> {
        let users = InMemoryUserDirectory::with_users(config.seed_users.clone());
        match config.store {
            StoreKind::Memory => Ok(Self::in_memory(users)),
            #[cfg(feature = "sqlite")]
            StoreKind::Sqlite => Ok(Self {
                tasks: Arc::new(office_store::SqliteTaskStore::new(&config.db_path)?),
                audit_log: Arc::new(office_store::SqliteAuditStore::new(&config.db_path)?),
                users: Arc::new(users),
                documents: Arc::new(InMemoryDocumentDirectory::new()),
            }),
            #[cfg(not(feature = "sqlite"))]
            StoreKind::Sqlite => Err(StoreError::Other(
                "sqlite store requested but the sqlite feature is not enabled".to_string(),
            )),
        }
    }
}

impl AppState {
    pub fn new(backends: Backends, default_retention_days: u32) -> Self {
        let engine = TaskEngine::new(
            Arc::clone(&backends.tasks),
            Arc::clone(&backends.users),
            Arc::clone(&backends.documents),
        );
        let audit = AuditService::new(
            backends.audit_log,
            Arc::clone(&backends.users),
            backends.tasks,
            backends.documents,
        );
        Self {
            engine,
            audit: Arc::new(audit),
            users: backends.users,
            classifier: Arc::new(PathRouteClassifier),
            default_retention_days,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/api/tasks", post(tasks::create).get(tasks::list))
        .route(
            "/api/tasks/:id",
            get(tasks::get_one).put(tasks::update).delete(tasks::remove),
        )
        .route("/api/tasks/:id/assign", put(tasks::assign))
        .route("/api/tasks/:id/status", put(tasks::update_status))
        .route("/api/tasks/:id/processing", put(tasks::update_processing))
        .route("/api/tasks/:id/submit-review", put(tasks::submit_review))
        .route("/api/tasks/:id/forward", post(tasks::forward))
        .route("/api/tasks/:id/delegate", post(tasks::delegate))
        .route("/api/tasks/:id/history", get(tasks::history))
        .route("/api/tasks/:id/workflow", get(tasks::workflow))
        .route(
            "/api/tasks/:id/comments",
            get(tasks::comments).post(tasks::add_comment),
        )
        .route("/api/audit/logs", get(audit::logs))
        .route("/api/audit/user-activity/:user_id", get(audit::user_activity))
        .route("/api/audit/trail/:entity_type/:entity_id", get(audit::trail))
        .route("/api/audit/summary", get(audit::summary))
        .route("/api/audit/statistics", get(audit::statistics))
        .route("/api/audit/export", get(audit::export))
        .route("/api/audit/cleanup", delete(audit::cleanup))
        // Outermost layer last: the actor is resolved before capture runs.
        .layer(from_fn_with_state(Arc::clone(&state), capture_audit))
        .layer(from_fn_with_state(Arc::clone(&state), resolve_actor))
        .with_state(state);

    Router::new()
        .route("/health", get(handle_health))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn handle_health() -> &'static str {
    "ok"
}
