//! Audit trail: activity records for every classified mutation, plus the
//! read side (queries, per-user and per-entity rollups, statistics,
//! retention cleanup and CSV export).

mod activity;
pub mod classifier;
mod error;
pub mod export;
mod service;

pub use activity::Activity;
pub use classifier::{describe, should_skip, Classification, PathRouteClassifier, RouteClassifier};
pub use error::AuditError;
pub use export::ExportRow;
pub use service::{AuditService, DEFAULT_RETENTION_DAYS, EXPORT_LIMIT, MIN_RETENTION_DAYS};
