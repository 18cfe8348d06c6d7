use office_types::{DirectoryError, StoreError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("no actor on the request")]
    MissingActor,

    #[error("failed to serialize audit payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("csv export failed: {0}")]
    Export(#[from] csv::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}
