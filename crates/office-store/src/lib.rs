//! Store implementations: in-memory (always) and SQLite (feature `sqlite`).

mod directory;
mod memory;

#[cfg(feature = "sqlite")]
mod sqlite;

pub use directory::{InMemoryDocumentDirectory, InMemoryUserDirectory};
pub use memory::{InMemoryAuditStore, InMemoryTaskStore};
pub use office_types::{AuditStore, DocumentDirectory, StoreError, TaskStore, UserDirectory};

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteAuditStore, SqliteTaskStore};
