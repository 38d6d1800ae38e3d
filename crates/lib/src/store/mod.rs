//! Dialogue persistence: a bounded SQLite connection pool and the `line_dialogue` table on top
//! of it.
//!
//! Inserts report duplicates as [`InsertOutcome::Duplicate`] rather than as errors; every other
//! failure is a [`StoreError`] the caller must handle.

mod dialogue;
mod pool;

pub use dialogue::{DialogueRecord, DialogueStore, Row, StoredDialogue, TABLE};
pub use pool::{ConnectionPool, PoolOptions};

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("database io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection pool closed")]
    PoolClosed,
    #[error("database task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("unknown column: {0}")]
    UnknownColumn(String),
    #[error("update needs at least one column to set")]
    EmptyUpdate,
    #[error("delete needs at least one filter column")]
    EmptyFilter,
}

/// Result of an idempotent insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Row stored; carries the new row id.
    Inserted(i64),
    /// An identical row already exists; nothing was written.
    Duplicate,
}

/// Where the webhook dispatcher records inbound messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn record(&self, record: DialogueRecord) -> Result<InsertOutcome, StoreError>;
}
