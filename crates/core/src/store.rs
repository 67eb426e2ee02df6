//! Storage traits: the per-session turn log and the decision audit log.
//!
//! Implementations: PostgREST over HTTP, SQLite, in-memory (for testing),
//! none (no-op). Callers in the chat pipeline treat every error from these
//! traits as non-fatal.

use async_trait::async_trait;

use crate::error::PersistenceError;
use crate::turn::{DecisionRecord, Turn};

/// Default number of turns loaded per invocation.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Append-only log of turns, grouped by session.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// The backend name (e.g., "rest", "sqlite", "none").
    fn name(&self) -> &str;

    /// The `limit` most recent turns of a session, oldest first.
    ///
    /// An unknown session yields an empty vector, not an error.
    async fn read_recent(
        &self,
        session_id: &str,
        limit: usize,
    ) -> std::result::Result<Vec<Turn>, PersistenceError>;

    /// Append one turn to the end of its session.
    async fn append(&self, turn: Turn) -> std::result::Result<(), PersistenceError>;
}

/// Write-only sink for per-invocation decision records.
#[async_trait]
pub trait DecisionLog: Send + Sync {
    async fn record(&self, record: DecisionRecord) -> std::result::Result<(), PersistenceError>;
}
