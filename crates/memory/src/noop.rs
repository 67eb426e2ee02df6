//! No-op store. Disables conversation memory entirely.

use async_trait::async_trait;
use turnrelay_core::error::PersistenceError;
use turnrelay_core::store::{DecisionLog, HistoryStore};
use turnrelay_core::turn::{DecisionRecord, Turn};

/// Stores nothing; every session looks new.
pub struct NoopStore;

#[async_trait]
impl HistoryStore for NoopStore {
    fn name(&self) -> &str {
        "none"
    }

    async fn read_recent(&self, _session_id: &str, _limit: usize) -> Result<Vec<Turn>, PersistenceError> {
        Ok(Vec::new())
    }

    async fn append(&self, _turn: Turn) -> Result<(), PersistenceError> {
        Ok(())
    }
}

#[async_trait]
impl DecisionLog for NoopStore {
    async fn record(&self, _record: DecisionRecord) -> Result<(), PersistenceError> {
        Ok(())
    }
}
