//! In-memory store for tests and ephemeral deployments.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use turnrelay_core::error::PersistenceError;
use turnrelay_core::store::{DecisionLog, HistoryStore};
use turnrelay_core::turn::{DecisionRecord, Turn};

/// Keeps each session's turns in a Vec in append order.
#[derive(Default)]
pub struct InMemoryStore {
    sessions: Arc<RwLock<HashMap<String, Vec<Turn>>>>,
    decisions: Arc<RwLock<Vec<DecisionRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored turn of a session, oldest first.
    pub async fn turns(&self, session_id: &str) -> Vec<Turn> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Every decision record written so far.
    pub async fn decisions(&self) -> Vec<DecisionRecord> {
        self.decisions.read().await.clone()
    }
}

#[async_trait]
impl HistoryStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn read_recent(&self, session_id: &str, limit: usize) -> Result<Vec<Turn>, PersistenceError> {
        let sessions = self.sessions.read().await;
        let Some(turns) = sessions.get(session_id) else {
            return Ok(Vec::new());
        };

        // Stable sort: equal timestamps keep append order.
        let mut ordered = turns.clone();
        ordered.sort_by_key(|t| t.timestamp);
        let skip = ordered.len().saturating_sub(limit);
        Ok(ordered.split_off(skip))
    }

    async fn append(&self, turn: Turn) -> Result<(), PersistenceError> {
        self.sessions
            .write()
            .await
            .entry(turn.session_id.clone())
            .or_default()
            .push(turn);
        Ok(())
    }
}

#[async_trait]
impl DecisionLog for InMemoryStore {
    async fn record(&self, record: DecisionRecord) -> Result<(), PersistenceError> {
        self.decisions.write().await.push(record);
        Ok(())
    }
}
