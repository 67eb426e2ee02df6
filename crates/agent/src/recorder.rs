//! Turn recording: the user turn and the assistant turn of one exchange.
//!
//! The two appends are independent. A failure of either is logged and
//! reported back, never raised; a lost turn degrades future context but
//! must not fail the reply that was already produced.

use std::sync::Arc;
use tracing::warn;
use turnrelay_core::store::HistoryStore;
use turnrelay_core::turn::Turn;

/// One finished exchange, ready to be written.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub session_id: String,
    pub user_id: String,
    /// The text the human sent, before any context augmentation.
    pub query: String,
    pub model: String,
    /// The reply with the escalation marker removed.
    pub reply: String,
}

/// Which writes went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordReport {
    pub user_saved: bool,
    pub assistant_saved: bool,
}

impl RecordReport {
    pub fn is_complete(&self) -> bool {
        self.user_saved && self.assistant_saved
    }
}

#[derive(Clone)]
pub struct TurnRecorder {
    store: Arc<dyn HistoryStore>,
}

impl TurnRecorder {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    /// Append the user turn, then the assistant turn.
    pub async fn record(&self, exchange: Exchange) -> RecordReport {
        let user = Turn::user(&exchange.session_id, &exchange.user_id, exchange.query);
        let user_saved = self.append(user).await;

        let assistant = Turn::assistant(
            exchange.session_id,
            exchange.user_id,
            exchange.reply,
            exchange.model,
        );
        let assistant_saved = self.append(assistant).await;

        RecordReport {
            user_saved,
            assistant_saved,
        }
    }

    async fn append(&self, turn: Turn) -> bool {
        let role = turn.role;
        let session = turn.session_id.clone();
        match self.store.append(turn).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    store = %self.store.name(),
                    session = %session,
                    role = %role,
                    error = %e,
                    "Failed to persist turn"
                );
                false
            }
        }
    }
}
