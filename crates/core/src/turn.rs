//! Stored conversation records.
//!
//! A [`Turn`] is one message in a session's append-only log. A
//! [`DecisionRecord`] is the write-once audit entry produced by each chat
//! invocation; the relay never reads it back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{Message, Role};

/// One stored message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Groups turns into one conversation. Never empty.
    pub session_id: String,

    /// The human party of the conversation
    pub user_id: String,

    /// Fixed at creation
    pub role: Role,

    /// For assistant turns, the reply after the escalation marker was removed
    pub content: String,

    /// Which model produced an assistant turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,

    /// Assigned when the turn is written
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// A user turn holding the literal text the human sent.
    pub fn user(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            role: Role::User,
            content: content.into(),
            model_used: None,
            timestamp: Utc::now(),
        }
    }

    /// An assistant turn produced by `model`.
    pub fn assistant(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        content: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            role: Role::Assistant,
            content: content.into(),
            model_used: Some(model.into()),
            timestamp: Utc::now(),
        }
    }

    /// The model-facing view of this turn.
    pub fn to_message(&self) -> Message {
        Message {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// Audit entry written once per chat invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub session_id: String,
    pub user_id: String,
    pub model_used: String,

    /// Routing metadata the caller supplied alongside the query
    #[serde(default)]
    pub flags: serde_json::Map<String, serde_json::Value>,

    pub escalation_needed: bool,
    pub escalation_reason: String,

    /// `name@version` of the policy the model was given
    pub policy: String,

    pub timestamp: DateTime<Utc>,
}
