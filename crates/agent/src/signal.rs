//! Escalation signal extraction.
//!
//! The policy asks the model to flag conversations that need a human by
//! embedding an HTML comment in its reply:
//!
//! ```text
//! marker = "<!--" WS* "ESCALATE" WS* ":" reason "-->"
//! reason = any characters, shortest match, may span lines
//! ```
//!
//! `ESCALATE` matches case-insensitively. Only the first marker counts:
//! it is removed from the visible text and its reason is reported. Any
//! later markers are left in place.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static ESCALATION_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<!--\s*ESCALATE\s*:(.*?)-->").expect("static escalation pattern")
});

/// A model reply split into its visible text and the escalation signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedReply {
    /// What the human sees.
    pub text: String,
    pub escalation_needed: bool,
    /// Empty when no escalation was signalled.
    pub escalation_reason: String,
}

impl ExtractedReply {
    /// The reply as-is, with no signal.
    pub fn passthrough(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            escalation_needed: false,
            escalation_reason: String::new(),
        }
    }
}

/// Find the first escalation marker in `raw` and split it out.
///
/// Without a marker the text is returned byte-for-byte, untrimmed.
pub fn extract_escalation(raw: &str) -> ExtractedReply {
    let Some(caps) = ESCALATION_MARKER.captures(raw) else {
        return ExtractedReply::passthrough(raw);
    };
    let (Some(marker), Some(reason)) = (caps.get(0), caps.get(1)) else {
        return ExtractedReply::passthrough(raw);
    };

    let mut text = String::with_capacity(raw.len() - marker.len());
    text.push_str(&raw[..marker.start()]);
    text.push_str(&raw[marker.end()..]);

    ExtractedReply {
        text: text.trim().to_string(),
        escalation_needed: true,
        escalation_reason: reason.as_str().trim().to_string(),
    }
}
