//! # turnrelay core
//!
//! Domain types, traits, and error definitions for the turnrelay
//! conversational relay. Every collaborator of the chat pipeline (history
//! store, decision log, model invoker) is defined as a trait here and
//! implemented in its own crate, so the pipeline can be exercised against
//! in-process stubs.

pub mod error;
pub mod message;
pub mod provider;
pub mod store;
pub mod turn;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ModelError, PersistenceError, Result};
pub use message::{Message, Role};
pub use provider::{ModelInvoker, ModelRequest};
pub use store::{DecisionLog, HistoryStore};
pub use turn::{DecisionRecord, Turn};
