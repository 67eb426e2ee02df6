//! Error types for the turnrelay domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the model side is fatal to a
//! chat invocation, the persistence side never is.

use thiserror::Error;

/// The top-level error type for turnrelay operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model errors ---
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    // --- Persistence errors ---
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    // --- Request errors ---
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the single upstream model call.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// The API credential (or another required setting) is missing.
    /// Raised before any network I/O.
    #[error("Model invoker not configured: {0}")]
    NotConfigured(String),

    /// The upstream API answered with a non-success status.
    #[error("Upstream API error (status: {status_code}): {body}")]
    Upstream { status_code: u16, body: String },

    #[error("Model request timed out after {after_secs}s")]
    Timeout { after_secs: u64 },

    #[error("Network error: {0}")]
    Network(String),

    /// A success status whose payload carries no usable text.
    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),
}

/// Failures of the history store or decision log.
#[derive(Debug, Clone, Error)]
pub enum PersistenceError {
    #[error("Store not configured: {0}")]
    NotConfigured(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}
