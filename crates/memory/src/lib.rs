//! History stores and decision logs for turnrelay.
//!
//! Every backend implements both [`HistoryStore`] and [`DecisionLog`]; the
//! composition root picks one with [`build_from_config`].

pub mod in_memory;
pub mod noop;
pub mod rest;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use noop::NoopStore;
pub use rest::RestStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use std::sync::Arc;
use tracing::info;
use turnrelay_config::StoreConfig;
use turnrelay_core::error::PersistenceError;
use turnrelay_core::store::{DecisionLog, HistoryStore};

/// The store pair handed to the chat pipeline.
#[derive(Clone)]
pub struct Stores {
    pub history: Arc<dyn HistoryStore>,
    pub decisions: Arc<dyn DecisionLog>,
}

impl Stores {
    /// Use one backend for both roles.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: HistoryStore + DecisionLog + 'static,
    {
        Self {
            history: store.clone(),
            decisions: store,
        }
    }
}

/// Build the configured backend.
///
/// The REST backend never fails here: missing URL or key is reported on
/// first access. SQLite is opened (and migrated) eagerly.
pub async fn build_from_config(config: &StoreConfig) -> Result<Stores, PersistenceError> {
    let stores = match config.backend.as_str() {
        "rest" => Stores::shared(Arc::new(RestStore::from_config(config))),
        #[cfg(feature = "sqlite")]
        "sqlite" => Stores::shared(Arc::new(SqliteStore::open(&config.sqlite_path).await?)),
        "memory" => Stores::shared(Arc::new(InMemoryStore::new())),
        "none" => Stores::shared(Arc::new(NoopStore)),
        other => {
            return Err(PersistenceError::NotConfigured(format!(
                "store backend '{other}' is not available in this build"
            )));
        }
    };
    info!(backend = %stores.history.name(), "History store ready");
    Ok(stores)
}

/// Fixed-width RFC 3339 (microseconds, `Z`) so text order is time order.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Accepts RFC 3339 and zone-less ISO 8601 (read as UTC).
pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}
