//! PostgREST store over the hosted-Postgres table API.
//!
//! Talks to `{url}/rest/v1/{table}` with the service key sent both as
//! `apikey` and as a Bearer token. Reads ask for the newest rows
//! (`order=timestamp.desc,id.desc&limit=N`) and flip them into chronological
//! order. The turns table needs an `id` identity column so rows that share a
//! timestamp still come back in insertion order.
//!
//! Construction never fails: a missing URL or key surfaces as
//! [`PersistenceError::NotConfigured`] on the first read or write.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;
use turnrelay_config::StoreConfig;
use turnrelay_core::error::PersistenceError;
use turnrelay_core::message::Role;
use turnrelay_core::store::{DecisionLog, HistoryStore};
use turnrelay_core::turn::{DecisionRecord, Turn};

use crate::{format_timestamp, parse_timestamp};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RestStore {
    url: Option<String>,
    key: Option<String>,
    turns_table: String,
    decisions_table: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl RestStore {
    pub fn new(url: Option<String>, key: Option<String>) -> Self {
        let defaults = StoreConfig::default();
        Self {
            url: url
                .filter(|u| !u.trim().is_empty())
                .map(|u| u.trim_end_matches('/').to_string()),
            key: key.filter(|k| !k.trim().is_empty()),
            turns_table: defaults.turns_table,
            decisions_table: defaults.decisions_table,
            timeout: DEFAULT_TIMEOUT,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.url.clone(), config.key.clone())
            .with_tables(&config.turns_table, &config.decisions_table)
    }

    pub fn with_tables(mut self, turns: impl Into<String>, decisions: impl Into<String>) -> Self {
        self.turns_table = turns.into();
        self.decisions_table = decisions.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Table URL and key, or the lazily-reported configuration error.
    fn endpoint(&self, table: &str) -> Result<(String, &str), PersistenceError> {
        match (&self.url, &self.key) {
            (Some(url), Some(key)) => Ok((format!("{url}/rest/v1/{table}"), key.as_str())),
            _ => Err(PersistenceError::NotConfigured(
                "STORE_URL and STORE_KEY must be set".into(),
            )),
        }
    }

    async fn insert<T: Serialize + ?Sized>(&self, table: &str, row: &T) -> Result<(), PersistenceError> {
        let (url, key) = self.endpoint(table)?;
        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header("apikey", key)
            .bearer_auth(key)
            .header("Prefer", "return=minimal")
            .json(row)
            .send()
            .await
            .map_err(|e| PersistenceError::Storage(format!("INSERT into {table}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PersistenceError::Storage(format!(
                "INSERT into {table} returned {status}: {body}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for RestStore {
    fn name(&self) -> &str {
        "rest"
    }

    async fn read_recent(&self, session_id: &str, limit: usize) -> Result<Vec<Turn>, PersistenceError> {
        let (url, key) = self.endpoint(&self.turns_table)?;
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .header("apikey", key)
            .bearer_auth(key)
            .query(&[
                ("select", "*".to_string()),
                ("session_id", format!("eq.{session_id}")),
                ("order", "timestamp.desc,id.desc".to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await
            .map_err(|e| PersistenceError::QueryFailed(format!("read_recent: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PersistenceError::QueryFailed(format!(
                "read_recent returned {status}: {body}"
            )));
        }

        let rows: Vec<TurnRow> = response
            .json()
            .await
            .map_err(|e| PersistenceError::QueryFailed(format!("read_recent payload: {e}")))?;

        let mut turns = rows
            .into_iter()
            .map(TurnRow::into_turn)
            .collect::<Result<Vec<_>, _>>()?;
        turns.reverse();
        debug!(session = %session_id, turns = turns.len(), "Loaded history");
        Ok(turns)
    }

    async fn append(&self, turn: Turn) -> Result<(), PersistenceError> {
        let row = TurnRow::from_turn(&turn);
        self.insert(&self.turns_table, &row).await
    }
}

#[async_trait]
impl DecisionLog for RestStore {
    async fn record(&self, record: DecisionRecord) -> Result<(), PersistenceError> {
        let row = DecisionRow {
            session_id: &record.session_id,
            user_id: &record.user_id,
            model_used: &record.model_used,
            flags: &record.flags,
            escalation_needed: record.escalation_needed,
            escalation_reason: &record.escalation_reason,
            policy: &record.policy,
            timestamp: format_timestamp(&record.timestamp),
        };
        self.insert(&self.decisions_table, &row).await
    }
}

// --- Wire rows ---

#[derive(Debug, Serialize, Deserialize)]
struct TurnRow {
    session_id: String,
    user_id: String,
    role: String,
    content: String,
    #[serde(default)]
    model_used: Option<String>,
    timestamp: String,
}

impl TurnRow {
    fn from_turn(turn: &Turn) -> Self {
        Self {
            session_id: turn.session_id.clone(),
            user_id: turn.user_id.clone(),
            role: turn.role.as_str().to_string(),
            content: turn.content.clone(),
            model_used: turn.model_used.clone(),
            timestamp: format_timestamp(&turn.timestamp),
        }
    }

    fn into_turn(self) -> Result<Turn, PersistenceError> {
        Ok(Turn {
            role: Role::from_str(&self.role).map_err(PersistenceError::QueryFailed)?,
            timestamp: parse_timestamp(&self.timestamp).ok_or_else(|| {
                PersistenceError::QueryFailed(format!("bad timestamp '{}'", self.timestamp))
            })?,
            session_id: self.session_id,
            user_id: self.user_id,
            content: self.content,
            model_used: self.model_used,
        })
    }
}

#[derive(Debug, Serialize)]
struct DecisionRow<'a> {
    session_id: &'a str,
    user_id: &'a str,
    model_used: &'a str,
    flags: &'a serde_json::Map<String, serde_json::Value>,
    escalation_needed: bool,
    escalation_reason: &'a str,
    policy: &'a str,
    timestamp: String,
}
