//! SQLite store.
//!
//! Uses a single SQLite database file with two tables:
//! - `turns`: the append-only conversation log
//! - `decisions`: the write-once audit log
//!
//! Triggers reject UPDATE and DELETE on both tables. Timestamps are stored
//! as fixed-width RFC 3339 text; the integer rowid breaks ties so that read
//! order equals write order.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use turnrelay_core::error::PersistenceError;
use turnrelay_core::message::Role;
use turnrelay_core::store::{DecisionLog, HistoryStore};
use turnrelay_core::turn::{DecisionRecord, Turn};

use crate::{format_timestamp, parse_timestamp};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) a database, e.g. `sqlite://turnrelay.db`.
    pub async fn open(path: &str) -> Result<Self, PersistenceError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| PersistenceError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| PersistenceError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite history store initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), PersistenceError> {
        let statements: [(&str, &str); 8] = [
            (
                "turns table",
                r#"
                CREATE TABLE IF NOT EXISTS turns (
                    id          INTEGER PRIMARY KEY AUTOINCREMENT,
                    session_id  TEXT NOT NULL CHECK (session_id <> ''),
                    user_id     TEXT NOT NULL,
                    role        TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
                    content     TEXT NOT NULL,
                    model_used  TEXT,
                    timestamp   TEXT NOT NULL
                )
                "#,
            ),
            (
                "turns index",
                "CREATE INDEX IF NOT EXISTS idx_turns_session_ts ON turns(session_id, timestamp DESC, id DESC)",
            ),
            (
                "turns update guard",
                r#"
                CREATE TRIGGER IF NOT EXISTS turns_no_update BEFORE UPDATE ON turns BEGIN
                    SELECT RAISE(ABORT, 'turns are append-only');
                END
                "#,
            ),
            (
                "turns delete guard",
                r#"
                CREATE TRIGGER IF NOT EXISTS turns_no_delete BEFORE DELETE ON turns BEGIN
                    SELECT RAISE(ABORT, 'turns are append-only');
                END
                "#,
            ),
            (
                "decisions table",
                r#"
                CREATE TABLE IF NOT EXISTS decisions (
                    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                    session_id         TEXT NOT NULL,
                    user_id            TEXT NOT NULL,
                    model_used         TEXT NOT NULL,
                    flags              TEXT NOT NULL DEFAULT '{}',
                    escalation_needed  INTEGER NOT NULL,
                    escalation_reason  TEXT NOT NULL DEFAULT '',
                    policy             TEXT NOT NULL,
                    timestamp          TEXT NOT NULL
                )
                "#,
            ),
            (
                "decisions index",
                "CREATE INDEX IF NOT EXISTS idx_decisions_session ON decisions(session_id, timestamp)",
            ),
            (
                "decisions update guard",
                r#"
                CREATE TRIGGER IF NOT EXISTS decisions_no_update BEFORE UPDATE ON decisions BEGIN
                    SELECT RAISE(ABORT, 'decisions are write-once');
                END
                "#,
            ),
            (
                "decisions delete guard",
                r#"
                CREATE TRIGGER IF NOT EXISTS decisions_no_delete BEFORE DELETE ON decisions BEGIN
                    SELECT RAISE(ABORT, 'decisions are write-once');
                END
                "#,
            ),
        ];

        for (what, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| PersistenceError::MigrationFailed(format!("{what}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_turn(row: &sqlx::sqlite::SqliteRow) -> Result<Turn, PersistenceError> {
        let column = |name: &str, e: sqlx::Error| PersistenceError::QueryFailed(format!("{name} column: {e}"));

        let session_id: String = row.try_get("session_id").map_err(|e| column("session_id", e))?;
        let user_id: String = row.try_get("user_id").map_err(|e| column("user_id", e))?;
        let role: String = row.try_get("role").map_err(|e| column("role", e))?;
        let content: String = row.try_get("content").map_err(|e| column("content", e))?;
        let model_used: Option<String> = row.try_get("model_used").map_err(|e| column("model_used", e))?;
        let timestamp: String = row.try_get("timestamp").map_err(|e| column("timestamp", e))?;

        Ok(Turn {
            session_id,
            user_id,
            role: Role::from_str(&role).map_err(PersistenceError::QueryFailed)?,
            content,
            model_used,
            timestamp: parse_timestamp(&timestamp)
                .ok_or_else(|| PersistenceError::QueryFailed(format!("bad timestamp '{timestamp}'")))?,
        })
    }

    /// Number of decision records for a session.
    pub async fn decision_count(&self, session_id: &str) -> Result<usize, PersistenceError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM decisions WHERE session_id = ?1")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PersistenceError::QueryFailed(format!("COUNT decisions: {e}")))?;
        let cnt: i64 = row
            .try_get("cnt")
            .map_err(|e| PersistenceError::QueryFailed(format!("cnt column: {e}")))?;
        Ok(cnt as usize)
    }
}

#[async_trait]
impl HistoryStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn read_recent(&self, session_id: &str, limit: usize) -> Result<Vec<Turn>, PersistenceError> {
        // Newest `limit` rows, then flipped back to chronological order.
        let rows = sqlx::query(
            r#"
            SELECT * FROM (
                SELECT id, session_id, user_id, role, content, model_used, timestamp
                FROM turns
                WHERE session_id = ?1
                ORDER BY timestamp DESC, id DESC
                LIMIT ?2
            )
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(session_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PersistenceError::QueryFailed(format!("read_recent: {e}")))?;

        rows.iter().map(Self::row_to_turn).collect()
    }

    async fn append(&self, turn: Turn) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO turns (session_id, user_id, role, content, model_used, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&turn.session_id)
        .bind(&turn.user_id)
        .bind(turn.role.as_str())
        .bind(&turn.content)
        .bind(&turn.model_used)
        .bind(format_timestamp(&turn.timestamp))
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::Storage(format!("INSERT turn failed: {e}")))?;

        debug!(session = %turn.session_id, role = %turn.role, "Stored turn");
        Ok(())
    }
}

#[async_trait]
impl DecisionLog for SqliteStore {
    async fn record(&self, record: DecisionRecord) -> Result<(), PersistenceError> {
        let flags = serde_json::to_string(&record.flags)
            .map_err(|e| PersistenceError::Storage(format!("Flags serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO decisions
                (session_id, user_id, model_used, flags, escalation_needed, escalation_reason, policy, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&record.session_id)
        .bind(&record.user_id)
        .bind(&record.model_used)
        .bind(&flags)
        .bind(record.escalation_needed)
        .bind(&record.escalation_reason)
        .bind(&record.policy)
        .bind(format_timestamp(&record.timestamp))
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::Storage(format!("INSERT decision failed: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn test_store(dir: &tempfile::TempDir) -> SqliteStore {
        let path = dir.path().join("turns.db");
        SqliteStore::open(&format!("sqlite://{}", path.display()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn unknown_session_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        assert!(store.read_recent("nobody", 20).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_reads_back_in_write_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        // Same timestamp on all three: the rowid must keep them ordered.
        let ts = Utc::now();
        for (i, content) in ["T1", "T2", "T3"].into_iter().enumerate() {
            let mut turn = if i % 2 == 0 {
                Turn::user("S", "paty", content)
            } else {
                Turn::assistant("S", "paty", content, "claude")
            };
            turn.timestamp = ts;
            store.append(turn).await.unwrap();
        }

        let turns = store.read_recent("S", 20).await.unwrap();
        let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, ["T1", "T2", "T3"]);
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(turns[1].model_used.as_deref(), Some("claude"));
        assert!(turns[0].model_used.is_none());
    }

    #[tokio::test]
    async fn limit_keeps_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        for i in 0..5 {
            store.append(Turn::user("S", "u", format!("m{i}"))).await.unwrap();
        }
        let turns = store.read_recent("S", 2).await.unwrap();
        let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, ["m3", "m4"]);
    }

    #[tokio::test]
    async fn turns_cannot_be_edited() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        store.append(Turn::user("S", "u", "original")).await.unwrap();

        let update = sqlx::query("UPDATE turns SET content = 'edited'")
            .execute(&store.pool)
            .await;
        assert!(update.is_err());
        let delete = sqlx::query("DELETE FROM turns").execute(&store.pool).await;
        assert!(delete.is_err());

        let turns = store.read_recent("S", 20).await.unwrap();
        assert_eq!(turns[0].content, "original");
    }

    #[tokio::test]
    async fn empty_session_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        assert!(store.append(Turn::user("", "u", "x")).await.is_err());
    }

    #[tokio::test]
    async fn decisions_are_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        let mut flags = serde_json::Map::new();
        flags.insert("route".into(), serde_json::json!("deep"));
        store
            .record(DecisionRecord {
                session_id: "S".into(),
                user_id: "u".into(),
                model_used: "claude".into(),
                flags,
                escalation_needed: true,
                escalation_reason: "test".into(),
                policy: "default@1.0.0".into(),
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
        assert_eq!(store.decision_count("S").await.unwrap(), 1);
        assert_eq!(store.decision_count("other").await.unwrap(), 0);

        let update = sqlx::query("UPDATE decisions SET escalation_needed = 0")
            .execute(&store.pool)
            .await;
        assert!(update.is_err());
        let delete = sqlx::query("DELETE FROM decisions").execute(&store.pool).await;
        assert!(delete.is_err());
        assert_eq!(store.decision_count("S").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reopening_keeps_history() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = test_store(&dir).await;
            store.append(Turn::user("S", "u", "persisted")).await.unwrap();
            store.pool.close().await;
        }
        let store = test_store(&dir).await;
        assert_eq!(store.read_recent("S", 20).await.unwrap().len(), 1);
    }
}
