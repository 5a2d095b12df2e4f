//! SQLite topic store.
//!
//! One database file with two tables:
//! - `topics` — one row per topic, carrying the parent link and the
//!   last-turn sequence used for optimistic concurrency
//! - `turns` — one row per turn, keyed `(topic_id, seq)`
//!
//! Appends are transactional: the last-turn sequence is advanced with a
//! guarded UPDATE, so a stale writer fails instead of overwriting. A
//! branch stores only the parent link; shared turns are never copied.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use promptforge_core::error::TopicError;
use promptforge_core::fragment::Provenance;
use promptforge_core::model::Usage;
use promptforge_core::store::TopicStore;
use promptforge_core::topic::{Topic, TopicId, Turn, TurnId, TurnStatus};

/// A durable SQLite-backed topic store.
pub struct SqliteTopicStore {
    pool: SqlitePool,
}

impl SqliteTopicStore {
    /// Open (or create) a topic database at the given path.
    pub async fn new(path: &str) -> Result<Self, TopicError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| TopicError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5))
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| TopicError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite topic store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, TopicError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), TopicError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS topics (
                id         TEXT PRIMARY KEY,
                parent_id  TEXT REFERENCES topics(id),
                base_seq   INTEGER,
                last_seq   INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| TopicError::MigrationFailed(format!("topics table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS turns (
                topic_id   TEXT NOT NULL REFERENCES topics(id),
                seq        INTEGER NOT NULL,
                id         TEXT NOT NULL,
                prompt     TEXT NOT NULL,
                response   TEXT NOT NULL,
                status     TEXT NOT NULL,
                fragments  TEXT NOT NULL DEFAULT '[]',
                usage      TEXT,
                workflow   TEXT,
                step       TEXT,
                created_at TEXT NOT NULL,
                PRIMARY KEY (topic_id, seq)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| TopicError::MigrationFailed(format!("turns table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_topics_created_at ON topics(created_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| TopicError::MigrationFailed(format!("created_at index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_topic(row: &sqlx::sqlite::SqliteRow) -> Result<Topic, TopicError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| TopicError::Storage(format!("id column: {e}")))?;
        let parent_id: Option<String> = row
            .try_get("parent_id")
            .map_err(|e| TopicError::Storage(format!("parent_id column: {e}")))?;
        let base_seq: Option<i64> = row
            .try_get("base_seq")
            .map_err(|e| TopicError::Storage(format!("base_seq column: {e}")))?;
        let last_seq: i64 = row
            .try_get("last_seq")
            .map_err(|e| TopicError::Storage(format!("last_seq column: {e}")))?;
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| TopicError::Storage(format!("created_at column: {e}")))?;

        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        let parent = match (parent_id, base_seq) {
            (Some(pid), Some(base)) => Some((TopicId(pid), base as u64)),
            _ => None,
        };

        Ok(Topic {
            id: TopicId(id),
            parent,
            last_seq: last_seq as u64,
            created_at,
        })
    }

    fn row_to_turn(row: &sqlx::sqlite::SqliteRow) -> Result<Turn, TopicError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| TopicError::Storage(format!("id column: {e}")))?;
        let seq: i64 = row
            .try_get("seq")
            .map_err(|e| TopicError::Storage(format!("seq column: {e}")))?;
        let prompt: String = row
            .try_get("prompt")
            .map_err(|e| TopicError::Storage(format!("prompt column: {e}")))?;
        let response: String = row
            .try_get("response")
            .map_err(|e| TopicError::Storage(format!("response column: {e}")))?;
        let status_str: String = row
            .try_get("status")
            .map_err(|e| TopicError::Storage(format!("status column: {e}")))?;
        let fragments_json: String = row
            .try_get("fragments")
            .map_err(|e| TopicError::Storage(format!("fragments column: {e}")))?;
        let usage_json: Option<String> = row
            .try_get("usage")
            .map_err(|e| TopicError::Storage(format!("usage column: {e}")))?;
        let workflow: Option<String> = row
            .try_get("workflow")
            .map_err(|e| TopicError::Storage(format!("workflow column: {e}")))?;
        let step: Option<String> = row
            .try_get("step")
            .map_err(|e| TopicError::Storage(format!("step column: {e}")))?;
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| TopicError::Storage(format!("created_at column: {e}")))?;

        let status: TurnStatus = status_str
            .parse()
            .map_err(|e: String| TopicError::Storage(e))?;
        let fragments: Vec<Provenance> =
            serde_json::from_str(&fragments_json).unwrap_or_default();
        let usage: Option<Usage> = usage_json.and_then(|j| serde_json::from_str(&j).ok());
        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Turn {
            id: TurnId(id),
            seq: seq as u64,
            prompt,
            response,
            status,
            fragments,
            usage,
            workflow,
            step,
            created_at,
        })
    }

    async fn insert_topic(&self, topic: &Topic) -> Result<(), TopicError> {
        let (parent_id, base_seq) = match &topic.parent {
            Some((pid, base)) => (Some(pid.0.clone()), Some(*base as i64)),
            None => (None, None),
        };
        sqlx::query(
            r#"
            INSERT INTO topics (id, parent_id, base_seq, last_seq, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&topic.id.0)
        .bind(parent_id)
        .bind(base_seq)
        .bind(topic.last_seq as i64)
        .bind(topic.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| TopicError::Storage(format!("INSERT topic: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl TopicStore for SqliteTopicStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create_topic(&self) -> Result<Topic, TopicError> {
        let topic = Topic::new();
        self.insert_topic(&topic).await?;
        debug!(topic = %topic.id, "Created topic");
        Ok(topic)
    }

    async fn get_topic(&self, id: &TopicId) -> Result<Topic, TopicError> {
        let row = sqlx::query("SELECT * FROM topics WHERE id = ?1")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| TopicError::Storage(format!("SELECT topic: {e}")))?;

        match row {
            Some(ref r) => Self::row_to_topic(r),
            None => Err(TopicError::NotFound(id.0.clone())),
        }
    }

    async fn append_turn(
        &self,
        id: &TopicId,
        expected_last_seq: u64,
        mut turn: Turn,
    ) -> Result<u64, TopicError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| TopicError::Storage(format!("BEGIN: {e}")))?;

        // Guarded advance: succeeds only if nobody moved last_seq since
        // the caller read it.
        let advanced = sqlx::query(
            "UPDATE topics SET last_seq = last_seq + 1 WHERE id = ?1 AND last_seq = ?2",
        )
        .bind(&id.0)
        .bind(expected_last_seq as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| TopicError::Storage(format!("UPDATE last_seq: {e}")))?;

        if advanced.rows_affected() == 0 {
            let row = sqlx::query("SELECT last_seq FROM topics WHERE id = ?1")
                .bind(&id.0)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| TopicError::Storage(format!("SELECT last_seq: {e}")))?;
            return match row {
                Some(r) => {
                    let actual: i64 = r
                        .try_get("last_seq")
                        .map_err(|e| TopicError::Storage(format!("last_seq column: {e}")))?;
                    Err(TopicError::ConcurrentModification {
                        expected: expected_last_seq,
                        actual: actual as u64,
                    })
                }
                None => Err(TopicError::NotFound(id.0.clone())),
            };
        }

        let seq = expected_last_seq + 1;
        turn.seq = seq;
        let fragments_json = serde_json::to_string(&turn.fragments)
            .map_err(|e| TopicError::Storage(format!("Fragments serialization: {e}")))?;
        let usage_json = match &turn.usage {
            Some(usage) => Some(
                serde_json::to_string(usage)
                    .map_err(|e| TopicError::Storage(format!("Usage serialization: {e}")))?,
            ),
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO turns
                (topic_id, seq, id, prompt, response, status, fragments, usage,
                 workflow, step, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&id.0)
        .bind(seq as i64)
        .bind(&turn.id.0)
        .bind(&turn.prompt)
        .bind(&turn.response)
        .bind(turn.status.to_string())
        .bind(&fragments_json)
        .bind(usage_json)
        .bind(&turn.workflow)
        .bind(&turn.step)
        .bind(turn.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| TopicError::Storage(format!("INSERT turn: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| TopicError::Storage(format!("COMMIT: {e}")))?;

        debug!(topic = %id, seq, "Appended turn");
        Ok(seq)
    }

    async fn list_turns(&self, id: &TopicId) -> Result<Vec<Turn>, TopicError> {
        // Walk the parent chain, collecting each topic's own turns up to
        // the branch point observed so far.
        let mut segments: Vec<Vec<Turn>> = Vec::new();
        let mut cursor = id.clone();
        let mut cap = i64::MAX;
        loop {
            let topic = self.get_topic(&cursor).await?;
            let rows = sqlx::query(
                "SELECT * FROM turns WHERE topic_id = ?1 AND seq <= ?2 ORDER BY seq",
            )
            .bind(&cursor.0)
            .bind(cap)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| TopicError::Storage(format!("SELECT turns: {e}")))?;

            segments.push(
                rows.iter()
                    .map(Self::row_to_turn)
                    .collect::<Result<Vec<_>, _>>()?,
            );

            match topic.parent {
                Some((parent_id, base_seq)) => {
                    cap = cap.min(base_seq as i64);
                    cursor = parent_id;
                }
                None => break,
            }
        }

        segments.reverse();
        Ok(segments.into_iter().flatten().collect())
    }

    async fn branch_topic(&self, id: &TopicId, from_seq: u64) -> Result<Topic, TopicError> {
        let source = self.get_topic(id).await?;
        if from_seq > source.last_seq {
            return Err(TopicError::InvalidBranchPoint {
                from_seq,
                last_seq: source.last_seq,
            });
        }

        let mut branch = Topic::new();
        branch.parent = Some((id.clone(), from_seq));
        branch.last_seq = from_seq;
        self.insert_topic(&branch).await?;
        debug!(source = %id, branch = %branch.id, from_seq, "Branched topic");
        Ok(branch)
    }

    async fn list_topics(&self) -> Result<Vec<Topic>, TopicError> {
        let rows = sqlx::query("SELECT * FROM topics ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| TopicError::Storage(format!("SELECT topics: {e}")))?;

        rows.iter().map(Self::row_to_topic).collect()
    }
}
