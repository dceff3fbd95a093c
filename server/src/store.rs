//! Record store access for per-user best scores
//!
//! The record store is owned by the web application; these services only
//! read profiles, compute aggregates and apply the monotonic-max merge to
//! `best_score`. [`RecordStore`] is the seam, [`SqliteStore`] the shipped
//! implementation over the application's SQLite database.

use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use shared::{ServiceError, UserStats};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    name TEXT,
    email TEXT UNIQUE,
    is_admin BOOLEAN NOT NULL DEFAULT 0,
    best_score INTEGER NOT NULL DEFAULT 0,
    last_played_at TEXT,
    registered_at TEXT
);
";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user {0} not found")]
    UserNotFound(i64),
    #[error("record store: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UserNotFound(_) => ServiceError::UserNotFound,
            StoreError::Sqlite(e) => ServiceError::Internal(e.to_string()),
        }
    }
}

/// Result of merging a submitted score into the stored best
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreMerge {
    /// Submitted score beat the stored one and was written
    NewRecord(i64),
    /// Stored best was kept; carries the unchanged value
    Unchanged(i64),
}

impl ScoreMerge {
    pub fn best_score(&self) -> i64 {
        match self {
            ScoreMerge::NewRecord(score) | ScoreMerge::Unchanged(score) => *score,
        }
    }

    pub fn is_new_record(&self) -> bool {
        matches!(self, ScoreMerge::NewRecord(_))
    }
}

/// Aggregate counts behind `get_global_stats`, before rounding and stamping
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSnapshot {
    pub total_users: i64,
    pub active_users: i64,
    pub average_best_score: f64,
    pub top_best_score: i64,
}

/// Access to the external per-user record store
pub trait RecordStore: Send + Sync + 'static {
    /// Applies `best_score = max(best_score, score)` atomically for one user
    ///
    /// Fails with [`StoreError::UserNotFound`] when no record exists; never
    /// creates one.
    fn merge_best_score(
        &self,
        user_id: i64,
        score: i64,
        played_at: DateTime<Utc>,
    ) -> Result<ScoreMerge, StoreError>;

    fn user_profile(&self, user_id: i64) -> Result<Option<UserStats>, StoreError>;

    fn global_stats(&self) -> Result<StatsSnapshot, StoreError>;
}

/// SQLite-backed record store
///
/// Opens a fresh connection per operation so concurrent handlers never share
/// a connection; SQLite's own locking (with a busy timeout) arbitrates.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Opens the store, creating the `users` table if it is absent
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let store = SqliteStore {
            path: path.as_ref().to_path_buf(),
        };
        store.connection()?.execute_batch(SCHEMA)?;
        info!("Record store ready at {}", store.path.display());
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connection(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Provisions a user record; the services themselves never call this
    pub fn create_user(&self, name: &str, email: &str, is_admin: bool) -> Result<i64, StoreError> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO users (name, email, is_admin, best_score, registered_at)
             VALUES (?1, ?2, ?3, 0, ?4)",
            params![name, email, is_admin, timestamp(Utc::now())],
        )?;
        let id = conn.last_insert_rowid();
        debug!("Created user {} ({})", id, email);
        Ok(id)
    }
}

impl RecordStore for SqliteStore {
    fn merge_best_score(
        &self,
        user_id: i64,
        score: i64,
        played_at: DateTime<Utc>,
    ) -> Result<ScoreMerge, StoreError> {
        let mut conn = self.connection()?;
        // IMMEDIATE takes the write lock before the read, so two submissions
        // for the same user serialize instead of both reading the old best.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current: Option<i64> = tx
            .query_row(
                "SELECT COALESCE(best_score, 0) FROM users WHERE id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;

        let current = current.ok_or(StoreError::UserNotFound(user_id))?;

        if score <= current {
            tx.commit()?;
            return Ok(ScoreMerge::Unchanged(current));
        }

        tx.execute(
            "UPDATE users SET best_score = ?1, last_played_at = ?2 WHERE id = ?3",
            params![score, timestamp(played_at), user_id],
        )?;
        tx.commit()?;

        debug!("User {} best score {} -> {}", user_id, current, score);
        Ok(ScoreMerge::NewRecord(score))
    }

    fn user_profile(&self, user_id: i64) -> Result<Option<UserStats>, StoreError> {
        let conn = self.connection()?;
        let profile = conn
            .query_row(
                "SELECT id, name, email, COALESCE(best_score, 0), last_played_at, registered_at
                 FROM users WHERE id = ?1",
                params![user_id],
                |row| {
                    Ok(UserStats {
                        user_id: row.get(0)?,
                        name: row.get(1)?,
                        email: row.get(2)?,
                        best_score: row.get(3)?,
                        last_played_at: row.get(4)?,
                        registered_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(profile)
    }

    fn global_stats(&self) -> Result<StatsSnapshot, StoreError> {
        let conn = self.connection()?;

        let (total_users, active_users): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN best_score > 0 THEN 1 ELSE 0 END), 0)
             FROM users",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let (average_best_score, top_best_score): (f64, i64) = conn.query_row(
            "SELECT COALESCE(AVG(best_score), 0.0), COALESCE(MAX(best_score), 0)
             FROM users WHERE is_admin = 0",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(StatsSnapshot {
            total_users,
            active_users,
            average_best_score,
            top_best_score,
        })
    }
}

/// RFC 3339 UTC with second precision, the format stored in the record store
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
