//! Tracking store: subscribers and their monitored usernames, backed by SQLite.
//!
//! The store is the only writer of durable state. Membership limits and
//! (subscriber, username) uniqueness are enforced inside a transaction plus
//! a UNIQUE constraint, and rating updates are compare-and-set so a poll
//! cycle never overwrites a row that changed underneath it.

use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use crate::source::Rating;

/// Live usernames one subscriber may track.
pub const DEFAULT_MAX_TRACKED: usize = 10;

/// A (subscriber, username) pair under periodic monitoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedEntry {
    pub subscriber_id: String,
    pub username: String,
    pub last_rating: Option<Rating>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("username is already tracked")]
    DuplicateEntry,
    #[error("tracking limit of {limit} usernames reached")]
    CapacityExceeded { limit: usize },
    #[error("tracked username not found")]
    NotFound,
    #[error("database lock poisoned")]
    Poisoned,
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

pub struct TrackingStore {
    db: Mutex<Connection>,
    max_tracked: usize,
}

impl TrackingStore {
    /// Open (or create) the store at the given path.
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        let db = Connection::open(db_path)?;
        // WAL mode for concurrent reads
        let mode: String = db.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(journal_mode = %mode, path = %db_path.display(), "Tracking store opened");
        Self::init(db)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    pub fn with_max_tracked(mut self, max_tracked: usize) -> Self {
        self.max_tracked = max_tracked;
        self
    }

    fn init(db: Connection) -> Result<Self, StoreError> {
        db.pragma_update(None, "foreign_keys", "ON")?;
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS subscribers (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tracked_users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subscriber_id TEXT NOT NULL,
                username TEXT NOT NULL,
                last_rating INTEGER,
                added_at TEXT NOT NULL,
                UNIQUE (subscriber_id, username),
                FOREIGN KEY (subscriber_id) REFERENCES subscribers(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_tracked_users_subscriber ON tracked_users(subscriber_id);
            ",
        )?;

        Ok(Self {
            db: Mutex::new(db),
            max_tracked: DEFAULT_MAX_TRACKED,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.db.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Register a subscriber on first contact. Idempotent.
    pub fn get_or_create_subscriber(&self, id: &str) -> Result<(), StoreError> {
        let db = self.conn()?;
        let inserted = db.execute(
            "INSERT OR IGNORE INTO subscribers (id, created_at) VALUES (?1, ?2)",
            params![id, Utc::now().to_rfc3339()],
        )?;
        if inserted > 0 {
            tracing::info!(subscriber = id, "Subscriber registered");
        }
        Ok(())
    }

    /// Tracked entries of one subscriber, in the order they were added.
    pub fn list_tracked(&self, subscriber_id: &str) -> Result<Vec<TrackedEntry>, StoreError> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT subscriber_id, username, last_rating FROM tracked_users
             WHERE subscriber_id = ?1 ORDER BY id",
        )?;
        let entries = stmt.query_map(params![subscriber_id], row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Every tracked entry across all subscribers, for a poll cycle.
    pub fn list_all_tracked(&self) -> Result<Vec<TrackedEntry>, StoreError> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT subscriber_id, username, last_rating FROM tracked_users ORDER BY id",
        )?;
        let entries = stmt.query_map([], row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Check whether `add_tracked` would currently succeed, without writing.
    pub fn ensure_can_add(&self, subscriber_id: &str, username: &str) -> Result<(), StoreError> {
        let db = self.conn()?;
        check_can_add(&db, subscriber_id, username, self.max_tracked)
    }

    /// Start tracking `username` for a subscriber with an optional first rating.
    pub fn add_tracked(
        &self,
        subscriber_id: &str,
        username: &str,
        initial_rating: Option<Rating>,
    ) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let mut db = self.conn()?;
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT OR IGNORE INTO subscribers (id, created_at) VALUES (?1, ?2)",
            params![subscriber_id, now],
        )?;
        check_can_add(&tx, subscriber_id, username, self.max_tracked)?;

        let inserted = tx.execute(
            "INSERT INTO tracked_users (subscriber_id, username, last_rating, added_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![subscriber_id, username, initial_rating.map(|r| r as i64), now],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Err(StoreError::DuplicateEntry);
            }
            Err(e) => return Err(e.into()),
        }
        tx.commit()?;

        tracing::info!(subscriber = subscriber_id, username = username, "Username added to monitoring");
        Ok(())
    }

    /// Stop tracking `username` for a subscriber.
    pub fn remove_tracked(&self, subscriber_id: &str, username: &str) -> Result<(), StoreError> {
        let db = self.conn()?;
        let rows = db.execute(
            "DELETE FROM tracked_users WHERE subscriber_id = ?1 AND username = ?2",
            params![subscriber_id, username],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound);
        }
        tracing::info!(subscriber = subscriber_id, username = username, "Username removed from monitoring");
        Ok(())
    }

    /// Compare-and-set the last known rating.
    ///
    /// Writes only if the stored value still equals `expected`. Returns
    /// `false` when the row changed or disappeared since it was read.
    pub fn update_rating(
        &self,
        subscriber_id: &str,
        username: &str,
        expected: Option<Rating>,
        rating: Rating,
    ) -> Result<bool, StoreError> {
        let db = self.conn()?;
        let rows = db.execute(
            "UPDATE tracked_users SET last_rating = ?1
             WHERE subscriber_id = ?2 AND username = ?3 AND last_rating IS ?4",
            params![rating as i64, subscriber_id, username, expected.map(|r| r as i64)],
        )?;
        Ok(rows > 0)
    }
}

fn check_can_add(
    db: &Connection,
    subscriber_id: &str,
    username: &str,
    max_tracked: usize,
) -> Result<(), StoreError> {
    let count: i64 = db.query_row(
        "SELECT COUNT(*) FROM tracked_users WHERE subscriber_id = ?1",
        params![subscriber_id],
        |row| row.get(0),
    )?;
    if count as usize >= max_tracked {
        return Err(StoreError::CapacityExceeded { limit: max_tracked });
    }

    let existing: Option<i64> = db.query_row(
        "SELECT id FROM tracked_users WHERE subscriber_id = ?1 AND username = ?2",
        params![subscriber_id, username],
        |row| row.get(0),
    ).optional()?;
    if existing.is_some() {
        return Err(StoreError::DuplicateEntry);
    }
    Ok(())
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrackedEntry> {
    Ok(TrackedEntry {
        subscriber_id: row.get(0)?,
        username: row.get(1)?,
        last_rating: row.get::<_, Option<i64>>(2)?.map(|r| r as Rating),
    })
}
