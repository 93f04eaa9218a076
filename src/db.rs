//! Database module for the SMS gateway
//!
//! Provides persistence for subscriber opt-in state and the per-address
//! message log.

mod schema;

pub use schema::*;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Database connection lock poisoned")]
    Poisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Subscriber Operations ====================

    /// Get the subscriber record for an address, if one exists
    pub fn get_subscriber(&self, address: &str) -> DbResult<Option<SubscriberRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT address, opted_in, created_at, updated_at FROM subscribers WHERE address = ?1",
        )?;

        let record = stmt
            .query_row(params![address], |row| {
                Ok(SubscriberRecord {
                    address: row.get(0)?,
                    opted_in: row.get(1)?,
                    created_at: parse_datetime(&row.get::<_, String>(2)?),
                    updated_at: parse_datetime(&row.get::<_, String>(3)?),
                })
            })
            .optional()?;
        Ok(record)
    }

    /// Create a not-opted-in record for an address unless one already exists.
    ///
    /// Returns true if a record was created.
    pub fn register_subscriber(&self, address: &str) -> DbResult<bool> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO subscribers (address, opted_in, created_at, updated_at)
             VALUES (?1, 0, ?2, ?2)",
            params![address, now],
        )?;
        Ok(inserted > 0)
    }

    /// Upsert the opt-in flag. Only `opted_in` and `updated_at` change on an
    /// existing record.
    pub fn set_opted_in(&self, address: &str, opted_in: bool) -> DbResult<()> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO subscribers (address, opted_in, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(address) DO UPDATE SET opted_in = excluded.opted_in, updated_at = excluded.updated_at",
            params![address, opted_in, now],
        )?;
        Ok(())
    }

    // ==================== Message Operations ====================

    /// Append a message to an address's log
    pub fn add_message(
        &self,
        message_id: &str,
        address: &str,
        body: &str,
        sender: Sender,
        received_at: DateTime<Utc>,
    ) -> DbResult<MessageRecord> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO messages (message_id, address, body, sender, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                message_id,
                address,
                body,
                sender.as_str(),
                received_at.timestamp_micros(),
            ],
        )?;

        Ok(MessageRecord {
            message_id: message_id.to_string(),
            address: address.to_string(),
            body: body.to_string(),
            sender,
            received_at,
        })
    }

    /// Get up to `limit` messages for an address, newest first
    pub fn recent_messages(&self, address: &str, limit: usize) -> DbResult<Vec<MessageRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT message_id, address, body, sender, received_at
             FROM messages WHERE address = ?1
             ORDER BY received_at DESC, seq DESC
             LIMIT ?2",
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![address, limit], parse_message_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Count logged messages for an address
    #[allow(dead_code)] // Used in tests
    pub fn count_messages(&self, address: &str) -> DbResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE address = ?1",
            params![address],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

fn parse_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRecord> {
    let sender: String = row.get(3)?;
    let received_at: i64 = row.get(4)?;
    Ok(MessageRecord {
        message_id: row.get(0)?,
        address: row.get(1)?,
        body: row.get(2)?,
        sender: Sender::from_stored(&sender),
        received_at: DateTime::from_timestamp_micros(received_at).unwrap_or_else(Utc::now),
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
