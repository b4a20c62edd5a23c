//! SQLite-based timetable storage.
//!
//! Provides persistent storage for:
//! - The last normalized session set, in timetable order
//! - Key-value store for the chosen lead time and the last reload instant

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::data_dir;
use crate::error::StoreError;
use crate::session::NormalizedSession;

const KEY_LEAD_MINUTES: &str = "lead_minutes";
const KEY_LAST_RELOAD_AT: &str = "last_reload_at";

/// Persistence seam used by the reload coordinator.
pub trait ScheduleStore: Send {
    /// Sessions from the last applied reload, in timetable order.
    fn load_sessions(&self) -> Result<Vec<NormalizedSession>, StoreError>;

    /// Replace the stored session set and stamp the reload instant, atomically.
    fn replace_sessions(&mut self, sessions: &[NormalizedSession], reloaded_at: DateTime<Utc>) -> Result<(), StoreError>;

    fn lead_minutes(&self) -> Result<Option<i64>, StoreError>;

    fn set_lead_minutes(&mut self, minutes: i64) -> Result<(), StoreError>;

    fn last_reload_at(&self) -> Result<Option<DateTime<Utc>>, StoreError>;
}

/// SQLite database for timetable storage.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at `~/.config/classbell/classbell.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    pub fn open() -> crate::error::Result<Self> {
        Ok(Self::open_at(&data_dir()?.join("classbell.db"))?)
    }

    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests and dry runs).
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                position        INTEGER PRIMARY KEY,
                id              TEXT NOT NULL UNIQUE,
                subject_name    TEXT,
                teacher_name    TEXT,
                room_name       TEXT,
                date            TEXT NOT NULL,
                day_of_week     TEXT NOT NULL,
                start_time      TEXT NOT NULL,
                end_time        TEXT NOT NULL,
                start_formatted TEXT NOT NULL,
                end_formatted   TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_start_time ON sessions(start_time);",
        )?;
        Ok(())
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

fn parse_instant(key: &str, text: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            message: format!("'{text}': {e}"),
        })
}

impl ScheduleStore for Database {
    fn load_sessions(&self) -> Result<Vec<NormalizedSession>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, subject_name, teacher_name, room_name, date, day_of_week,
                    start_time, end_time, start_formatted, end_formatted
             FROM sessions
             ORDER BY position",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, String>(8)?,
                row.get::<_, String>(9)?,
            ))
        })?;

        let mut sessions = Vec::new();
        for row in rows {
            let (id, subject_name, teacher_name, room_name, date, day_of_week, start, end, start_fmt, end_fmt) = row?;
            let key = format!("sessions.{id}");
            sessions.push(NormalizedSession {
                start_time: parse_instant(&key, &start)?,
                end_time: parse_instant(&key, &end)?,
                id,
                subject_name,
                teacher_name,
                room_name,
                date,
                day_of_week,
                start_time_formatted: start_fmt,
                end_time_formatted: end_fmt,
            });
        }
        Ok(sessions)
    }

    fn replace_sessions(&mut self, sessions: &[NormalizedSession], reloaded_at: DateTime<Utc>) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM sessions", [])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO sessions (position, id, subject_name, teacher_name, room_name, date,
                                       day_of_week, start_time, end_time, start_formatted, end_formatted)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for (position, s) in sessions.iter().enumerate() {
                insert.execute(params![
                    position as i64,
                    s.id,
                    s.subject_name,
                    s.teacher_name,
                    s.room_name,
                    s.date,
                    s.day_of_week,
                    s.start_time.to_rfc3339(),
                    s.end_time.to_rfc3339(),
                    s.start_time_formatted,
                    s.end_time_formatted,
                ])?;
            }
        }
        tx.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![KEY_LAST_RELOAD_AT, reloaded_at.to_rfc3339()],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn lead_minutes(&self) -> Result<Option<i64>, StoreError> {
        self.kv_get(KEY_LEAD_MINUTES)?
            .map(|v| {
                v.parse::<i64>().map_err(|e| StoreError::Corrupt {
                    key: KEY_LEAD_MINUTES.into(),
                    message: format!("'{v}': {e}"),
                })
            })
            .transpose()
    }

    fn set_lead_minutes(&mut self, minutes: i64) -> Result<(), StoreError> {
        self.kv_set(KEY_LEAD_MINUTES, &minutes.to_string())
    }

    fn last_reload_at(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.kv_get(KEY_LAST_RELOAD_AT)?
            .map(|v| parse_instant(KEY_LAST_RELOAD_AT, &v))
            .transpose()
    }
}
