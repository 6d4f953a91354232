//! SQLite persistence layer
//!
//! A thin, cloneable async handle over a single SQLite connection. All
//! reminder state lives here; in-memory timers are rebuilt from this table
//! after a restart, so the schema is the only durability mechanism.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.1.0: Add guild-scoped listing for manager commands
//! - 1.0.0: Initial schema and reminder CRUD

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlite::{Connection, ConnectionWithFullMutex, State, Statement};
use std::sync::{Arc, Mutex};

use crate::features::reminders::Reminder;

/// Storage format for timestamps. Fixed-width UTC so lexicographic
/// comparison in SQL matches chronological order.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS reminders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner TEXT NOT NULL,
    target TEXT NOT NULL,
    guild TEXT,
    message TEXT NOT NULL,
    next_remind TEXT NOT NULL,
    frequency INTEGER,
    require_clearing INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_reminders_next_remind ON reminders(next_remind);
CREATE INDEX IF NOT EXISTS idx_reminders_owner ON reminders(owner);
";

/// Cloneable database handle shared across the bot.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<ConnectionWithFullMutex>>,
}

impl Database {
    /// Open (or create) the database at `path` and apply the schema.
    pub async fn new(path: &str) -> Result<Self> {
        let conn = Connection::open_with_full_mutex(path)
            .with_context(|| format!("failed to open database at {path}"))?;
        conn.execute(SCHEMA).context("failed to create schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ConnectionWithFullMutex>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database mutex poisoned"))
    }

    /// Insert a new reminder and return its assigned id.
    pub async fn insert_reminder(&self, reminder: &Reminder) -> Result<i64> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "INSERT INTO reminders (owner, target, guild, message, next_remind, frequency, require_clearing)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )?;
        stmt.bind((1, reminder.owner.as_str()))?;
        stmt.bind((2, reminder.target.as_str()))?;
        stmt.bind((3, reminder.guild.as_deref()))?;
        stmt.bind((4, reminder.message.as_str()))?;
        stmt.bind((5, format_timestamp(&reminder.next_remind).as_str()))?;
        stmt.bind((6, reminder.frequency))?;
        stmt.bind((7, i64::from(reminder.require_clearing)))?;
        while stmt.next()? != State::Done {}
        drop(stmt);

        let mut stmt = conn.prepare("SELECT last_insert_rowid()")?;
        if stmt.next()? == State::Row {
            Ok(stmt.read::<i64, _>(0)?)
        } else {
            Err(anyhow!("no rowid after insert"))
        }
    }

    /// Fetch one reminder by id. Returns `None` if it no longer exists.
    pub async fn get_reminder(&self, id: i64) -> Result<Option<Reminder>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT * FROM reminders WHERE id = ?")?;
        stmt.bind((1, id))?;
        if stmt.next()? == State::Row {
            Ok(Some(read_reminder(&stmt)?))
        } else {
            Ok(None)
        }
    }

    /// All reminders due at or before `cutoff`, soonest first.
    pub async fn due_reminders(&self, cutoff: DateTime<Utc>) -> Result<Vec<Reminder>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT * FROM reminders WHERE next_remind <= ? ORDER BY next_remind ASC")?;
        stmt.bind((1, format_timestamp(&cutoff).as_str()))?;
        collect_reminders(&mut stmt)
    }

    /// Advance a reminder to its next delivery instant.
    pub async fn update_next_remind(&self, id: i64, next_remind: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("UPDATE reminders SET next_remind = ? WHERE id = ?")?;
        stmt.bind((1, format_timestamp(&next_remind).as_str()))?;
        stmt.bind((2, id))?;
        while stmt.next()? != State::Done {}
        Ok(())
    }

    /// Delete a reminder. Returns whether a row was actually removed.
    pub async fn delete_reminder(&self, id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("DELETE FROM reminders WHERE id = ?")?;
        stmt.bind((1, id))?;
        while stmt.next()? != State::Done {}
        drop(stmt);

        let mut stmt = conn.prepare("SELECT changes()")?;
        if stmt.next()? == State::Row {
            Ok(stmt.read::<i64, _>(0)? > 0)
        } else {
            Ok(false)
        }
    }

    /// All reminders created by `owner`, soonest first.
    pub async fn reminders_for_owner(&self, owner: &str) -> Result<Vec<Reminder>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT * FROM reminders WHERE owner = ? ORDER BY next_remind ASC")?;
        stmt.bind((1, owner))?;
        collect_reminders(&mut stmt)
    }

    /// All reminders scoped to `guild`, soonest first.
    pub async fn reminders_for_guild(&self, guild: &str) -> Result<Vec<Reminder>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT * FROM reminders WHERE guild = ? ORDER BY next_remind ASC")?;
        stmt.bind((1, guild))?;
        collect_reminders(&mut stmt)
    }

    /// Number of pending reminders, for the startup summary.
    pub async fn count_reminders(&self) -> Result<i64> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT COUNT(*) FROM reminders")?;
        if stmt.next()? == State::Row {
            Ok(stmt.read::<i64, _>(0)?)
        } else {
            Ok(0)
        }
    }
}

fn collect_reminders(stmt: &mut Statement<'_>) -> Result<Vec<Reminder>> {
    let mut reminders = Vec::new();
    while stmt.next()? == State::Row {
        reminders.push(read_reminder(stmt)?);
    }
    Ok(reminders)
}

fn read_reminder(stmt: &Statement<'_>) -> Result<Reminder> {
    Ok(Reminder {
        id: stmt.read::<i64, _>("id")?,
        owner: stmt.read::<String, _>("owner")?,
        target: stmt.read::<String, _>("target")?,
        guild: stmt.read::<Option<String>, _>("guild")?,
        message: stmt.read::<String, _>("message")?,
        next_remind: parse_timestamp(&stmt.read::<String, _>("next_remind")?)?,
        frequency: stmt.read::<Option<i64>, _>("frequency")?,
        require_clearing: stmt.read::<i64, _>("require_clearing")? != 0,
    })
}

/// Format a timestamp for storage (second precision, UTC).
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp back into a UTC instant.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .with_context(|| format!("invalid stored timestamp: {s}"))?;
    Ok(DateTime::from_naive_utc_and_offset(naive, Utc))
}
