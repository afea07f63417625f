//! SQLite-backed referral store.
//!
//! One row per Messenger user (PSID) with their referral link and drip
//! progress. Timestamps are stored as RFC 3339 text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use referbot_core::traits::ProgressStore;
use referbot_core::{RecipientProgress, ReferBotError, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Referral database.
pub struct ReferralDb {
    conn: Mutex<Connection>,
}

const SELECT_COLUMNS: &str =
    "SELECT psid, referral_link, message_step, last_message_sent_at, created_at FROM referrals";

impl ReferralDb {
    /// Open or create the referral database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| db_err("DB open", e))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        Self::from_connection(conn)
    }

    /// Throwaway in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| db_err("DB open", e))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ReferBotError::Database(format!("Lock: {e}")))
    }

    /// Create tables if missing.
    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS referrals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                psid TEXT NOT NULL UNIQUE,       -- page-scoped Messenger user id
                referral_link TEXT NOT NULL,
                message_step INTEGER NOT NULL DEFAULT 0,
                last_message_sent_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_referrals_created ON referrals(created_at);
         ",
            )
            .map_err(|e| db_err("Migration", e))
    }

    /// Insert a referral, or update its link if the PSID already exists.
    /// Progress of an existing row is left alone.
    pub fn save_referral(&self, psid: &str, referral_link: &str, now: DateTime<Utc>) -> Result<()> {
        let ts = now.to_rfc3339();
        self.conn()?
            .execute(
                "INSERT INTO referrals (psid, referral_link, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(psid) DO UPDATE SET
                    referral_link = excluded.referral_link,
                    updated_at = excluded.updated_at",
                params![psid, referral_link, ts],
            )
            .map_err(|e| db_err("Save referral", e))?;
        tracing::debug!("💾 Referral saved: {psid} -> {referral_link}");
        Ok(())
    }

    pub fn get_by_psid(&self, psid: &str) -> Result<Option<RecipientProgress>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("{SELECT_COLUMNS} WHERE psid = ?1"),
            [psid],
            row_to_progress,
        )
        .optional()
        .map_err(|e| db_err("Get referral", e))
    }

    /// All referrals, newest first.
    pub fn list_all(&self) -> Result<Vec<RecipientProgress>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("{SELECT_COLUMNS} ORDER BY created_at DESC, id DESC"))
            .map_err(|e| db_err("List referrals", e))?;
        let rows = stmt
            .query_map([], row_to_progress)
            .map_err(|e| db_err("List referrals", e))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| db_err("List referrals", e))
    }

    /// Move a referral forward to `next_step`. Never moves it backwards:
    /// a row already at or past `next_step` is left untouched (0 affected).
    pub fn advance(&self, psid: &str, next_step: u32, sent_at: DateTime<Utc>) -> Result<usize> {
        let ts = sent_at.to_rfc3339();
        self.conn()?
            .execute(
                "UPDATE referrals
                 SET message_step = ?1, last_message_sent_at = ?2, updated_at = ?2
                 WHERE psid = ?3 AND message_step < ?1",
                params![next_step, ts, psid],
            )
            .map_err(|e| db_err("Update message progress", e))
    }

    pub fn count(&self) -> Result<usize> {
        self.conn()?
            .query_row("SELECT COUNT(*) FROM referrals", [], |row| row.get::<_, i64>(0))
            .map(|n| n as usize)
            .map_err(|e| db_err("Count referrals", e))
    }
}

fn db_err(context: &str, e: rusqlite::Error) -> ReferBotError {
    ReferBotError::Database(format!("{context}: {e}"))
}

fn row_to_progress(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecipientProgress> {
    let last_sent: Option<String> = row.get(3)?;
    let created_at: String = row.get(4)?;
    Ok(RecipientProgress {
        id: row.get(0)?,
        referral_link: row.get(1)?,
        step: row.get::<_, i64>(2)?.max(0) as u32,
        last_message_sent_at: last_sent.as_deref().and_then(parse_ts),
        created_at: parse_ts(&created_at).unwrap_or_else(Utc::now),
    })
}

fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

#[async_trait]
impl ProgressStore for ReferralDb {
    async fn list_all(&self) -> Result<Vec<RecipientProgress>> {
        ReferralDb::list_all(self)
    }

    async fn find(&self, id: &str) -> Result<Option<RecipientProgress>> {
        self.get_by_psid(id)
    }

    async fn advance(&self, id: &str, next_step: u32, sent_at: DateTime<Utc>) -> Result<usize> {
        ReferralDb::advance(self, id, next_step, sent_at)
    }
}
