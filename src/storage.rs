//! SQLite persistence for cached metric values and monthly result sheets
//!
//! Month and year values are small positive integers, so the integer
//! conversions used here cannot lose information.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

use anyhow::Context;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::Config;
use crate::error::Result;

/// Outcome of a keyed upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
}

/// One (year, month) row of a sheet
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyRow {
    pub year: i32,
    pub month: u32,
    pub value: f64,
}

/// Tabular store that keeps one value per (year, month) in a named sheet
pub trait RowStore: Send + Sync {
    /// Create the sheet with `header` if it does not exist, then update the
    /// row keyed by (year, month) or append it.
    fn upsert_monthly(
        &self,
        sheet: &str,
        header: &[&str],
        year: i32,
        month: u32,
        value: f64,
    ) -> Result<Upsert>;
}

/// Database for cached values and result sheets
pub struct MetricsDb {
    conn: Mutex<Connection>,
}

impl MetricsDb {
    /// Open or create the metrics database in the config directory
    pub fn open() -> anyhow::Result<Self> {
        Self::open_at(&Self::db_path())
    }

    pub fn open_at(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open metrics database at {}", db_path.display()))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()
            .context("Failed to migrate metrics database")?;

        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        db.run_migrations()?;
        Ok(db)
    }

    pub fn db_path() -> PathBuf {
        Config::config_dir().join("metrics.db")
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn().execute_batch(
            r"
            -- Computed metric values with an absolute expiry (unix millis)
            CREATE TABLE IF NOT EXISTS metric_cache (
                key TEXT PRIMARY KEY,
                value REAL NOT NULL,
                expires_at INTEGER NOT NULL
            );

            -- Named result sheets and their header row (JSON array)
            CREATE TABLE IF NOT EXISTS sheets (
                name TEXT PRIMARY KEY,
                header TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sheet_rows (
                id INTEGER PRIMARY KEY,
                sheet TEXT NOT NULL,
                year INTEGER NOT NULL,
                month INTEGER NOT NULL,
                value REAL NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(sheet, year, month)
            );

            CREATE INDEX IF NOT EXISTS idx_metric_cache_expires ON metric_cache(expires_at);
            CREATE INDEX IF NOT EXISTS idx_sheet_rows_sheet ON sheet_rows(sheet);
            ",
        )?;

        Ok(())
    }

    /// Value stored under `key` that is still valid at `now` (unix millis)
    pub fn cached_value(&self, key: &str, now: i64) -> Result<Option<f64>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM metric_cache WHERE key = ?1 AND expires_at > ?2",
                params![key, now],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn store_value(&self, key: &str, value: f64, expires_at: i64) -> Result<()> {
        self.conn().execute(
            r"
            INSERT INTO metric_cache (key, value, expires_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at
            ",
            params![key, value, expires_at],
        )?;
        Ok(())
    }

    /// Drop entries that expired before `now`
    pub fn purge_expired(&self, now: i64) -> Result<usize> {
        let removed = self
            .conn()
            .execute("DELETE FROM metric_cache WHERE expires_at <= ?1", params![now])?;
        Ok(removed)
    }

    pub fn sheet_header(&self, sheet: &str) -> Result<Option<Vec<String>>> {
        let header: Option<String> = self
            .conn()
            .query_row(
                "SELECT header FROM sheets WHERE name = ?1",
                params![sheet],
                |row| row.get(0),
            )
            .optional()?;
        Ok(header.map(|h| serde_json::from_str(&h).unwrap_or_default()))
    }

    /// All rows of a sheet, oldest month first
    pub fn monthly_rows(&self, sheet: &str) -> Result<Vec<MonthlyRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r"
            SELECT year, month, value
            FROM sheet_rows
            WHERE sheet = ?1
            ORDER BY year, month
            ",
        )?;

        let rows = stmt.query_map(params![sheet], |row| {
            Ok(MonthlyRow {
                year: row.get::<_, i64>(0)? as i32,
                month: row.get::<_, i64>(1)? as u32,
                value: row.get(2)?,
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Drop the cache table so every cache query fails
    #[cfg(test)]
    pub(crate) fn drop_cache_table(&self) {
        self.conn()
            .execute_batch("DROP TABLE metric_cache")
            .unwrap();
    }
}

impl RowStore for MetricsDb {
    fn upsert_monthly(
        &self,
        sheet: &str,
        header: &[&str],
        year: i32,
        month: u32,
        value: f64,
    ) -> Result<Upsert> {
        let now = Utc::now().timestamp();
        let header_json = serde_json::to_string(header).unwrap_or_else(|_| "[]".to_string());

        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;

        tx.execute(
            "INSERT OR IGNORE INTO sheets (name, header, created_at) VALUES (?1, ?2, ?3)",
            params![sheet, header_json, now],
        )?;

        let updated = tx.execute(
            r"
            UPDATE sheet_rows SET value = ?4, updated_at = ?5
            WHERE sheet = ?1 AND year = ?2 AND month = ?3
            ",
            params![sheet, year, month, value, now],
        )?;

        let outcome = if updated > 0 {
            Upsert::Updated
        } else {
            tx.execute(
                r"
                INSERT INTO sheet_rows (sheet, year, month, value, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ",
                params![sheet, year, month, value, now],
            )?;
            Upsert::Inserted
        };

        tx.commit()?;
        Ok(outcome)
    }
}
