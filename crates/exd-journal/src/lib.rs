//! Append-only event journal backed by SQLite.
//!
//! # Durability classes
//!
//! Order-lifecycle events that money depends on (`ORDER_CREATED`,
//! `ORDER_SUBMITTED`, `ORDER_REJECTED`, `ORDER_CANCELLED`, `ORDER_FILLED`,
//! `KILL_SWITCH_ACTIVATED`) are written to the database before `log`
//! returns. Everything else may sit in an in-memory buffer until the next
//! durable write, an explicit [`Journal::flush`], or a read — insertion
//! order is preserved in all cases, so journal ids stay authoritative for
//! per-order event ordering.
//!
//! # Replay protection
//!
//! The `UNIQUE(timestamp, correlation_id, event_type)` constraint makes a
//! replayed entry a no-op (`INSERT OR IGNORE`), which is what startup
//! recovery relies on when it re-walks recent history.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tokio::sync::Mutex;

use exd_schemas::{iso_millis, parse_iso_millis, EngineError, EngineResult, Event};

const SCHEMA_SQL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS journal (
       id INTEGER PRIMARY KEY AUTOINCREMENT,
       timestamp TEXT NOT NULL,
       event_type INTEGER NOT NULL,
       data TEXT NOT NULL,
       correlation_id TEXT,
       UNIQUE(timestamp, correlation_id, event_type)
     )",
    "CREATE INDEX IF NOT EXISTS idx_journal_timestamp ON journal(timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_journal_event_type ON journal(event_type)",
    "CREATE INDEX IF NOT EXISTS idx_journal_correlation_id ON journal(correlation_id)",
];

/// One journal row.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: Event,
    pub data: String,
    pub correlation_id: Option<String>,
}

/// An event captured in memory, waiting for the next durable write.
#[derive(Debug, Clone)]
struct PendingEntry {
    timestamp: DateTime<Utc>,
    event: Event,
    data: String,
    correlation_id: Option<String>,
}

/// Whether an event must be on disk before `log` returns.
fn requires_immediate_flush(event: Event) -> bool {
    matches!(
        event,
        Event::OrderCreated
            | Event::OrderSubmitted
            | Event::OrderRejected
            | Event::OrderCancelled
            | Event::OrderFilled
            | Event::KillSwitchActivated
    )
}

/// Append-only journal. Writes are serialized by the buffer lock; the pool
/// holds a single connection so the database never sees interleaved writers.
pub struct Journal {
    pool: SqlitePool,
    buffer: Mutex<Vec<PendingEntry>>,
}

impl Journal {
    /// Open (creating if missing) a journal database at `path`.
    pub async fn open_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let opts = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        Self::open_with(opts).await
    }

    /// Open an in-memory journal; used by tests and dry runs.
    pub async fn open_in_memory() -> EngineResult<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| EngineError::persistence(format!("journal options: {e}")))?;
        Self::open_with(opts).await
    }

    async fn open_with(opts: SqliteConnectOptions) -> EngineResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await
            .map_err(|e| EngineError::persistence(format!("open journal database: {e}")))?;

        for statement in SCHEMA_SQL {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(|e| EngineError::persistence(format!("create journal schema: {e}")))?;
        }

        Ok(Self {
            pool,
            buffer: Mutex::new(Vec::new()),
        })
    }

    /// Append one event. Durable-on-return for the critical lifecycle
    /// events; buffered otherwise.
    pub async fn log(
        &self,
        event: Event,
        data: &str,
        correlation_id: Option<&str>,
    ) -> EngineResult<()> {
        let entry = PendingEntry {
            timestamp: Utc::now(),
            event,
            data: data.to_string(),
            correlation_id: correlation_id.map(str::to_string),
        };

        let mut buffer = self.buffer.lock().await;
        if requires_immediate_flush(event) {
            self.write_pending(&mut buffer).await?;
            self.insert_entry(&entry).await?;
        } else {
            buffer.push(entry);
        }
        Ok(())
    }

    /// Entries between `from` and `to` inclusive, optionally restricted to
    /// one event type, in insertion order.
    pub async fn get_history(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        event_filter: Option<Event>,
    ) -> EngineResult<Vec<JournalEntry>> {
        self.flush_buffer().await?;

        let rows = match event_filter {
            Some(event) => {
                sqlx::query(
                    "SELECT id, timestamp, event_type, data, correlation_id \
                     FROM journal WHERE timestamp BETWEEN ? AND ? AND event_type = ? \
                     ORDER BY id ASC",
                )
                .bind(iso_millis(&from))
                .bind(iso_millis(&to))
                .bind(event.code())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT id, timestamp, event_type, data, correlation_id \
                     FROM journal WHERE timestamp BETWEEN ? AND ? \
                     ORDER BY id ASC",
                )
                .bind(iso_millis(&from))
                .bind(iso_millis(&to))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| EngineError::persistence(format!("journal history query: {e}")))?;

        rows.iter().map(parse_row).collect()
    }

    /// Every entry correlated with one order's local id, in insertion order.
    pub async fn get_order_history(&self, correlation_id: &str) -> EngineResult<Vec<JournalEntry>> {
        self.flush_buffer().await?;

        let rows = sqlx::query(
            "SELECT id, timestamp, event_type, data, correlation_id \
             FROM journal WHERE correlation_id = ? ORDER BY id ASC",
        )
        .bind(correlation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::persistence(format!("journal order-history query: {e}")))?;

        rows.iter().map(parse_row).collect()
    }

    /// Drain the buffer and checkpoint the WAL.
    pub async fn flush(&self) -> EngineResult<()> {
        self.flush_buffer().await?;
        // A checkpoint failure is not fatal: the WAL still holds the data.
        let _ = sqlx::query("PRAGMA wal_checkpoint(FULL)")
            .execute(&self.pool)
            .await;
        Ok(())
    }

    async fn flush_buffer(&self) -> EngineResult<()> {
        let mut buffer = self.buffer.lock().await;
        self.write_pending(&mut buffer).await
    }

    async fn write_pending(&self, buffer: &mut Vec<PendingEntry>) -> EngineResult<()> {
        for entry in buffer.drain(..) {
            self.insert_entry(&entry).await?;
        }
        Ok(())
    }

    async fn insert_entry(&self, entry: &PendingEntry) -> EngineResult<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO journal (timestamp, event_type, data, correlation_id) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(iso_millis(&entry.timestamp))
        .bind(entry.event.code())
        .bind(&entry.data)
        .bind(entry.correlation_id.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| EngineError::persistence(format!("journal insert: {e}")))?;
        Ok(())
    }
}

fn parse_row(row: &sqlx::sqlite::SqliteRow) -> EngineResult<JournalEntry> {
    let ts: String = row.get("timestamp");
    let code: i64 = row.get("event_type");
    Ok(JournalEntry {
        id: row.get("id"),
        timestamp: parse_iso_millis(&ts)
            .ok_or_else(|| EngineError::persistence(format!("bad journal timestamp: {ts}")))?,
        event_type: Event::from_code(code)
            .ok_or_else(|| EngineError::persistence(format!("unknown event code: {code}")))?,
        data: row.get("data"),
        correlation_id: row.get("correlation_id"),
    })
}
