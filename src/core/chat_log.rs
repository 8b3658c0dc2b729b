//! Durable chat log using SQLite
//!
//! One row per finished exchange. Rows are inserted complete and never updated,
//! so readers never observe an exchange that is still in flight.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

/// A persisted exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: i64,
    pub sender: String,
    pub user_message: String,
    pub bot_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

type ChatRow = (i64, String, String, Option<String>, String, String);

impl TryFrom<ChatRow> for ChatRecord {
    type Error = ChatLogError;

    fn try_from(
        (id, sender, user_message, bot_message, created_at, updated_at): ChatRow,
    ) -> Result<Self, Self::Error> {
        Ok(Self {
            id,
            sender,
            user_message,
            bot_message,
            created_at: parse_timestamp(id, &created_at)?,
            updated_at: parse_timestamp(id, &updated_at)?,
        })
    }
}

/// Timestamps are written by SQLite as `YYYY-MM-DD HH:MM:SS.SSS` in UTC
fn parse_timestamp(id: i64, raw: &str) -> Result<DateTime<Utc>, ChatLogError> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|dt| dt.and_utc())
        .map_err(|_| {
            warn!(id, raw, "Unparseable timestamp in chat log");
            ChatLogError::InvalidTimestamp {
                id,
                raw: raw.to_string(),
            }
        })
}

/// Errors from the chat log
#[derive(Debug, thiserror::Error)]
pub enum ChatLogError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Chat {id} has an invalid timestamp {raw:?}")]
    InvalidTimestamp { id: i64, raw: String },
}

/// Append-only store of finished exchanges
pub struct ChatLog {
    pool: SqlitePool,
}

impl ChatLog {
    /// Open (or create) the chat log at a SQLite URL such as `sqlite://./data/mentor.db`
    pub async fn connect(url: &str) -> Result<Self, ChatLogError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        // Create parent directories if they don't exist
        if let Some(parent) = Path::new(options.get_filename()).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let log = Self { pool };
        log.init_schema().await?;
        Ok(log)
    }

    /// Create an in-memory log for testing
    pub async fn new_in_memory() -> Result<Self, ChatLogError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let log = Self { pool };
        log.init_schema().await?;
        Ok(log)
    }

    /// Initialize the database schema
    async fn init_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chats (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sender TEXT NOT NULL,
                user_message TEXT NOT NULL,
                bot_message TEXT,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
                updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chats_sender ON chats(sender)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chats_created_at ON chats(created_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Append one finished exchange
    pub async fn record(
        &self,
        sender: &str,
        user_message: &str,
        bot_message: Option<&str>,
    ) -> Result<ChatRecord, ChatLogError> {
        let result = sqlx::query(
            r#"
            INSERT INTO chats (sender, user_message, bot_message)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(sender)
        .bind(user_message)
        .bind(bot_message)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get(id)
            .await?
            .ok_or(ChatLogError::Database(sqlx::Error::RowNotFound))
    }

    pub async fn get(&self, id: i64) -> Result<Option<ChatRecord>, ChatLogError> {
        let row: Option<ChatRow> = sqlx::query_as(
            r#"
            SELECT id, sender, user_message, bot_message, created_at, updated_at
            FROM chats
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ChatRecord::try_from).transpose()
    }

    /// Most recent exchanges, newest first
    pub async fn recent(&self, limit: u32) -> Result<Vec<ChatRecord>, ChatLogError> {
        let rows: Vec<ChatRow> = sqlx::query_as(
            r#"
            SELECT id, sender, user_message, bot_message, created_at, updated_at
            FROM chats
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ChatRecord::try_from).collect()
    }

    /// Close all pooled connections
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
