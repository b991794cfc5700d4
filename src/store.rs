//! SQLite persistence of harvested records.
//!
//! The classifier only reads through a [`KeyLookup`]; writing the final batch
//! is done by [`MotionStore::insert_batch`].

use crate::error::{Error, Result};
use crate::extract::ExtractedRecord;
use async_trait::async_trait;
use log::{debug, info};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, Sqlite};
use std::path::Path;
use std::str::FromStr;

/// A row already present in the store.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct StoredRecord {
    pub id: i64,
    pub mp4_url: Option<String>,
    pub webm_url: Option<String>,
    pub category_id: Option<String>,
    pub category_name: Option<String>,
    pub price: Option<String>,
    pub currency: Option<String>,
    pub name: Option<String>,
}

/// Answers "which stored rows share this natural key?".
#[async_trait]
pub trait KeyLookup: Send {
    async fn find_by_mp4_url(&mut self, mp4_url: &str) -> Result<Vec<StoredRecord>>;
}

#[derive(Debug, Clone)]
pub struct MotionStore {
    pool: SqlitePool,
    table: String,
}

impl MotionStore {
    /// Opens (creating if missing) the database at `path` and ensures `table`
    /// exists.
    pub async fn open(path: &Path, table: &str) -> Result<Self> {
        validate_table_name(table)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            table: table.to_string(),
        };
        store.create_table().await?;
        Ok(store)
    }

    async fn create_table(&self) -> Result<()> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                mp4_url TEXT,
                webm_url TEXT,
                category_id TEXT,
                category_name TEXT,
                price TEXT,
                currency TEXT,
                name TEXT
            )
            "#,
            table = self.table
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_mp4_url ON {table}(mp4_url)",
            table = self.table
        ))
        .execute(&self.pool)
        .await?;

        debug!("table {} ready", self.table);
        Ok(())
    }

    /// Acquires one connection for lookups. It goes back to the pool when the
    /// session is dropped.
    pub async fn session(&self) -> Result<StoreSession> {
        let conn = self.pool.acquire().await?;
        Ok(StoreSession {
            conn,
            table: self.table.clone(),
        })
    }

    /// Inserts one row per record and commits them together.
    pub async fn insert_batch(&self, records: &[ExtractedRecord]) -> Result<u64> {
        let sql = format!(
            "INSERT INTO {} (mp4_url, webm_url, category_id, category_name, price, currency, name)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            self.table
        );

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for record in records {
            inserted += sqlx::query(&sql)
                .bind(&record.mp4_url)
                .bind(&record.webm_url)
                .bind(record.category_id.as_ref().map(ToString::to_string))
                .bind(&record.category_name)
                .bind(record.price.as_ref().map(ToString::to_string))
                .bind(&record.currency)
                .bind(&record.name)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;

        info!("{} records saved to {}", inserted, self.table);
        Ok(inserted)
    }

    pub async fn count(&self) -> Result<i64> {
        let count = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.table))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Single-owner lookup connection handed to one classification.
pub struct StoreSession {
    conn: PoolConnection<Sqlite>,
    table: String,
}

#[async_trait]
impl KeyLookup for StoreSession {
    async fn find_by_mp4_url(&mut self, mp4_url: &str) -> Result<Vec<StoredRecord>> {
        let sql = format!(
            "SELECT id, mp4_url, webm_url, category_id, category_name, price, currency, name
             FROM {} WHERE mp4_url = ?",
            self.table
        );
        let rows = sqlx::query_as::<_, StoredRecord>(&sql)
            .bind(mp4_url)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(rows)
    }
}

pub(crate) fn validate_table_name(table: &str) -> Result<()> {
    let valid = !table.is_empty()
        && !table.starts_with(|c: char| c.is_ascii_digit())
        && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::config(
            format!("invalid table name {:?}", table),
            "store.table",
        ))
    }
}
