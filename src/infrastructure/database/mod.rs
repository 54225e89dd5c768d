//! Database infrastructure using sqlx/SQLite

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub mod schema;

/// Database wrapper for a catalog
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the specified path.
    ///
    /// Schema bootstrap failures are fatal and surfaced to the caller:
    /// continuing on an inconsistent schema is unsafe.
    pub async fn open(path: &Path) -> Result<Self, sqlx::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::raw_sql(schema::SCHEMA).execute(&pool).await?;

        info!("Opened catalog database at {:?}", path);

        Ok(Self { pool })
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
