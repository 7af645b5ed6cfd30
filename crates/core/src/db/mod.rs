pub mod repository;
pub mod sqlite;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::error::Result;

pub enum DatabasePool {
    Sqlite(SqlitePool),
}

impl DatabasePool {
    /// Open (creating if needed) a SQLite database file and run migrations.
    pub async fn new_sqlite(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(path)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Self::run_migrations(&pool).await?;
        Ok(DatabasePool::Sqlite(pool))
    }

    /// Create a new in-memory SQLite database pool and run migrations. Useful for testing.
    pub async fn new_sqlite_memory() -> Result<Self> {
        // Every connection to :memory: is a separate database, so keep exactly one alive.
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::run_migrations(&pool).await?;
        Ok(DatabasePool::Sqlite(pool))
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        let migrations: &[&str] = &[include_str!(
            "../../../../migrations/sqlite/001_initial_schema.sql"
        )];

        for migration_sql in migrations {
            for statement in migration_sql.split(';') {
                let trimmed = statement.trim();
                if trimmed.is_empty() || trimmed.starts_with("PRAGMA") {
                    continue;
                }
                let result = sqlx::query(trimmed).execute(pool).await;
                if let Err(e) = &result {
                    if e.to_string().contains("already exists") {
                        continue;
                    }
                    result?;
                }
            }
        }
        Ok(())
    }

    pub fn into_sqlite(self) -> SqlitePool {
        match self {
            DatabasePool::Sqlite(pool) => pool,
        }
    }
}
