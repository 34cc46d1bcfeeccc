//! Database connection pool abstraction
//!
//! `DatabasePool` hides whether the user and session tables live in SQLite or
//! MySQL. Repositories ask the pool for its driver and then borrow the concrete
//! sqlx pool for that backend.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    mysql::{MySqlPool, MySqlPoolOptions},
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
};
use std::str::FromStr;
use std::sync::Arc;

use crate::config::{DatabaseConfig, DatabaseDriver};

/// Database pool trait that abstracts over the supported backends.
#[async_trait]
pub trait DatabasePool: Send + Sync {
    /// Execute a raw SQL statement that doesn't return rows
    async fn execute(&self, query: &str) -> Result<u64>;

    /// Check if the database connection is healthy
    async fn ping(&self) -> Result<()>;

    /// Close the connection pool
    async fn close(&self);

    /// Get the database driver type
    fn driver(&self) -> DatabaseDriver;

    /// Get the underlying SQLite pool if this is a SQLite connection
    fn as_sqlite(&self) -> Option<&SqlitePool>;

    /// Get the underlying MySQL pool if this is a MySQL connection
    fn as_mysql(&self) -> Option<&MySqlPool>;

    /// Borrow the SQLite pool, failing if the driver disagrees
    fn sqlite(&self) -> Result<&SqlitePool> {
        self.as_sqlite().context("Database pool is not backed by SQLite")
    }

    /// Borrow the MySQL pool, failing if the driver disagrees
    fn mysql(&self) -> Result<&MySqlPool> {
        self.as_mysql().context("Database pool is not backed by MySQL")
    }
}

/// SQLite connection pool implementation
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Open (or create) a SQLite database
    pub async fn new(url: &str) -> Result<Self> {
        let in_memory = url == ":memory:" || url.starts_with("sqlite::memory:");

        if !in_memory {
            let path = url.trim_start_matches("sqlite:");
            let path = path.split('?').next().unwrap_or(path);
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create database directory: {:?}", parent)
                    })?;
                }
            }
        }

        let connection_url = if url == ":memory:" {
            "sqlite::memory:".to_string()
        } else if url.starts_with("sqlite:") {
            if url.contains('?') {
                url.to_string()
            } else {
                format!("{}?mode=rwc", url)
            }
        } else {
            format!("sqlite:{}?mode=rwc", url)
        };

        // Sessions rely on ON DELETE CASCADE from users, on every connection
        let options = SqliteConnectOptions::from_str(&connection_url)
            .with_context(|| format!("Invalid SQLite database url: {}", url))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 16 })
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to SQLite database: {}", url))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl DatabasePool for SqliteDatabase {
    async fn execute(&self, query: &str) -> Result<u64> {
        let result = sqlx::query(query)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to execute query: {}", query))?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Database ping failed")?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn driver(&self) -> DatabaseDriver {
        DatabaseDriver::Sqlite
    }

    fn as_sqlite(&self) -> Option<&SqlitePool> {
        Some(&self.pool)
    }

    fn as_mysql(&self) -> Option<&MySqlPool> {
        None
    }
}

/// MySQL connection pool implementation
pub struct MysqlDatabase {
    pool: MySqlPool,
}

impl MysqlDatabase {
    /// Connect to a MySQL server
    pub async fn new(url: &str) -> Result<Self> {
        let connection_url = if url.starts_with("mysql://") {
            url.to_string()
        } else {
            format!("mysql://{}", url)
        };

        let pool = MySqlPoolOptions::new()
            .max_connections(16)
            .connect(&connection_url)
            .await
            .context("Failed to connect to MySQL database")?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl DatabasePool for MysqlDatabase {
    async fn execute(&self, query: &str) -> Result<u64> {
        let result = sqlx::query(query)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to execute query: {}", query))?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Database ping failed")?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn driver(&self) -> DatabaseDriver {
        DatabaseDriver::Mysql
    }

    fn as_sqlite(&self) -> Option<&SqlitePool> {
        None
    }

    fn as_mysql(&self) -> Option<&MySqlPool> {
        Some(&self.pool)
    }
}

/// Type alias for a shared database pool
pub type DynDatabasePool = Arc<dyn DatabasePool>;

/// Create a database connection pool for the configured driver.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn create_pool(config: &DatabaseConfig) -> Result<DynDatabasePool> {
    match config.driver {
        DatabaseDriver::Sqlite => {
            let db = SqliteDatabase::new(&config.url).await?;
            Ok(Arc::new(db))
        }
        DatabaseDriver::Mysql => {
            let db = MysqlDatabase::new(&config.url).await?;
            Ok(Arc::new(db))
        }
    }
}

/// Create a SQLite in-memory database pool for testing
pub async fn create_test_pool() -> Result<DynDatabasePool> {
    let config = DatabaseConfig {
        driver: DatabaseDriver::Sqlite,
        url: ":memory:".to_string(),
    };
    create_pool(&config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sqlite_pool_creation() {
        let pool = create_test_pool().await.expect("Failed to create pool");
        assert_eq!(pool.driver(), DatabaseDriver::Sqlite);
        assert!(pool.sqlite().is_ok());
        assert!(pool.mysql().is_err());
        pool.ping().await.expect("Ping should succeed");
    }

    #[tokio::test]
    async fn test_in_memory_pool_keeps_state_between_queries() {
        let pool = create_test_pool().await.expect("Failed to create pool");

        pool.execute("CREATE TABLE scratch (id INTEGER PRIMARY KEY, name TEXT)")
            .await
            .expect("Failed to create table");
        let affected = pool
            .execute("INSERT INTO scratch (name) VALUES ('a')")
            .await
            .expect("Failed to insert");
        assert_eq!(affected, 1);
        assert_eq!(pool.execute("DELETE FROM scratch").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_nested_directory_creation() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("nested").join("gatehouse.db");

        let config = DatabaseConfig {
            driver: DatabaseDriver::Sqlite,
            url: db_path.to_string_lossy().to_string(),
        };

        let pool = create_pool(&config).await.expect("Failed to create pool");
        pool.ping().await.expect("Ping should succeed");
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled_on_every_connection() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = DatabaseConfig {
            driver: DatabaseDriver::Sqlite,
            url: temp_dir.path().join("fk.db").to_string_lossy().to_string(),
        };
        let pool = create_pool(&config).await.expect("Failed to create pool");
        let sqlite = pool.sqlite().unwrap();

        // Hold several connections at once so each is a distinct one
        let mut connections = Vec::new();
        for _ in 0..3 {
            connections.push(sqlite.acquire().await.unwrap());
        }
        for conn in connections.iter_mut() {
            let enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
                .fetch_one(&mut **conn)
                .await
                .unwrap();
            assert_eq!(enabled, 1);
        }
    }

    #[tokio::test]
    #[ignore = "Requires MySQL server"]
    async fn test_mysql_pool_creation() {
        let url = std::env::var("MYSQL_TEST_URL")
            .unwrap_or_else(|_| "mysql://root@localhost/gatehouse_test".to_string());

        let config = DatabaseConfig {
            driver: DatabaseDriver::Mysql,
            url,
        };

        let pool = create_pool(&config).await.expect("Failed to create pool");
        assert_eq!(pool.driver(), DatabaseDriver::Mysql);
        assert!(pool.sqlite().is_err());
        pool.ping().await.expect("Ping should succeed");
    }
}
