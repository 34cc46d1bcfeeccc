//! Database migrations
//!
//! Schema changes are embedded in the binary as versioned SQL for both SQLite
//! and MySQL. Applied versions are recorded in the `_migrations` table so each
//! migration runs exactly once.
//!
//! ```ignore
//! use gatehouse::db::{create_pool, migrations};
//!
//! let pool = create_pool(&config.database).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

use anyhow::{Context, Result};
use sqlx::{MySqlPool, Row, SqlitePool};

use super::DynDatabasePool;
use crate::config::DatabaseDriver;

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements for SQLite
    pub up_sqlite: &'static str,
    /// SQL statements for MySQL
    pub up_mysql: &'static str,
}

/// All schema migrations, in application order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(255) NOT NULL,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(32) NOT NULL DEFAULT 'user',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(255) NOT NULL,
                email VARCHAR(255) NOT NULL,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(32) NOT NULL DEFAULT 'user',
                created_at DATETIME(6) NOT NULL,
                updated_at DATETIME(6) NOT NULL,
                UNIQUE KEY uq_users_email (email)
            ) DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_bin;
        "#,
    },
    // Sessions are addressed by token; the numeric id never leaves the store.
    Migration {
        version: 2,
        name: "create_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                token VARCHAR(64) NOT NULL UNIQUE,
                user_id INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                last_activity_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_last_activity_at ON sessions(last_activity_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                token VARCHAR(64) NOT NULL,
                user_id BIGINT NOT NULL,
                created_at DATETIME(6) NOT NULL,
                last_activity_at DATETIME(6) NOT NULL,
                UNIQUE KEY uq_sessions_token (token),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX idx_sessions_last_activity_at ON sessions(last_activity_at);
        "#,
    },
];

/// Run all pending migrations and return how many were applied.
///
/// # Errors
///
/// Returns an error if any migration fails to apply
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = applied_versions(pool).await?;

    let mut count = 0;
    for migration in MIGRATIONS {
        if applied.contains(&migration.version) {
            continue;
        }
        tracing::info!(
            "Applying migration {}: {}",
            migration.version,
            migration.name
        );
        let sql = match pool.driver() {
            DatabaseDriver::Sqlite => migration.up_sqlite,
            DatabaseDriver::Mysql => migration.up_mysql,
        };
        apply_migration(pool, migration, sql)
            .await
            .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
        count += 1;
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

/// Get pending migrations count
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;
    let applied = applied_versions(pool).await?;
    Ok(MIGRATIONS
        .iter()
        .filter(|m| !applied.contains(&m.version))
        .count())
}

/// Check if migrations are up to date
pub async fn is_up_to_date(pool: &DynDatabasePool) -> Result<bool> {
    Ok(pending_count(pool).await? == 0)
}

async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
        DatabaseDriver::Mysql => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

async fn applied_versions(pool: &DynDatabasePool) -> Result<Vec<i32>> {
    match pool.driver() {
        DatabaseDriver::Sqlite => applied_versions_sqlite(pool.sqlite()?).await,
        DatabaseDriver::Mysql => applied_versions_mysql(pool.mysql()?).await,
    }
}

async fn applied_versions_sqlite(pool: &SqlitePool) -> Result<Vec<i32>> {
    let rows = sqlx::query("SELECT version FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .context("Failed to read applied migrations")?;
    Ok(rows.iter().map(|row| row.get::<i64, _>("version") as i32).collect())
}

async fn applied_versions_mysql(pool: &MySqlPool) -> Result<Vec<i32>> {
    let rows = sqlx::query("SELECT version FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .context("Failed to read applied migrations")?;
    Ok(rows.iter().map(|row| row.get::<i32, _>("version")).collect())
}

/// Execute each statement of a migration, then record its version
async fn apply_migration(pool: &DynDatabasePool, migration: &Migration, sql: &str) -> Result<()> {
    for statement in split_sql_statements(sql) {
        pool.execute(statement)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    let record = format!(
        "INSERT INTO _migrations (version, name) VALUES ({}, '{}')",
        migration.version, migration.name
    );
    pool.execute(&record).await?;

    Ok(())
}

/// Truncate SQL for error messages
fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, skipping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, MIGRATIONS.len());

        // Running again should apply 0 migrations
        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_pending_count_and_up_to_date() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        assert_eq!(pending_count(&pool).await.unwrap(), MIGRATIONS.len());
        assert!(!is_up_to_date(&pool).await.unwrap());

        run_migrations(&pool).await.expect("Failed to run migrations");

        assert_eq!(pending_count(&pool).await.unwrap(), 0);
        assert!(is_up_to_date(&pool).await.unwrap());
    }

    #[tokio::test]
    async fn test_session_token_unique_and_cascades_with_user() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        let sqlite_pool = pool.as_sqlite().unwrap();

        sqlx::query(
            "INSERT INTO users (name, email, password_hash, role, created_at, updated_at) \
             VALUES ('a', 'a@x.com', 'h', 'user', '2024-01-01', '2024-01-01')",
        )
        .execute(sqlite_pool)
        .await
        .expect("Failed to create user");

        let insert_session = "INSERT INTO sessions (token, user_id, created_at, last_activity_at) \
                              VALUES ('tok', 1, '2024-01-01', '2024-01-01')";
        sqlx::query(insert_session).execute(sqlite_pool).await.unwrap();
        assert!(sqlx::query(insert_session).execute(sqlite_pool).await.is_err());

        sqlx::query("DELETE FROM users WHERE id = 1")
            .execute(sqlite_pool)
            .await
            .unwrap();
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
            .fetch_one(sqlite_pool)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn test_split_sql_statements() {
        let sql = "CREATE TABLE a (id INT);\n-- trailing note\n;\nCREATE INDEX i ON a(id)";
        assert_eq!(
            split_sql_statements(sql),
            vec!["CREATE TABLE a (id INT)", "CREATE INDEX i ON a(id)"]
        );
    }

    #[test]
    fn test_truncate_sql() {
        assert_eq!(truncate_sql("SELECT 1"), "SELECT 1");
        let long = "x".repeat(150);
        assert_eq!(truncate_sql(&long).len(), 103);
    }
}
