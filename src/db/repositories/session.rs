//! Session repository
//!
//! Database operations for login sessions.
//!
//! This module provides:
//! - `SessionRepository` trait defining the store contract the session
//!   resolver and reaper depend on
//! - `SqlxSessionRepository` implementing the trait for SQLite and MySQL
//!
//! Tokens are random UUIDv4 strings generated here; the unique index on
//! `token` guarantees at most one live session per token.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Issue a new session for a user
    async fn create(&self, user_id: i64) -> Result<Session>;

    /// Get session by token
    async fn get_by_token(&self, token: &str) -> Result<Option<Session>>;

    /// Delete a session by token, returning false if it did not exist
    async fn delete_by_token(&self, token: &str) -> Result<bool>;

    /// Set a session's last-activity timestamp, returning false if it vanished
    async fn touch(&self, token: &str, now: DateTime<Utc>) -> Result<bool>;

    /// Delete sessions whose last activity is older than `cutoff`
    async fn delete_idle_since(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Delete all sessions belonging to a user
    async fn delete_by_user(&self, user_id: i64) -> Result<u64>;
}

/// SQLx-based session repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    /// Create a new SQLx session repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

/// Generate an unguessable session token
fn generate_token() -> String {
    Uuid::new_v4().to_string()
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, user_id: i64) -> Result<Session> {
        let token = generate_token();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_session_sqlite(self.pool.sqlite()?, token, user_id).await
            }
            DatabaseDriver::Mysql => create_session_mysql(self.pool.mysql()?, token, user_id).await,
        }
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<Session>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_session_by_token_sqlite(self.pool.sqlite()?, token).await,
            DatabaseDriver::Mysql => get_session_by_token_mysql(self.pool.mysql()?, token).await,
        }
    }

    async fn delete_by_token(&self, token: &str) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query("DELETE FROM sessions WHERE token = ?")
                    .bind(token)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to delete session")?
                    .rows_affected()
            }
            DatabaseDriver::Mysql => {
                sqlx::query("DELETE FROM sessions WHERE token = ?")
                    .bind(token)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to delete session")?
                    .rows_affected()
            }
        };
        Ok(affected > 0)
    }

    async fn touch(&self, token: &str, now: DateTime<Utc>) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => touch_session_sqlite(self.pool.sqlite()?, token, now).await,
            DatabaseDriver::Mysql => touch_session_mysql(self.pool.mysql()?, token, now).await,
        }
    }

    async fn delete_idle_since(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query("DELETE FROM sessions WHERE last_activity_at < ?")
                    .bind(cutoff)
                    .execute(self.pool.sqlite()?)
                    .await
                    .map(|r| r.rows_affected())
            }
            DatabaseDriver::Mysql => {
                sqlx::query("DELETE FROM sessions WHERE last_activity_at < ?")
                    .bind(cutoff)
                    .execute(self.pool.mysql()?)
                    .await
                    .map(|r| r.rows_affected())
            }
        };
        result.context("Failed to delete idle sessions")
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<u64> {
        let result = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query("DELETE FROM sessions WHERE user_id = ?")
                    .bind(user_id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .map(|r| r.rows_affected())
            }
            DatabaseDriver::Mysql => {
                sqlx::query("DELETE FROM sessions WHERE user_id = ?")
                    .bind(user_id)
                    .execute(self.pool.mysql()?)
                    .await
                    .map(|r| r.rows_affected())
            }
        };
        result.context("Failed to delete sessions by user")
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_session_sqlite(pool: &SqlitePool, token: String, user_id: i64) -> Result<Session> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO sessions (token, user_id, created_at, last_activity_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&token)
    .bind(user_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create session")?;

    Ok(Session {
        id: result.last_insert_rowid(),
        token,
        user_id,
        created_at: now,
        last_activity_at: now,
    })
}

async fn get_session_by_token_sqlite(pool: &SqlitePool, token: &str) -> Result<Option<Session>> {
    let row = sqlx::query(
        r#"
        SELECT id, token, user_id, created_at, last_activity_at
        FROM sessions
        WHERE token = ?
        "#,
    )
    .bind(token)
    .fetch_optional(pool)
    .await
    .context("Failed to get session by token")?;

    row.as_ref().map(row_to_session_sqlite).transpose()
}

async fn touch_session_sqlite(pool: &SqlitePool, token: &str, now: DateTime<Utc>) -> Result<bool> {
    let result = sqlx::query("UPDATE sessions SET last_activity_at = ? WHERE token = ?")
        .bind(now)
        .bind(token)
        .execute(pool)
        .await
        .context("Failed to refresh session")?;

    Ok(result.rows_affected() > 0)
}

fn row_to_session_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Session> {
    Ok(Session {
        id: row.try_get("id")?,
        token: row.try_get("token")?,
        user_id: row.try_get("user_id")?,
        created_at: row.try_get("created_at")?,
        last_activity_at: row.try_get("last_activity_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_session_mysql(pool: &MySqlPool, token: String, user_id: i64) -> Result<Session> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO sessions (token, user_id, created_at, last_activity_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&token)
    .bind(user_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create session")?;

    Ok(Session {
        id: result.last_insert_id() as i64,
        token,
        user_id,
        created_at: now,
        last_activity_at: now,
    })
}

async fn get_session_by_token_mysql(pool: &MySqlPool, token: &str) -> Result<Option<Session>> {
    let row = sqlx::query(
        r#"
        SELECT id, token, user_id, created_at, last_activity_at
        FROM sessions
        WHERE token = ?
        "#,
    )
    .bind(token)
    .fetch_optional(pool)
    .await
    .context("Failed to get session by token")?;

    row.as_ref().map(row_to_session_mysql).transpose()
}

async fn touch_session_mysql(pool: &MySqlPool, token: &str, now: DateTime<Utc>) -> Result<bool> {
    let result = sqlx::query("UPDATE sessions SET last_activity_at = ? WHERE token = ?")
        .bind(now)
        .bind(token)
        .execute(pool)
        .await
        .context("Failed to refresh session")?;

    // An unchanged timestamp reports 0 affected rows on MySQL
    if result.rows_affected() > 0 {
        return Ok(true);
    }
    Ok(get_session_by_token_mysql(pool, token).await?.is_some())
}

fn row_to_session_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Session> {
    Ok(Session {
        id: row.try_get("id")?,
        token: row.try_get("token")?,
        user_id: row.try_get("user_id")?,
        created_at: row.try_get("created_at")?,
        last_activity_at: row.try_get("last_activity_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Role, User};
    use chrono::Duration;

    async fn setup() -> (SqlxSessionRepository, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let users = SqlxUserRepository::new(pool.clone());
        let user = users
            .create(&User::new(
                "Alice".into(),
                "a@x.com".into(),
                "hash".into(),
                Role::user(),
            ))
            .await
            .expect("Failed to create user");
        (SqlxSessionRepository::new(pool), user.id)
    }

    #[tokio::test]
    async fn test_create_and_get_session() {
        let (repo, user_id) = setup().await;

        let session = repo.create(user_id).await.expect("Failed to create session");
        assert!(session.id > 0);
        assert_eq!(session.user_id, user_id);
        assert!(Uuid::parse_str(&session.token).is_ok());
        assert_eq!(session.created_at, session.last_activity_at);

        let found = repo
            .get_by_token(&session.token)
            .await
            .unwrap()
            .expect("Session not found");
        assert_eq!(found, session);
    }

    #[tokio::test]
    async fn test_tokens_are_distinct() {
        let (repo, user_id) = setup().await;

        let a = repo.create(user_id).await.unwrap();
        let b = repo.create(user_id).await.unwrap();
        assert_ne!(a.token, b.token);
    }

    #[tokio::test]
    async fn test_get_unknown_token() {
        let (repo, _) = setup().await;
        assert!(repo.get_by_token("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_by_token() {
        let (repo, user_id) = setup().await;
        let session = repo.create(user_id).await.unwrap();

        assert!(repo.delete_by_token(&session.token).await.unwrap());
        assert!(!repo.delete_by_token(&session.token).await.unwrap());
        assert!(repo.get_by_token(&session.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_touch_updates_last_activity() {
        let (repo, user_id) = setup().await;
        let session = repo.create(user_id).await.unwrap();
        let later = session.last_activity_at + Duration::seconds(30);

        assert!(repo.touch(&session.token, later).await.unwrap());
        let found = repo.get_by_token(&session.token).await.unwrap().unwrap();
        assert_eq!(found.last_activity_at, later);
        assert_eq!(found.created_at, session.created_at);

        assert!(!repo.touch("missing", later).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_idle_since() {
        let (repo, user_id) = setup().await;
        let now = Utc::now();
        let stale = repo.create(user_id).await.unwrap();
        let fresh = repo.create(user_id).await.unwrap();
        repo.touch(&stale.token, now - Duration::hours(2)).await.unwrap();

        let deleted = repo.delete_idle_since(now - Duration::hours(1)).await.unwrap();

        assert_eq!(deleted, 1);
        assert!(repo.get_by_token(&stale.token).await.unwrap().is_none());
        assert!(repo.get_by_token(&fresh.token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_by_user() {
        let (repo, user_id) = setup().await;
        repo.create(user_id).await.unwrap();
        repo.create(user_id).await.unwrap();

        assert_eq!(repo.delete_by_user(user_id).await.unwrap(), 2);
        assert_eq!(repo.delete_by_user(user_id).await.unwrap(), 0);
    }
}
