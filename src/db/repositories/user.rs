//! User repository
//!
//! Database operations for user accounts.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL
//!
//! Email uniqueness is enforced by the store's unique index, not by callers.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Role, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &User) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by email (exact, case-sensitive match)
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Update name, email, password hash and role of an existing user
    async fn update(&self, user: &User) -> Result<User>;

    /// Delete a user, returning whether a row was removed
    async fn delete(&self, id: i64) -> Result<bool>;

    /// List all users ordered by id
    async fn list(&self) -> Result<Vec<User>>;

    /// Count total users
    async fn count(&self) -> Result<i64>;
}

/// SQLx-based user repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_user_sqlite(self.pool.sqlite()?, user).await,
            DatabaseDriver::Mysql => create_user_mysql(self.pool.mysql()?, user).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_user_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_user_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_user_by_email_sqlite(self.pool.sqlite()?, email).await,
            DatabaseDriver::Mysql => get_user_by_email_mysql(self.pool.mysql()?, email).await,
        }
    }

    async fn update(&self, user: &User) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_user_sqlite(self.pool.sqlite()?, user).await,
            DatabaseDriver::Mysql => update_user_mysql(self.pool.mysql()?, user).await,
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => delete_user_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => delete_user_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn list(&self) -> Result<Vec<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_users_sqlite(self.pool.sqlite()?).await,
            DatabaseDriver::Mysql => list_users_mysql(self.pool.mysql()?).await,
        }
    }

    async fn count(&self) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => count_users_sqlite(self.pool.sqlite()?).await,
            DatabaseDriver::Mysql => count_users_mysql(self.pool.mysql()?).await,
        }
    }
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, created_at, updated_at";

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (name, email, password_hash, role, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.as_str())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn get_user_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn get_user_by_email_sqlite(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS))
        .bind(email)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by email")?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn update_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        UPDATE users
        SET name = ?, email = ?, password_hash = ?, role = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.as_str())
    .bind(now)
    .bind(user.id)
    .execute(pool)
    .await
    .context("Failed to update user")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("User {} not found", user.id);
    }

    Ok(User {
        updated_at: now,
        ..user.clone()
    })
}

async fn delete_user_sqlite(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete user")?;

    Ok(result.rows_affected() > 0)
}

async fn list_users_sqlite(pool: &SqlitePool) -> Result<Vec<User>> {
    let rows = sqlx::query(&format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS))
        .fetch_all(pool)
        .await
        .context("Failed to list users")?;

    rows.iter().map(row_to_user_sqlite).collect()
}

async fn count_users_sqlite(pool: &SqlitePool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM users")
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;

    Ok(row.get("count"))
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let role: String = row.try_get("role").context("Missing role column")?;

    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: Role::from(role),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (name, email, password_hash, role, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.as_str())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_id() as i64,
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn get_user_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    row.as_ref().map(row_to_user_mysql).transpose()
}

async fn get_user_by_email_mysql(pool: &MySqlPool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS))
        .bind(email)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by email")?;

    row.as_ref().map(row_to_user_mysql).transpose()
}

async fn update_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        UPDATE users
        SET name = ?, email = ?, password_hash = ?, role = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.as_str())
    .bind(now)
    .bind(user.id)
    .execute(pool)
    .await
    .context("Failed to update user")?;

    // MySQL reports matched-but-unchanged rows as 0 affected, so confirm existence
    if result.rows_affected() == 0 && get_user_by_id_mysql(pool, user.id).await?.is_none() {
        anyhow::bail!("User {} not found", user.id);
    }

    Ok(User {
        updated_at: now,
        ..user.clone()
    })
}

async fn delete_user_mysql(pool: &MySqlPool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete user")?;

    Ok(result.rows_affected() > 0)
}

async fn list_users_mysql(pool: &MySqlPool) -> Result<Vec<User>> {
    let rows = sqlx::query(&format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS))
        .fetch_all(pool)
        .await
        .context("Failed to list users")?;

    rows.iter().map(row_to_user_mysql).collect()
}

async fn count_users_mysql(pool: &MySqlPool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM users")
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;

    Ok(row.get("count"))
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    let role: String = row.try_get("role").context("Missing role column")?;

    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: Role::from(role),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
