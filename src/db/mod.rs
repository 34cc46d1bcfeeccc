//! Database layer
//!
//! Users and sessions are persisted through sqlx in either SQLite (default,
//! single-file deployment) or MySQL. The driver is chosen by configuration and
//! hidden behind `DatabasePool`; repositories in `repositories` expose the
//! single-statement operations the authentication core relies on.

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
