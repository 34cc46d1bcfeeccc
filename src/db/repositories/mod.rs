//! Database repositories
//!
//! Each repository owns the queries for one entity. Every operation is a
//! single atomic statement; callers never rely on multi-record transactions.

pub mod session;
pub mod user;

pub use session::{SessionRepository, SqlxSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};
