//! Services layer - Business logic
//!
//! - `password`: Argon2id credential hashing
//! - `session`: session token resolution with sliding expiration
//! - `access`: role-based authorization
//! - `reaper`: opportunistic cleanup of idle sessions
//! - `user`: account signup, login and administration

pub mod access;
pub mod password;
pub mod reaper;
pub mod session;
pub mod user;

pub use access::{authorize, RequiredRoles};
pub use password::{CredentialHasher, HashingError};
pub use reaper::SessionReaper;
pub use session::{AuthError, ResolvedSession, SessionResolver};
pub use user::{UserService, UserServiceError};
