//! Session model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Login grant issued after successful credential verification.
///
/// `token` is the external identifier carried in the `session` cookie; `id`
/// never leaves the store. Only `last_activity_at` changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Internal row id
    pub id: i64,
    /// Opaque session token
    #[serde(skip_serializing)]
    pub token: String,
    /// Owning user id
    pub user_id: i64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last successful resolution
    pub last_activity_at: DateTime<Utc>,
}

impl Session {
    /// Check whether the session has been idle for longer than `session_length`
    ///
    /// A window reaching past the earliest representable time never expires.
    pub fn is_idle(&self, session_length: Duration, now: DateTime<Utc>) -> bool {
        match now.checked_sub_signed(session_length) {
            Some(cutoff) => self.last_activity_at < cutoff,
            None => false,
        }
    }
}
