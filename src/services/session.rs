//! Session resolution
//!
//! Turns the token carried by a request into a live session and its owner,
//! applying sliding expiration: every successful resolution moves the
//! session's last-activity timestamp to "now".

use std::sync::Arc;

use chrono::{Duration, Utc};
use thiserror::Error;

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{Session, User};

/// Authentication and authorization outcomes other than success
#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing, unknown or expired session
    #[error("Authentication required")]
    Unauthenticated,

    /// Valid session whose user lacks the required role
    #[error("Insufficient permissions")]
    Forbidden,

    #[error("Session store failure: {0}")]
    StoreError(#[from] anyhow::Error),

    /// A session references a user that does not exist
    #[error("Session {session_id} references missing user {user_id}")]
    StoreConsistencyError { session_id: i64, user_id: i64 },
}

/// A session that passed validation, with a copy of its owner
#[derive(Debug, Clone)]
pub struct ResolvedSession {
    pub session: Session,
    pub user: User,
}

/// Validates session tokens against the store.
pub struct SessionResolver {
    sessions: Arc<dyn SessionRepository>,
    users: Arc<dyn UserRepository>,
    session_length: Duration,
}

impl SessionResolver {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        users: Arc<dyn UserRepository>,
        session_length: Duration,
    ) -> Self {
        Self {
            sessions,
            users,
            session_length,
        }
    }

    /// Permitted inactivity before a session expires
    pub fn session_length(&self) -> Duration {
        self.session_length
    }

    /// Resolve a session token.
    ///
    /// No store lookup happens for an absent or empty token. A session idle
    /// for longer than the session length is deleted on sight, so expiry does
    /// not depend on the reaper having run.
    pub async fn resolve(&self, token: Option<&str>) -> Result<ResolvedSession, AuthError> {
        let token = match token {
            Some(token) if !token.is_empty() => token,
            _ => return Err(AuthError::Unauthenticated),
        };

        let Some(mut session) = self.sessions.get_by_token(token).await? else {
            tracing::debug!("Session token not found in store");
            return Err(AuthError::Unauthenticated);
        };

        let now = Utc::now();
        if session.is_idle(self.session_length, now) {
            tracing::info!(
                "Session {} for user {} expired after inactivity",
                session.id,
                session.user_id
            );
            if let Err(e) = self.sessions.delete_by_token(token).await {
                tracing::warn!("Failed to delete expired session {}: {:#}", session.id, e);
            }
            return Err(AuthError::Unauthenticated);
        }

        // Lost updates between concurrent touches are tolerated
        if !self.sessions.touch(token, now).await? {
            tracing::debug!("Session {} vanished before refresh", session.id);
            return Err(AuthError::Unauthenticated);
        }
        session.last_activity_at = now;

        let user = self.users.get_by_id(session.user_id).await?.ok_or(
            AuthError::StoreConsistencyError {
                session_id: session.id,
                user_id: session.user_id,
            },
        )?;

        Ok(ResolvedSession { session, user })
    }
}
