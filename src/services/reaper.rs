//! Idle session reaper
//!
//! Deletes sessions that have been inactive for longer than the session
//! length. There is no timer: callers such as logout invoke `maybe_sweep`,
//! which starts a background sweep at most once per session length.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::task::JoinHandle;

use crate::db::repositories::SessionRepository;

pub struct SessionReaper {
    sessions: Arc<dyn SessionRepository>,
    session_length: Duration,
    /// Unix milliseconds of the last sweep start; 0 (the epoch) at startup
    last_swept_ms: AtomicI64,
}

impl SessionReaper {
    pub fn new(sessions: Arc<dyn SessionRepository>, session_length: Duration) -> Self {
        Self {
            sessions,
            session_length,
            last_swept_ms: AtomicI64::new(0),
        }
    }

    /// Delete every session idle since before `now - session_length`
    pub async fn sweep(&self, session_length: Duration) -> Result<u64> {
        let Some(cutoff) = Utc::now().checked_sub_signed(session_length) else {
            tracing::warn!("Session length reaches past the earliest time, nothing to sweep");
            return Ok(0);
        };
        let deleted = self.sessions.delete_idle_since(cutoff).await?;
        tracing::info!("Session sweep removed {} idle session(s)", deleted);
        Ok(deleted)
    }

    /// When the last sweep started
    pub fn last_swept(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.last_swept_ms.load(Ordering::Acquire))
            .single()
            .unwrap_or_default()
    }

    /// Start a background sweep if more than one session length has passed
    /// since the previous one.
    ///
    /// Returns the spawned task, or `None` if no sweep was due. The caller is
    /// not expected to await the handle.
    pub fn maybe_sweep(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let now_ms = Utc::now().timestamp_millis();
        let last = self.last_swept_ms.load(Ordering::Acquire);
        if now_ms - last <= self.session_length.num_milliseconds() {
            return None;
        }

        // Only the trigger that wins the swap starts a sweep
        self.last_swept_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;

        let reaper = Arc::clone(self);
        Some(tokio::spawn(async move {
            if let Err(e) = reaper.sweep(reaper.session_length).await {
                tracing::error!("Session sweep failed: {:#}", e);
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Role, User};

    async fn setup() -> (Arc<dyn SessionRepository>, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let users = SqlxUserRepository::new(pool.clone());
        let user = users
            .create(&User::new("A".into(), "a@x.com".into(), "h".into(), Role::user()))
            .await
            .unwrap();
        (SqlxSessionRepository::boxed(pool), user.id)
    }

    #[tokio::test]
    async fn test_sweep_deletes_only_idle_sessions() {
        let (sessions, user_id) = setup().await;
        let stale = sessions.create(user_id).await.unwrap();
        let fresh = sessions.create(user_id).await.unwrap();
        sessions
            .touch(&stale.token, Utc::now() - Duration::hours(2))
            .await
            .unwrap();

        let reaper = SessionReaper::new(sessions.clone(), Duration::hours(1));
        let deleted = reaper.sweep(Duration::hours(1)).await.unwrap();

        assert_eq!(deleted, 1);
        assert!(sessions.get_by_token(&stale.token).await.unwrap().is_none());
        assert!(sessions.get_by_token(&fresh.token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sweep_with_unrepresentable_window_deletes_nothing() {
        let (sessions, user_id) = setup().await;
        let old = sessions.create(user_id).await.unwrap();
        sessions
            .touch(&old.token, Utc::now() - Duration::days(3650))
            .await
            .unwrap();

        let length = Duration::days(365 * 1_000_000);
        let reaper = SessionReaper::new(sessions.clone(), length);

        assert_eq!(reaper.sweep(length).await.unwrap(), 0);
        assert!(sessions.get_by_token(&old.token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_last_swept_starts_at_epoch() {
        let (sessions, _) = setup().await;
        let reaper = SessionReaper::new(sessions, Duration::hours(1));

        assert_eq!(reaper.last_swept(), DateTime::<Utc>::default());
    }

    #[tokio::test]
    async fn test_maybe_sweep_runs_once_per_window() {
        let (sessions, user_id) = setup().await;
        let stale = sessions.create(user_id).await.unwrap();
        sessions
            .touch(&stale.token, Utc::now() - Duration::hours(2))
            .await
            .unwrap();
        let reaper = Arc::new(SessionReaper::new(sessions.clone(), Duration::hours(1)));

        let handle = reaper.maybe_sweep().expect("first trigger should sweep");
        handle.await.unwrap();
        assert!(sessions.get_by_token(&stale.token).await.unwrap().is_none());
        assert!(reaper.last_swept() > DateTime::<Utc>::default());

        assert!(reaper.maybe_sweep().is_none());
    }

    #[tokio::test]
    async fn test_repeated_triggers_start_one_sweep() {
        let (sessions, _) = setup().await;
        let reaper = Arc::new(SessionReaper::new(sessions, Duration::hours(1)));

        let started: Vec<_> = (0..8).filter_map(|_| reaper.maybe_sweep()).collect();
        assert_eq!(started.len(), 1);
        for handle in started {
            handle.await.unwrap();
        }
    }
}
