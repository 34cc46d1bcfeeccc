//! User service
//!
//! Account operations behind the HTTP routes:
//! - Signup (the first account becomes admin, later ones get the user role)
//! - Authentication, which issues a session on matching credentials
//! - Logout
//! - Self-service and administrator account changes
//!
//! Password hashing and verification always go through the blocking pool.

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{
    AdminUpdateInput, ChangeAccountInput, LoginInput, Role, Session, SignupInput, User,
};
use crate::services::password::{CredentialHasher, HashingError};
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

/// Verified against when a login names no account, so both failure paths cost
/// one argon2 verification
const DUMMY_PASSWORD: &str = "gatehouse-unknown-account";

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Unknown email or wrong password; the two are deliberately not told apart
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Email already registered
    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("User not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Hashing(#[from] HashingError),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// User service for account management and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    hasher: CredentialHasher,
    /// Held across the user count and insert that decide the signup role
    signup_lock: Mutex<()>,
    /// Digest of `DUMMY_PASSWORD` under the configured work factor
    dummy_digest: OnceCell<String>,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        hasher: CredentialHasher,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            hasher,
            signup_lock: Mutex::new(()),
            dummy_digest: OnceCell::new(),
        }
    }

    /// Register a new account.
    ///
    /// The role is never taken from the client: the first account in an empty
    /// store becomes admin, every later one gets the user role.
    ///
    /// # Errors
    ///
    /// - `ValidationError` if name, email or password is empty or malformed
    /// - `UserExists` if the email is already registered
    /// - `Hashing` / `InternalError` on infrastructure failure
    pub async fn signup(&self, input: SignupInput) -> Result<User, UserServiceError> {
        validate_name_and_email(&input.name, &input.email)?;
        if input.password.is_empty() {
            return Err(UserServiceError::ValidationError(
                "Password cannot be empty".to_string(),
            ));
        }

        self.ensure_email_free(&input.email).await?;
        let password_hash = self.hasher.hash_async(input.password).await?;

        let _guard = self.signup_lock.lock().await;
        let is_first = self
            .user_repo
            .count()
            .await
            .context("Failed to count users")?
            == 0;
        let role = if is_first { Role::admin() } else { Role::user() };

        let user = User::new(input.name, input.email, password_hash, role);
        let created = self
            .user_repo
            .create(&user)
            .await
            .map_err(|e| store_write_error(e, &user.email))?;

        tracing::info!("Registered user {} with role {}", created.id, created.role);
        Ok(created)
    }

    /// Verify credentials and issue a new session.
    ///
    /// # Errors
    ///
    /// - `InvalidCredentials` for an unknown email or a wrong password
    /// - `InternalError` if the store fails
    pub async fn authenticate(&self, input: LoginInput) -> Result<(Session, User), UserServiceError> {
        let user = self
            .user_repo
            .get_by_email(&input.email)
            .await
            .context("Failed to get user by email")?;

        let Some(user) = user else {
            self.verify_against_dummy(input.password).await?;
            tracing::warn!("Login failed: no account for the submitted email");
            return Err(UserServiceError::InvalidCredentials);
        };

        if !self
            .hasher
            .verify_async(user.password_hash.clone(), input.password)
            .await
        {
            tracing::warn!("Login failed: wrong password for user {}", user.id);
            return Err(UserServiceError::InvalidCredentials);
        }

        let session = self
            .session_repo
            .create(user.id)
            .await
            .context("Failed to create session")?;

        tracing::info!("User {} logged in (session {})", user.id, session.id);
        Ok((session, user))
    }

    /// Delete a session. Returns false if it was already gone.
    pub async fn logout(&self, token: &str) -> Result<bool, UserServiceError> {
        let deleted = self
            .session_repo
            .delete_by_token(token)
            .await
            .context("Failed to delete session")?;
        Ok(deleted)
    }

    pub async fn list_users(&self) -> Result<Vec<User>, UserServiceError> {
        Ok(self.user_repo.list().await.context("Failed to list users")?)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<User, UserServiceError> {
        self.user_repo
            .get_by_email(email)
            .await
            .context("Failed to get user by email")?
            .ok_or_else(|| UserServiceError::NotFound(email.to_string()))
    }

    /// Update the caller's own name and email, and optionally the password.
    ///
    /// A password change requires the current password and a matching
    /// confirmation.
    pub async fn change_own_account(
        &self,
        user: &User,
        input: ChangeAccountInput,
    ) -> Result<User, UserServiceError> {
        validate_name_and_email(&input.name, &input.email)?;
        if input.email != user.email {
            self.ensure_email_free(&input.email).await?;
        }

        let mut updated = user.clone();
        updated.name = input.name;
        updated.email = input.email;

        if !input.new_password.is_empty() {
            if !self
                .hasher
                .verify_async(user.password_hash.clone(), input.current_password)
                .await
            {
                tracing::warn!("User {}: current password mismatch", user.id);
                return Err(UserServiceError::InvalidCredentials);
            }
            ensure_passwords_match(&input.new_password, &input.confirm_password)?;
            updated.password_hash = self.hasher.hash_async(input.new_password).await?;
        }

        let saved = self
            .user_repo
            .update(&updated)
            .await
            .map_err(|e| store_write_error(e, &updated.email))?;
        Ok(saved)
    }

    /// Administrator update of the account currently registered as
    /// `origin_email`.
    ///
    /// Resetting the password revokes every session of the target account.
    pub async fn admin_update(&self, input: AdminUpdateInput) -> Result<User, UserServiceError> {
        let target = self.find_by_email(&input.origin_email).await?;

        validate_name_and_email(&input.name, &input.email)?;
        if input.role.trim().is_empty() {
            return Err(UserServiceError::ValidationError(
                "Role cannot be empty".to_string(),
            ));
        }
        if input.email != target.email {
            self.ensure_email_free(&input.email).await?;
        }

        let mut updated = target.clone();
        updated.name = input.name;
        updated.email = input.email;
        updated.role = Role::from(input.role);

        let reset_password = !input.new_password.is_empty();
        if reset_password {
            ensure_passwords_match(&input.new_password, &input.confirm_password)?;
            updated.password_hash = self.hasher.hash_async(input.new_password).await?;
        }

        let saved = self
            .user_repo
            .update(&updated)
            .await
            .map_err(|e| store_write_error(e, &updated.email))?;

        if reset_password {
            let revoked = self
                .session_repo
                .delete_by_user(saved.id)
                .await
                .context("Failed to revoke sessions")?;
            tracing::info!("Password reset for user {} revoked {} session(s)", saved.id, revoked);
        }

        Ok(saved)
    }

    /// Delete the account registered as `email` together with its sessions
    pub async fn delete_user_by_email(&self, email: &str) -> Result<(), UserServiceError> {
        let user = self.find_by_email(email).await?;

        self.session_repo
            .delete_by_user(user.id)
            .await
            .context("Failed to revoke sessions")?;
        self.user_repo
            .delete(user.id)
            .await
            .context("Failed to delete user")?;

        tracing::info!("Deleted user {}", user.id);
        Ok(())
    }

    /// Spend one verification on a login that named no account
    async fn verify_against_dummy(&self, password: String) -> Result<(), UserServiceError> {
        let digest = self
            .dummy_digest
            .get_or_try_init(|| self.hasher.hash_async(DUMMY_PASSWORD.to_string()))
            .await?;
        self.hasher.verify_async(digest.clone(), password).await;
        Ok(())
    }

    async fn ensure_email_free(&self, email: &str) -> Result<(), UserServiceError> {
        let existing = self
            .user_repo
            .get_by_email(email)
            .await
            .context("Failed to check email")?;
        if existing.is_some() {
            return Err(UserServiceError::UserExists(format!(
                "Email '{}' is already registered",
                email
            )));
        }
        Ok(())
    }
}

fn validate_name_and_email(name: &str, email: &str) -> Result<(), UserServiceError> {
    if name.trim().is_empty() {
        return Err(UserServiceError::ValidationError(
            "Name cannot be empty".to_string(),
        ));
    }
    if email.trim().is_empty() {
        return Err(UserServiceError::ValidationError(
            "Email cannot be empty".to_string(),
        ));
    }
    if !email.contains('@') {
        return Err(UserServiceError::ValidationError(
            "Invalid email format".to_string(),
        ));
    }
    Ok(())
}

/// A unique-index violation on insert or update means the email was taken
/// after `ensure_email_free` passed
fn store_write_error(err: anyhow::Error, email: &str) -> UserServiceError {
    let unique_violation = err
        .downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .is_some_and(|db| db.is_unique_violation());
    if unique_violation {
        return UserServiceError::UserExists(format!("Email '{}' is already registered", email));
    }
    UserServiceError::InternalError(err.context("Failed to write user"))
}

fn ensure_passwords_match(new_password: &str, confirm: &str) -> Result<(), UserServiceError> {
    if new_password != confirm {
        return Err(UserServiceError::ValidationError(
            "New passwords must match".to_string(),
        ));
    }
    Ok(())
}
