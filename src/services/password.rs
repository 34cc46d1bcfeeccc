//! Password hashing module
//!
//! `CredentialHasher` hashes and verifies passwords with Argon2id.
//!
//! # Security
//!
//! - Argon2id with a work factor taken from `auth.hash` in the configuration
//! - A fresh random salt for every hash, so equal passwords never share a digest
//! - Verification reads the parameters embedded in the digest, so hashes made
//!   under an older work factor keep verifying after the factor is raised
//! - The final digest comparison is constant-time (done inside `argon2`)
//!
//! Hashing is CPU-bound. Request handlers call the `*_async` variants, which
//! run on tokio's blocking pool instead of a runtime worker.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use thiserror::Error;

use crate::config::HashConfig;

/// Credential hashing infrastructure failure
#[derive(Debug, Error)]
pub enum HashingError {
    #[error("Invalid hashing parameters: {0}")]
    InvalidParams(String),

    #[error("Password hashing failed: {0}")]
    Failed(String),
}

/// Argon2id password hasher with a configured work factor.
#[derive(Debug, Clone)]
pub struct CredentialHasher {
    params: Params,
}

impl CredentialHasher {
    /// Build a hasher from the configured work factor.
    ///
    /// # Errors
    ///
    /// Returns `HashingError::InvalidParams` if argon2 rejects the values
    pub fn new(config: &HashConfig) -> Result<Self, HashingError> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| HashingError::InvalidParams(e.to_string()))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password, returning a PHC string
    /// (`$argon2id$v=19$m=..,t=..,p=..$<salt>$<hash>`).
    pub fn hash(&self, password: &str) -> Result<String, HashingError> {
        let salt = SaltString::generate(&mut OsRng);

        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| HashingError::Failed(e.to_string()))?;

        Ok(hash.to_string())
    }

    /// Verify a password against a stored digest.
    ///
    /// Returns `false` for a mismatch and for a digest that cannot be parsed;
    /// it never reports an error.
    pub fn verify(&self, digest: &str, password: &str) -> bool {
        let parsed = match PasswordHash::new(digest) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Stored password digest is malformed: {}", e);
                return false;
            }
        };

        self.argon2()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }

    /// Hash on the blocking thread pool
    pub async fn hash_async(&self, password: String) -> Result<String, HashingError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| HashingError::Failed(format!("hashing task aborted: {}", e)))?
    }

    /// Verify on the blocking thread pool
    pub async fn verify_async(&self, digest: String, password: String) -> bool {
        let hasher = self.clone();
        match tokio::task::spawn_blocking(move || hasher.verify(&digest, &password)).await {
            Ok(matched) => matched,
            Err(e) => {
                tracing::error!("Password verification task aborted: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn test_hasher() -> CredentialHasher {
    CredentialHasher::new(&HashConfig {
        memory_kib: 256,
        iterations: 1,
        parallelism: 1,
    })
    .expect("test params are valid")
}
