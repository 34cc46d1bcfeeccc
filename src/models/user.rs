//! User model
//!
//! This module defines the User entity, the open role vocabulary used for
//! authorization and the account inputs accepted by the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role held by ordinary accounts
pub const ROLE_USER: &str = "user";

/// Role required by the administration routes
pub const ROLE_ADMIN: &str = "admin";

/// User entity representing a registered account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Display name
    pub name: String,
    /// Email address (unique, case-sensitive as stored)
    pub email: String,
    /// Password hash (argon2 PHC string)
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Role label
    pub role: Role,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new User with the given parameters.
    ///
    /// Note: The password must already be hashed before calling this function.
    /// Use `CredentialHasher::hash` to hash the password.
    pub fn new(name: String, email: String, password_hash: String, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by the database
            name,
            email,
            password_hash,
            role,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check whether the user holds exactly the given role
    pub fn has_role(&self, role: &str) -> bool {
        self.role.as_str() == role
    }
}

/// Role label drawn from an open string set.
///
/// Matching is exact: no case folding and no hierarchy between roles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(String);

impl Role {
    pub fn new(role: impl Into<String>) -> Self {
        Self(role.into())
    }

    pub fn user() -> Self {
        Self::new(ROLE_USER)
    }

    pub fn admin() -> Self {
        Self::new(ROLE_ADMIN)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Role {
    fn default() -> Self {
        Self::user()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Signup form
#[derive(Debug, Clone, Deserialize)]
pub struct SignupInput {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Login form
#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

/// Self-service account update.
///
/// Password fields are optional; leaving `new_password` empty keeps the
/// current password.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeAccountInput {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub confirm_password: String,
}

/// Administrator update of another account, addressed by its current email
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminUpdateInput {
    pub origin_email: String,
    pub name: String,
    pub email: String,
    pub role: String,
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub confirm_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_new() {
        let user = User::new(
            "Alice".to_string(),
            "a@x.com".to_string(),
            "hashed_password".to_string(),
            Role::user(),
        );

        assert_eq!(user.id, 0);
        assert_eq!(user.name, "Alice");
        assert_eq!(user.email, "a@x.com");
        assert_eq!(user.role, Role::user());
        assert_eq!(user.created_at, user.updated_at);
    }

    #[test]
    fn test_has_role_is_exact() {
        let admin = User::new("a".into(), "a@x.com".into(), "h".into(), Role::admin());
        let shouty = User::new("b".into(), "b@x.com".into(), "h".into(), Role::from("ADMIN"));

        assert!(admin.has_role(ROLE_ADMIN));
        assert!(!admin.has_role(ROLE_USER));
        assert!(!shouty.has_role(ROLE_ADMIN));
    }

    #[test]
    fn test_role_serializes_as_plain_string() {
        assert_eq!(serde_json::to_string(&Role::admin()).unwrap(), "\"admin\"");
        let role: Role = serde_json::from_str("\"auditor\"").unwrap();
        assert_eq!(role.as_str(), "auditor");
        assert_eq!(role.to_string(), "auditor");
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User::new("a".into(), "a@x.com".into(), "secret-hash".into(), Role::user());
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret-hash"));
        assert!(!json.contains("password_hash"));
    }

    #[test]
    fn test_role_default() {
        assert_eq!(Role::default(), Role::user());
    }
}
