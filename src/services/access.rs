//! Role-based authorization
//!
//! Roles are a flat, open set of labels. A route admits a user when it
//! requires no role at all or when the user's role is one of those listed.

use std::collections::BTreeSet;

use crate::models::User;

/// Set of roles a route accepts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredRoles(BTreeSet<String>);

impl RequiredRoles {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(roles.into_iter().map(Into::into).collect())
    }

    /// No role requirement; any authenticated user is admitted
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, role: &str) -> bool {
        self.0.contains(role)
    }
}

/// Decide whether `user` may pass a gate requiring `required`
pub fn authorize(user: &User, required: &RequiredRoles) -> bool {
    required.is_empty() || required.contains(user.role.as_str())
}
