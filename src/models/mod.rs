//! Data models
//!
//! This module contains the data structures shared by the store, the
//! authentication services and the HTTP layer:
//! - Database entities (User, Session)
//! - Role labels used for authorization
//! - Account request inputs

mod session;
mod user;

pub use session::Session;
pub use user::{
    AdminUpdateInput, ChangeAccountInput, LoginInput, Role, SignupInput, User, ROLE_ADMIN,
    ROLE_USER,
};
