//! Administration endpoints
//!
//! Every route here is gated on the admin role by the router:
//! - GET  /admin                 - current user and all accounts
//! - GET  /admin/profile?email=  - one account, for editing
//! - POST /change_account_admin  - update another account
//! - POST /delete_user           - delete an account and its sessions

use axum::{
    extract::{Query, State},
    response::Redirect,
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{AdminUpdateInput, User};

#[derive(Debug, Serialize)]
pub struct AdminOverview {
    pub user: User,
    pub users: Vec<User>,
}

#[derive(Debug, Serialize)]
pub struct AdminProfile {
    pub user: User,
    pub target: User,
}

/// Account addressed by email, from a query string or a form
#[derive(Debug, Deserialize)]
pub struct EmailParam {
    pub email: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin", get(overview))
        .route("/admin/profile", get(profile))
        .route("/change_account_admin", post(change_account))
        .route("/delete_user", post(delete_user))
}

/// GET /admin
async fn overview(
    State(state): State<AppState>,
    identity: AuthenticatedUser,
) -> Result<Json<AdminOverview>, ApiError> {
    let users = state.user_service.list_users().await?;
    Ok(Json(AdminOverview {
        user: identity.user,
        users,
    }))
}

/// GET /admin/profile?email=
async fn profile(
    State(state): State<AppState>,
    identity: AuthenticatedUser,
    Query(params): Query<EmailParam>,
) -> Result<Json<AdminProfile>, ApiError> {
    let target = state.user_service.find_by_email(&params.email).await?;
    Ok(Json(AdminProfile {
        user: identity.user,
        target,
    }))
}

/// POST /change_account_admin
async fn change_account(
    State(state): State<AppState>,
    identity: AuthenticatedUser,
    Form(input): Form<AdminUpdateInput>,
) -> Result<Redirect, ApiError> {
    let updated = state.user_service.admin_update(input).await?;
    tracing::info!("Admin {} updated user {}", identity.user.id, updated.id);
    Ok(Redirect::to("/admin"))
}

/// POST /delete_user
async fn delete_user(
    State(state): State<AppState>,
    identity: AuthenticatedUser,
    Form(params): Form<EmailParam>,
) -> Result<Redirect, ApiError> {
    state.user_service.delete_user_by_email(&params.email).await?;
    tracing::info!("Admin {} deleted an account", identity.user.id);
    Ok(Redirect::to("/admin"))
}
