//! Authentication endpoints
//!
//! Form-encoded account routes:
//! - GET  /                - landing (identity shown when logged in)
//! - POST /signup_account  - create an account
//! - POST /authenticate    - log in, issuing the session cookie
//! - GET/POST /logout      - delete the session and clear the cookie
//! - GET  /profile         - current user
//! - POST /change_account  - update own account

use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Serialize;

use crate::api::middleware::{
    append_cookie, cleared_session_cookie, session_cookie, ApiError, AppState, AuthenticatedUser,
};
use crate::models::{ChangeAccountInput, LoginInput, SignupInput, User};
use crate::services::UserServiceError;

/// Landing page payload
#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

/// Landing route; expects `optional_auth`
pub fn landing_router() -> Router<AppState> {
    Router::new().route("/", get(index))
}

/// Routes reachable without a session
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/signup_account", post(signup_account))
        .route("/authenticate", post(authenticate))
}

/// Routes for any logged-in user; expects `require_auth`
pub fn account_router() -> Router<AppState> {
    Router::new()
        .route("/logout", get(logout).post(logout))
        .route("/profile", get(profile))
        .route("/change_account", post(change_account))
}

async fn index(identity: Option<AuthenticatedUser>) -> Json<IndexResponse> {
    Json(IndexResponse {
        authenticated: identity.is_some(),
        user: identity.map(|identity| identity.user),
    })
}

/// POST /signup_account
async fn signup_account(
    State(state): State<AppState>,
    Form(input): Form<SignupInput>,
) -> Result<Redirect, ApiError> {
    state.user_service.signup(input).await?;
    Ok(Redirect::to(&state.auth.login_route))
}

/// POST /authenticate
///
/// Wrong credentials send the client back to the login route without a cookie.
async fn authenticate(
    State(state): State<AppState>,
    Form(input): Form<LoginInput>,
) -> Result<Response, ApiError> {
    match state.user_service.authenticate(input).await {
        Ok((session, _user)) => {
            let mut headers = HeaderMap::new();
            append_cookie(
                &mut headers,
                &session_cookie(&session.token, state.auth.session_length_secs),
            );
            Ok((headers, Redirect::to(&state.auth.landing_route)).into_response())
        }
        Err(UserServiceError::InvalidCredentials) => {
            Ok(Redirect::to(&state.auth.login_route).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// GET|POST /logout
///
/// Also gives the reaper a chance to sweep idle sessions in the background.
async fn logout(
    State(state): State<AppState>,
    identity: AuthenticatedUser,
) -> Result<Response, ApiError> {
    let deleted = state.user_service.logout(&identity.session.token).await?;
    if deleted {
        tracing::info!("User {} logged out", identity.user.id);
    } else {
        tracing::warn!("Session {} was already gone at logout", identity.session.id);
    }

    state.reaper.maybe_sweep();

    let mut headers = HeaderMap::new();
    append_cookie(&mut headers, &cleared_session_cookie());
    Ok((headers, Redirect::to(&state.auth.landing_route)).into_response())
}

/// GET /profile
async fn profile(identity: AuthenticatedUser) -> Json<User> {
    Json(identity.user)
}

/// POST /change_account
async fn change_account(
    State(state): State<AppState>,
    identity: AuthenticatedUser,
    Form(input): Form<ChangeAccountInput>,
) -> Result<Redirect, ApiError> {
    state
        .user_service
        .change_own_account(&identity.user, input)
        .await?;
    Ok(Redirect::to("/profile"))
}
