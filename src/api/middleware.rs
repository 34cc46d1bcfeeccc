//! API middleware
//!
//! Contains:
//! - `AppState`, the shared services handed to every handler
//! - `ApiError`, the single JSON error body
//! - Session cookie helpers
//! - `require_auth` / `optional_auth` (session resolution gates)
//! - `require_roles` (role gate, always layered inside `require_auth`)

use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;

use crate::config::AuthConfig;
use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
use crate::db::DynDatabasePool;
use crate::models::{Session, User};
use crate::services::{
    authorize, AuthError, CredentialHasher, RequiredRoles, ResolvedSession, SessionReaper,
    SessionResolver, UserService, UserServiceError,
};

/// Name of the cookie carrying the session token
pub const SESSION_COOKIE: &str = "session";

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub resolver: Arc<SessionResolver>,
    pub reaper: Arc<SessionReaper>,
    pub auth: Arc<AuthConfig>,
}

impl AppState {
    /// Wire repositories and services over a migrated pool
    pub fn new(pool: DynDatabasePool, auth: &AuthConfig) -> anyhow::Result<Self> {
        let users = SqlxUserRepository::boxed(pool.clone());
        let sessions = SqlxSessionRepository::boxed(pool);
        let hasher = CredentialHasher::new(&auth.hash)?;
        let session_length = auth.session_length();

        Ok(Self {
            user_service: Arc::new(UserService::new(users.clone(), sessions.clone(), hasher)),
            resolver: Arc::new(SessionResolver::new(sessions.clone(), users, session_length)),
            reaper: Arc::new(SessionReaper::new(sessions, session_length)),
            auth: Arc::new(auth.clone()),
        })
    }
}

/// Identity attached to the request by `require_auth` or `optional_auth`
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    pub session: Session,
}

impl From<ResolvedSession> for AuthenticatedUser {
    fn from(resolved: ResolvedSession) -> Self {
        Self {
            user: resolved.user,
            session: resolved.session,
        }
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

impl<S> OptionalFromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<AuthenticatedUser>().cloned())
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthenticated => ApiError::unauthorized("Authentication required"),
            AuthError::Forbidden => ApiError::forbidden("Insufficient permissions"),
            AuthError::StoreError(e) => {
                tracing::error!("Session store failure: {:#}", e);
                ApiError::internal_error("Internal server error")
            }
            err @ AuthError::StoreConsistencyError { .. } => {
                tracing::error!("Store consistency violation: {}", err);
                ApiError::internal_error("Internal server error")
            }
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::InvalidCredentials => ApiError::unauthorized(err.to_string()),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(msg) => ApiError::conflict(msg),
            UserServiceError::NotFound(email) => {
                ApiError::not_found(format!("User '{}' not found", email))
            }
            UserServiceError::Hashing(e) => {
                tracing::error!("Credential hashing failed: {}", e);
                ApiError::internal_error("Internal server error")
            }
            UserServiceError::InternalError(e) => {
                tracing::error!("User service failure: {:#}", e);
                ApiError::internal_error("Internal server error")
            }
        }
    }
}

// ============================================================================
// Session cookie
// ============================================================================

/// Extract the session token from the `Cookie` header
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    let prefix = format!("{}=", SESSION_COOKIE);
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|cookie| cookie.trim().strip_prefix(prefix.as_str()).map(str::to_string))
}

/// `Set-Cookie` value issuing `token` for `max_age_secs`
pub fn session_cookie(token: &str, max_age_secs: u64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, max_age_secs
    )
}

/// `Set-Cookie` value removing the session cookie
pub fn cleared_session_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
}

/// Append a `Set-Cookie` header, skipping values that are not valid header text
pub fn append_cookie(headers: &mut HeaderMap, cookie: &str) {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            headers.append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::error!("Refusing to emit malformed cookie: {}", e),
    }
}

fn sets_session_cookie(headers: &HeaderMap) -> bool {
    let prefix = format!("{}=", SESSION_COOKIE);
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.starts_with(prefix.as_str()))
}

/// Slide the client-side expiry forward unless the handler already set the cookie
fn refresh_session_cookie(response: &mut Response, token: &str, max_age_secs: u64) {
    if !sets_session_cookie(response.headers()) {
        append_cookie(response.headers_mut(), &session_cookie(token, max_age_secs));
    }
}

// ============================================================================
// Gates
// ============================================================================

/// Authentication middleware
///
/// Unauthenticated requests are redirected to the landing route without
/// reaching the handler. Store failures become a generic 500.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = extract_session_token(request.headers());

    match state.resolver.resolve(token.as_deref()).await {
        Ok(resolved) => {
            let token = resolved.session.token.clone();
            request
                .extensions_mut()
                .insert(AuthenticatedUser::from(resolved));

            let mut response = next.run(request).await;
            refresh_session_cookie(&mut response, &token, state.auth.session_length_secs);
            response
        }
        Err(AuthError::Unauthenticated) => {
            tracing::warn!(
                "Unauthenticated request to {} redirected to {}",
                request.uri().path(),
                state.auth.landing_route
            );
            Redirect::to(&state.auth.landing_route).into_response()
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Optional authentication middleware
///
/// Attaches the identity when the request carries a valid session and lets
/// every request through.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_session_token(request.headers()) else {
        return next.run(request).await;
    };

    match state.resolver.resolve(Some(token.as_str())).await {
        Ok(resolved) => {
            request
                .extensions_mut()
                .insert(AuthenticatedUser::from(resolved));
            let mut response = next.run(request).await;
            refresh_session_cookie(&mut response, &token, state.auth.session_length_secs);
            response
        }
        Err(AuthError::Unauthenticated) => next.run(request).await,
        Err(e) => {
            tracing::error!("Optional session resolution failed: {}", e);
            next.run(request).await
        }
    }
}

/// Role authorization middleware
///
/// Must run after `require_auth`. A user outside `roles` receives 403 and the
/// handler is not invoked.
pub async fn require_roles(
    State(roles): State<RequiredRoles>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !authorize(&identity.user, &roles) {
        tracing::warn!(
            "User {} with role '{}' denied access to {}",
            identity.user.id,
            identity.user.role,
            request.uri().path()
        );
        return Err(AuthError::Forbidden.into());
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with_cookie(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        headers
    }

    #[test]
    fn test_extract_session_token() {
        assert_eq!(
            extract_session_token(&headers_with_cookie("session=abc")),
            Some("abc".to_string())
        );
        assert_eq!(
            extract_session_token(&headers_with_cookie("theme=dark; session=abc; lang=en")),
            Some("abc".to_string())
        );
        assert_eq!(extract_session_token(&headers_with_cookie("theme=dark")), None);
        assert_eq!(extract_session_token(&headers_with_cookie("xsession=abc")), None);
        assert_eq!(extract_session_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_empty_session_cookie_yields_empty_token() {
        assert_eq!(
            extract_session_token(&headers_with_cookie("session=")),
            Some(String::new())
        );
    }

    #[test]
    fn test_cookie_formats() {
        assert_eq!(
            session_cookie("tok", 3600),
            "session=tok; Path=/; HttpOnly; SameSite=Lax; Max-Age=3600"
        );
        assert!(cleared_session_cookie().ends_with("Max-Age=0"));
        assert!(cleared_session_cookie().starts_with("session=;"));
    }

    #[test]
    fn test_refresh_respects_existing_session_cookie() {
        let mut response = StatusCode::OK.into_response();
        append_cookie(response.headers_mut(), &cleared_session_cookie());

        refresh_session_cookie(&mut response, "tok", 60);

        let cookies: Vec<_> = response.headers().get_all(header::SET_COOKIE).iter().collect();
        assert_eq!(cookies.len(), 1);
    }

    #[test]
    fn test_api_error_status_codes() {
        let cases = [
            (ApiError::unauthorized("x"), StatusCode::UNAUTHORIZED),
            (ApiError::forbidden("x"), StatusCode::FORBIDDEN),
            (ApiError::not_found("x"), StatusCode::NOT_FOUND),
            (ApiError::validation_error("x"), StatusCode::BAD_REQUEST),
            (ApiError::conflict("x"), StatusCode::CONFLICT),
            (ApiError::internal_error("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn test_store_errors_are_generic() {
        let err = ApiError::from(AuthError::StoreConsistencyError {
            session_id: 1,
            user_id: 2,
        });
        assert_eq!(err.error.code, "INTERNAL_ERROR");
        assert!(!err.error.message.contains('2'));

        let err = ApiError::from(AuthError::StoreError(anyhow::anyhow!("disk full")));
        assert_eq!(err.error.message, "Internal server error");
    }
}
