//! API layer - HTTP handlers and routing
//!
//! Requests pass an ordered chain of gates before reaching a handler:
//! session resolution (`require_auth`), then the role check
//! (`require_roles`). `protect` is the only place that chain is assembled.

pub mod admin;
pub mod auth;
pub mod middleware;


use axum::{middleware as axum_middleware, Router};
use tower_http::trace::TraceLayer;

use crate::models::ROLE_ADMIN;
use crate::services::RequiredRoles;

pub use middleware::{ApiError, AppState, AuthenticatedUser};

/// Gate every route of `router` behind authentication and `roles`.
///
/// Route layers wrap outside-in, so the last one added runs first: the role
/// check always sees an already-resolved identity.
pub fn protect(router: Router<AppState>, state: &AppState, roles: RequiredRoles) -> Router<AppState> {
    router
        .route_layer(axum_middleware::from_fn_with_state(
            roles,
            middleware::require_roles,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let landing = auth::landing_router().route_layer(axum_middleware::from_fn_with_state(
        state.clone(),
        middleware::optional_auth,
    ));
    let account = protect(auth::account_router(), &state, RequiredRoles::none());
    let admin = protect(admin::router(), &state, RequiredRoles::new([ROLE_ADMIN]));

    Router::new()
        .merge(landing)
        .merge(auth::public_router())
        .merge(account)
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
