//! Route definitions for the package API.

use crate::handlers;
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};

/// Prefix of every package route.
pub const PACKAGES_PATH: &str = "/api/v2/packages";

/// Path of the apply endpoint.
pub const APPLY_PATH: &str = "/api/v2/packages/apply";

/// Create the package API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(PACKAGES_PATH, post(handlers::create_package))
        .route(APPLY_PATH, post(handlers::apply_package))
        .route("/health", get(handlers::health))
        .with_state(state)
}
