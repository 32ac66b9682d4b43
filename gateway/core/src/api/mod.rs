//! Auth HTTP API
//!
//! The axum surface in front of the auth service: register, login,
//! logout, current-user lookup, and a health probe. CORS is permissive
//! because the browser UI is served from a different origin during
//! development.

mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::auth::AuthService;

/// Shared state for the API handlers.
#[derive(Clone)]
pub struct ApiState {
    /// The auth service, shared with the relay boundary.
    pub auth: Arc<AuthService>,
}

/// Build the auth API router.
#[must_use]
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route("/logout", post(handlers::logout))
        .route("/me", get(handlers::me))
        .route("/health", get(handlers::health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
