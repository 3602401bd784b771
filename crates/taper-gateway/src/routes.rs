//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use taper_store::Store;

use crate::auth::require_auth;
use crate::handlers::{auth, health, user};
use crate::state::GatewayState;
use crate::user::resolve_user;

/// Create the gateway router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `POST /auth/request-otp` - Send an OTP
/// - `POST /auth/verify-otp` - Log in with an OTP
/// - `POST /auth/refresh` - Rotate a refresh token (bearer refresh token)
///
/// ## Authenticated
/// - `POST /auth/logout` - End one device session
/// - `POST /auth/logout-all` - End every device session
/// - `GET /auth/profile` - Profile read from the store
///
/// ## Authenticated, active user
/// - `GET /auth/token?device_id=` - Mint a token pair for a device
/// - `GET /user/profile` - Profile read through the user cache
pub fn create_router<S>(state: GatewayState<S>) -> Router
where
    S: Store + 'static,
{
    // Extract config values before moving state
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout = state.config.request_timeout();

    let state = Arc::new(state);

    let public = Router::new()
        .route("/health", get(health::health))
        .route("/auth/request-otp", post(auth::request_otp::<S>))
        .route("/auth/verify-otp", post(auth::verify_otp::<S>))
        .route("/auth/refresh", post(auth::refresh::<S>));

    let active_user = Router::new()
        .route("/auth/token", get(auth::token::<S>))
        .route("/user/profile", get(user::get_profile))
        .route_layer(from_fn_with_state(state.clone(), resolve_user::<S>));

    // require_auth wraps resolve_user, so it runs first
    let authenticated = Router::new()
        .route("/auth/logout", post(auth::logout::<S>))
        .route("/auth/logout-all", post(auth::logout_all::<S>))
        .route("/auth/profile", get(auth::profile::<S>))
        .merge(active_user)
        .route_layer(from_fn_with_state(state.clone(), require_auth::<S>));

    public
        .merge(authenticated)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match o.parse::<HeaderValue>() {
                Ok(origin) => Some(origin),
                Err(_) => {
                    tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
