//! API routes for the HappyBeauty server.

pub mod admin;
pub mod credits;
pub mod payment;
pub mod profile;
pub mod referrals;

use std::time::Duration;

use axum::Router;
use tower_http::timeout::TimeoutLayer;

use crate::state::AppState;

/// Deadline for user-initiated requests.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Creates the main API router with all routes mounted.
pub fn create_router(state: AppState) -> Router {
    Router::new().nest("/api/v1", api_v1_routes(state))
}

/// Creates the v1 API routes.
fn api_v1_routes(state: AppState) -> Router {
    let user_routes = Router::new()
        .merge(payment::router(state.clone()))
        .merge(profile::router(state.clone()))
        .merge(credits::router(state.clone()))
        .merge(referrals::router(state.clone()))
        .merge(admin::router(state.clone()))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT));

    user_routes.merge(payment::notify_router(state))
}
