//! API routes module

pub mod health;
pub mod lost_found;

use axum::Router;

use crate::state::AppState;

/// Create all API routes
/// Note: These are nested under /api by axum_helpers::create_router
pub fn routes(state: &AppState) -> Router {
    Router::new()
        .merge(lost_found::router(state))
        .merge(health::router(state.clone()))
}
