pub mod health;
pub mod payments;
pub mod service;

use axum::Router;

use crate::state::AppState;

/// Build the complete API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(payments::router())
        .merge(service::router())
        .with_state(state)
}
