//! HTTP surface for the poll channel.

mod health;
mod poll;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .nest("/v1", poll::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
