pub mod api;
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod middleware;
pub mod permission;
pub mod plan;
pub mod services;
pub mod state;
pub mod types;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// The full router. CORS is layered on by the binary from configuration.
pub fn app(state: AppState) -> Router {
    Router::new()
        // Public
        .route("/", get(handlers::service::root))
        .route("/health", get(handlers::service::health))
        .merge(rest_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn rest_routes(state: AppState) -> Router<AppState> {
    use handlers::rest;

    Router::new()
        .route(
            "/rest/:group",
            post(rest::create).put(rest::update).delete(rest::delete),
        )
        .route("/rest/:group/filtered/*types", post(rest::filtered_post))
        .route("/rest/:group/plan", get(rest::plan_get))
        .route_layer(from_fn_with_state(state, middleware::identity_middleware))
}
