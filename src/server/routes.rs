//! Router configuration for the web server.

use axum::{middleware, routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use super::throttling::throttle_requests;
use super::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    // Product routes count against the client's quota
    let products = Router::new()
        .route("/products", get(handlers::all_products))
        .route("/products/:source_id", get(handlers::source_products))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            throttle_requests,
        ));

    Router::new()
        .merge(products)
        .route("/sources", get(handlers::list_sources))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
