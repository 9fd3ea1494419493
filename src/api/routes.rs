//! HTTP API route definitions.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{
    delete_opportunity, get_opportunity, get_order_books, health, list_opportunities, ready, refresh,
    top_opportunities, AppState,
};

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Opportunities
        .route("/api/v1/opportunities", get(list_opportunities))
        .route("/api/v1/opportunities/top", get(top_opportunities))
        .route("/api/v1/opportunities/refresh", post(refresh))
        .route(
            "/api/v1/opportunities/:id",
            get(get_opportunity).delete(delete_opportunity),
        )
        .route("/api/v1/opportunities/:id/orderbooks", get(get_order_books))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
