//! REST API routes configuration

use crate::api::handlers::{self, ApiState};
use crate::api::websocket::ws_handler;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

/// Create the API router with all routes
pub fn create_router(state: ApiState) -> Router {
    // The dashboard is served from another origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // WebSocket for real-time updates
        .route("/ws", get(ws_handler))
        // Dashboard operations
        .route("/balances", get(handlers::get_balances))
        .route("/chain", get(handlers::get_chain))
        .route("/transaction", post(handlers::submit_transaction))
        .route("/mine", post(handlers::mine_block))
        .route("/attack", post(handlers::attack))
        // Inspection
        .route("/pending", get(handlers::get_pending))
        .route("/chain/validate", get(handlers::validate_chain))
        .route("/stats", get(handlers::get_stats))
        .with_state(state)
        .layer(cors)
}
