use axum::{
    Router,
    routing::get,
};

use scheduling_cell::handlers::health_check;
use scheduling_cell::{scheduling_routes, ToolState};
use shared_config::AppConfig;

pub fn create_router(config: &AppConfig) -> Router {
    let state = ToolState::from_config(config);

    Router::new()
        .route("/", get(|| async { "Scheduling API is running!" }))
        .route("/health", get(health_check))
        .nest("/tools", scheduling_routes(state))
}
