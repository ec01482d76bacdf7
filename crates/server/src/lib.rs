pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

/// Full application: `/api` routes plus CORS and request tracing
pub fn app(state: AppState, cors: CorsLayer) -> Router {
    routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
