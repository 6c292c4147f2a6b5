pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod routes;
pub mod services;

use axum::{extract::DefaultBodyLimit, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use config::Config;
use services::extraction::Extractor;
use services::mappings::MappingTable;

// Application state
pub struct AppState {
    pub config: Config,
    pub mappings: Arc<MappingTable>,
    pub extractor: Arc<Extractor>,
}

impl AppState {
    pub fn new(config: Config, mappings: MappingTable, http: reqwest::Client) -> Self {
        let extractor = Extractor::new(&config, http);
        Self {
            config,
            mappings: Arc::new(mappings),
            extractor: Arc::new(extractor),
        }
    }
}

/// Builds the router. Kept apart from `main` so tests can drive it directly.
pub fn create_router(state: Arc<AppState>) -> Router {
    let max_file_size = state.config.max_file_size;

    Router::new()
        .merge(routes::routes())
        .layer(DefaultBodyLimit::max(max_file_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
