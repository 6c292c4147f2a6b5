use anyhow::{Context, Result};
use std::sync::Arc;
use table_updater::{
    config::Config, create_router, logging, services::mappings::MappingTable, AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging()?;

    let config = Config::from_env()?;

    let mappings = MappingTable::load(&config.mappings_path)
        .with_context(|| format!("Failed to load {}", config.mappings_path.display()))?;

    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .context("Failed to build HTTP client")?;

    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState::new(config, mappings, http));

    let modes: Vec<String> = state
        .extractor
        .available_modes()
        .iter()
        .map(|m| m.to_string())
        .collect();
    tracing::info!("Extraction modes available: {}", modes.join(", "));

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    tracing::info!("listening on {}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
