use tracing_subscriber::EnvFilter;

use vibe_search::api;
use vibe_search::config::Config;
use vibe_search::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!(
        "Embedding provider: {} ({}, dim {})",
        config.embedding.provider,
        config.embedding.model,
        config.embedding.dimension
    );

    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(config)?;
    if state.engine.is_faulted() {
        tracing::error!("Starting with a faulted index: writes are disabled until reset or reload");
    }

    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {bind_addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
