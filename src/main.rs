use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tubely_backend::{
    app, cleanup, config::Config, database::InMemoryVideoRepository, ffmpeg::Ffmpeg,
    models::AppState, storage::S3ObjectStore, system_info,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tubely_backend=debug,tower_http=debug")),
        )
        .init();

    let config = Config::load()?;

    // Ensure the staging directory exists
    tokio::fs::create_dir_all(&config.staging_dir).await?;

    system_info::log_startup_info(&config).await;

    let store = S3ObjectStore::connect(&config).await;
    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::new(InMemoryVideoRepository::new()),
        Arc::new(Ffmpeg::new(&config.tools)),
        Arc::new(store),
    ));

    cleanup::start_cleanup_task(&config);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("✅ Server listening on {}", addr);

    axum::serve(listener, app(state)).await?;

    Ok(())
}
