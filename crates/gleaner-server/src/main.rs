use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use gleaner_client::{
    ArticleFallbackExtractor, ChromiumLauncher, MetadataOnlyFallback, PRIMARY_METHOD,
    PrimaryExtractor, ReqwestFetcher,
};
use gleaner_core::config::ExtractorConfig;
use gleaner_core::monitor::StrategyMonitor;
use gleaner_core::orchestrator::ExtractionOrchestrator;
use gleaner_core::pool::ResourcePool;
use gleaner_server::routes;
use gleaner_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("gleaner=info".parse()?))
        .with_target(false)
        .init();

    let api_key = std::env::var("GLEANER_SERVER_API_KEY").ok();
    let port = std::env::var("GLEANER_SERVER_PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{port}");

    let config = ExtractorConfig::from_env().context("Invalid GLEANER_* setting")?;
    let fetcher = ReqwestFetcher::new(&config).context("Failed to create HTTP client")?;
    let pool = Arc::new(
        ResourcePool::with_capacity(ChromiumLauncher::new(&config), config.pool_size)
            .with_poll_interval(config.poll_interval),
    );

    let orchestrator = ExtractionOrchestrator::new(
        PrimaryExtractor::new(pool.clone(), fetcher.clone(), &config),
        ArticleFallbackExtractor::new(fetcher.clone()),
        MetadataOnlyFallback::new(fetcher, &config),
        StrategyMonitor::new(PRIMARY_METHOD),
    );
    let state = Arc::new(
        AppState::new(orchestrator)
            .with_pool(pool.clone())
            .with_api_key(api_key),
    );

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!(pool_size = config.pool_size, "Starting server on {addr}");
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close_all().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
