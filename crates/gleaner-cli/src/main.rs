use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gleaner_client::{
    ArticleFallbackExtractor, ChromiumLauncher, ImageEnhancer, MetadataOnlyFallback,
    OutputFormat, PRIMARY_METHOD, PrimaryExtractor, ReqwestFetcher,
};
use gleaner_core::config::ExtractorConfig;
use gleaner_core::models::QualityTier;
use gleaner_core::monitor::StrategyMonitor;
use gleaner_core::orchestrator::ExtractionOrchestrator;
use gleaner_core::pool::ResourcePool;

#[derive(Parser)]
#[command(name = "gleaner", version, about = "Article, metadata and lead-image extraction")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract content from one or more web pages and print JSON
    Extract {
        /// Target URLs, extracted concurrently
        #[arg(required = true)]
        urls: Vec<String>,

        /// Maximum concurrent headless browsers
        #[arg(short, long, env = "GLEANER_POOL_SIZE")]
        pool_size: Option<usize>,

        /// Lead image quality tier (thumbnail, standard, high, ultra)
        #[arg(short, long, env = "GLEANER_QUALITY_TIER")]
        quality: Option<QualityTier>,

        /// Per-request timeout in seconds
        #[arg(short, long, env = "GLEANER_REQUEST_TIMEOUT_SECS")]
        timeout: Option<u64>,

        /// Lead image output format (jpeg, png, webp)
        #[arg(long, env = "GLEANER_IMAGE_FORMAT", default_value = "jpeg")]
        image_format: OutputFormat,

        /// Include the strategy metrics in the output
        #[arg(long, default_value_t = false)]
        metrics: bool,

        /// Allow requests to private and loopback addresses
        #[arg(long, env = "GLEANER_ALLOW_PRIVATE", default_value_t = false)]
        allow_private: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("gleaner=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Extract {
            urls,
            pool_size,
            quality,
            timeout,
            image_format,
            metrics,
            allow_private,
        } => {
            let mut config = ExtractorConfig::from_env().context("Invalid GLEANER_* setting")?;
            if let Some(size) = pool_size {
                config = config.with_pool_size(size);
            }
            if let Some(tier) = quality {
                config = config.with_quality_tier(tier);
            }
            if let Some(secs) = timeout {
                config = config.with_request_timeout(Duration::from_secs(secs.max(1)));
            }
            cmd_extract(&urls, &config, image_format, metrics, allow_private).await?;
        }
    }

    Ok(())
}

async fn cmd_extract(
    urls: &[String],
    config: &ExtractorConfig,
    image_format: OutputFormat,
    show_metrics: bool,
    allow_private: bool,
) -> Result<()> {
    let mut fetcher = ReqwestFetcher::new(config).context("Failed to create HTTP client")?;
    if allow_private {
        fetcher = fetcher.allow_private_urls();
    }

    let pool = Arc::new(
        ResourcePool::with_capacity(ChromiumLauncher::new(config), config.pool_size)
            .with_poll_interval(config.poll_interval),
    );
    let primary = PrimaryExtractor::new(pool.clone(), fetcher.clone(), config)
        .with_enhancer(ImageEnhancer::new(fetcher.clone()).with_format(image_format));
    let orchestrator = ExtractionOrchestrator::new(
        primary,
        ArticleFallbackExtractor::new(fetcher.clone()),
        MetadataOnlyFallback::new(fetcher, config),
        StrategyMonitor::new(PRIMARY_METHOD),
    );

    tracing::info!(
        urls = urls.len(),
        pool_size = config.pool_size,
        quality = %config.quality_tier,
        "Starting extraction"
    );

    let results =
        futures::future::join_all(urls.iter().map(|url| orchestrator.extract(url))).await;
    pool.close_all().await;

    for result in &results {
        if result.success {
            tracing::info!(
                url = %result.url,
                method = %result.method,
                words = result.word_count,
                "Extracted"
            );
        } else {
            tracing::warn!(url = %result.url, error = ?result.error, "Extraction failed");
        }
    }

    let output = match (show_metrics, results.as_slice()) {
        (true, _) => serde_json::json!({
            "results": results,
            "metrics": orchestrator.monitor().metrics(),
        }),
        (false, [single]) => serde_json::to_value(single)?,
        (false, _) => serde_json::to_value(&results)?,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
