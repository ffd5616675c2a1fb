/// Smoke-test for `ChromiumLauncher`.
///
/// Launches one headless Chromium, renders <https://example.com> and checks
/// the rendered HTML contains the expected `<h1>`.
///
/// Run with:
///   cargo run -p gleaner-client --example browser_smoke --features browser
use std::time::Duration;

use gleaner_client::ChromiumLauncher;
use gleaner_core::config::ExtractorConfig;
use gleaner_core::traits::{RenderedPage, Renderer, RendererLauncher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let launcher = ChromiumLauncher::new(&ExtractorConfig::default());
    println!("Launching headless browser...");
    let renderer = launcher.launch().await?;

    let url = "https://example.com";
    println!("Rendering {url} ...");
    let page = renderer.open(url, Duration::from_secs(30)).await?;
    let html = page.content().await?;
    page.close().await;
    renderer.shutdown().await;

    assert!(
        html.contains("<h1>Example Domain</h1>"),
        "Expected <h1> not found in rendered HTML"
    );
    assert!(
        html.len() > 500,
        "HTML suspiciously short ({} bytes)",
        html.len()
    );

    println!("OK, got {} bytes of rendered HTML", html.len());
    println!("First 300 chars:\n{}", &html[..html.len().min(300)]);
    Ok(())
}
