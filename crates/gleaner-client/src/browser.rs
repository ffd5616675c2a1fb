use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use gleaner_core::config::ExtractorConfig;
use gleaner_core::error::ScrapingError;
use gleaner_core::traits::{RenderedPage, Renderer, RendererLauncher};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Fixed viewport used for rendering and screenshots.
pub const VIEWPORT: (u32, u32) = (1920, 1080);

/// Resolves once every `<img>` on the page has loaded or failed.
const IMAGES_SETTLED_JS: &str = r#"
Promise.all(Array.from(document.images)
  .filter(img => !img.complete)
  .map(img => new Promise(resolve => { img.onload = img.onerror = resolve; })))
  .then(() => true)
"#;

/// Install locations probed after `CHROME_BIN`. The snap's inner binary is
/// listed because the `/snap/bin` wrapper drops unknown flags.
const CHROME_PATHS: [&str; 6] = [
    "/snap/chromium/current/usr/lib/chromium-browser/chrome",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/google-chrome",
    "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
];

/// Headless flags. `AutomationControlled` off hides `navigator.webdriver`.
const CHROME_FLAGS: [&str; 13] = [
    "--headless=new",
    "--disable-blink-features=AutomationControlled",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-extensions",
    "--disable-notifications",
    "--disable-popup-blocking",
    "--disable-features=TranslateUI",
    "--no-first-run",
    "--no-default-browser-check",
    "--hide-scrollbars",
    "--mute-audio",
];

/// Launches headless Chromium processes via the Chrome DevTools Protocol.
///
/// Each launch starts a separate process; the renderer pool decides how
/// many exist at once.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    user_agent: String,
    settle_delay: Duration,
}

impl ChromiumLauncher {
    pub fn new(config: &ExtractorConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            settle_delay: config.settle_delay,
        }
    }

    /// Chromium binary to run: `CHROME_BIN` if it exists, else the first
    /// known install path present. `None` defers to chromiumoxide's lookup.
    fn chrome_binary() -> Option<PathBuf> {
        std::env::var_os("CHROME_BIN")
            .map(PathBuf::from)
            .into_iter()
            .chain(CHROME_PATHS.iter().map(PathBuf::from))
            .find(|path| path.exists())
    }

    fn browser_config(&self) -> Result<BrowserConfig, ScrapingError> {
        let mut builder = CHROME_FLAGS.iter().fold(
            BrowserConfig::builder()
                .no_sandbox()
                .disable_default_args()
                .window_size(VIEWPORT.0, VIEWPORT.1)
                .viewport(None)
                .arg(format!("--user-agent={}", self.user_agent)),
            |builder, flag| builder.arg(*flag),
        );

        if let Some(bin) = Self::chrome_binary() {
            tracing::info!(binary = %bin.display(), "Launching Chromium");
            builder = builder.chrome_executable(bin);
        }

        builder
            .build()
            .map_err(|e| ScrapingError::RendererLaunch(format!("Invalid Chromium config: {e}")))
    }
}

impl RendererLauncher for ChromiumLauncher {
    type Renderer = ChromiumRenderer;

    async fn launch(&self) -> Result<ChromiumRenderer, ScrapingError> {
        let config = self.browser_config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ScrapingError::RendererLaunch(format!("Chromium did not start: {e}")))?;

        // CDP messages only flow while the handler stream is driven.
        let handler = tokio::spawn(async move {
            while let Some(Ok(())) = handler.next().await {}
            tracing::debug!("Chromium event stream ended");
        });

        Ok(ChromiumRenderer {
            browser: Mutex::new(browser),
            handler,
            settle_delay: self.settle_delay,
        })
    }
}

/// One running Chromium process. Each [`Renderer::open`] gets its own tab.
pub struct ChromiumRenderer {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
    settle_delay: Duration,
}

impl ChromiumRenderer {
    async fn load(&self, page: &Page, url: &str) -> Result<(), ScrapingError> {
        page.goto(url)
            .await
            .map_err(|e| ScrapingError::Navigation(format!("Failed to navigate to {url}: {e}")))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| ScrapingError::Navigation(format!("Navigation did not settle: {e}")))?;

        // Minimal signal that the page rendered something.
        page.find_element("body")
            .await
            .map_err(|e| ScrapingError::Navigation(format!("Page did not render body: {e}")))?;

        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
        if let Err(e) = page.evaluate(IMAGES_SETTLED_JS).await {
            tracing::debug!(%url, error = %e, "Image settle script failed");
        }
        Ok(())
    }
}

impl Renderer for ChromiumRenderer {
    type Page = ChromiumPage;

    async fn open(&self, url: &str, timeout: Duration) -> Result<ChromiumPage, ScrapingError> {
        let page = {
            let browser = self.browser.lock().await;
            // A blank tab that does not open in time means the browser hung.
            tokio::time::timeout(timeout, browser.new_page("about:blank"))
                .await
                .map_err(|_| {
                    ScrapingError::RendererCrashed(format!(
                        "No tab opened within {}s",
                        timeout.as_secs()
                    ))
                })?
                .map_err(|e| ScrapingError::RendererCrashed(format!("Failed to open tab: {e}")))?
        };

        match tokio::time::timeout(timeout, self.load(&page, url)).await {
            Ok(Ok(())) => Ok(ChromiumPage { page }),
            Ok(Err(e)) => {
                let _ = page.close().await;
                Err(e)
            }
            Err(_) => {
                let _ = page.close().await;
                Err(ScrapingError::NavigationTimeout(timeout.as_secs()))
            }
        }
    }

    fn is_alive(&self) -> bool {
        !self.handler.is_finished()
    }

    async fn shutdown(&self) {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            tracing::warn!(error = %e, "Browser close failed");
        }
        let _ = browser.wait().await;
        self.handler.abort();
    }
}

pub struct ChromiumPage {
    page: Page,
}

impl RenderedPage for ChromiumPage {
    async fn content(&self) -> Result<String, ScrapingError> {
        self.page
            .content()
            .await
            .map_err(|e| ScrapingError::Navigation(format!("Failed to read page content: {e}")))
    }

    async fn screenshot(&self) -> Result<Vec<u8>, ScrapingError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        self.page
            .screenshot(params)
            .await
            .map_err(|e| ScrapingError::ImageProcessing(format!("Page screenshot failed: {e}")))
    }

    async fn close(self) {
        if let Err(e) = self.page.close().await {
            tracing::debug!(error = %e, "Tab close failed");
        }
    }
}
