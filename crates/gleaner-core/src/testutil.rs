//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests. Shared state
//! lives behind `Arc` so clones handed to the code under test report back
//! to the copy the test keeps.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::ScrapingError;
use crate::models::ExtractionResult;
use crate::traits::{ExtractionTier, Fetcher, RenderedPage, Renderer, RendererLauncher};

// ---------------------------------------------------------------------------
// MockLauncher / MockRenderer / MockPage
// ---------------------------------------------------------------------------

/// What pages opened by a mock renderer do.
#[derive(Clone)]
pub struct PageBehavior {
    open: Result<String, ScrapingError>,
    screenshot: Result<Vec<u8>, ScrapingError>,
    open_delay: Duration,
}

impl PageBehavior {
    /// Pages load and serialize to `html`. Screenshots fail.
    pub fn html(html: &str) -> Self {
        Self {
            open: Ok(html.to_string()),
            screenshot: Err(ScrapingError::ImageProcessing(
                "no screenshot configured".into(),
            )),
            open_delay: Duration::ZERO,
        }
    }

    /// Navigation fails with `error`.
    pub fn open_error(error: ScrapingError) -> Self {
        Self {
            open: Err(error),
            ..Self::html("")
        }
    }

    pub fn with_screenshot(mut self, bytes: Vec<u8>) -> Self {
        self.screenshot = Ok(bytes);
        self
    }

    /// Navigation takes `delay`; exceeding the caller's timeout yields
    /// [`ScrapingError::NavigationTimeout`].
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }
}

/// Counters shared by a launcher and every renderer and page it creates.
#[derive(Clone, Default)]
pub struct MockCounters {
    pub launched: Arc<AtomicUsize>,
    pub live: Arc<AtomicUsize>,
    pub peak_live: Arc<AtomicUsize>,
    pub pages_opened: Arc<AtomicUsize>,
    pub pages_closed: Arc<AtomicUsize>,
}

#[derive(Clone)]
pub struct MockLauncher {
    behavior: PageBehavior,
    launch_delay: Duration,
    failures: Arc<Mutex<Vec<ScrapingError>>>,
    crashing: Arc<AtomicUsize>,
    pub counters: MockCounters,
}

impl MockLauncher {
    pub fn new(behavior: PageBehavior) -> Self {
        Self {
            behavior,
            launch_delay: Duration::ZERO,
            failures: Arc::new(Mutex::new(Vec::new())),
            crashing: Arc::new(AtomicUsize::new(0)),
            counters: MockCounters::default(),
        }
    }

    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = delay;
        self
    }

    /// The next `n` launches fail with `error`.
    pub fn fail_launches(self, n: usize, error: ScrapingError) -> Self {
        self.failures
            .lock()
            .unwrap()
            .extend(std::iter::repeat_n(error, n));
        self
    }

    /// The next `n` launched renderers are broken: every `open` fails with
    /// [`ScrapingError::RendererCrashed`] and they report themselves dead
    /// afterwards.
    pub fn crash_renderers(self, n: usize) -> Self {
        self.crashing.store(n, Ordering::SeqCst);
        self
    }
}

impl RendererLauncher for MockLauncher {
    type Renderer = MockRenderer;

    async fn launch(&self) -> Result<MockRenderer, ScrapingError> {
        if !self.launch_delay.is_zero() {
            tokio::time::sleep(self.launch_delay).await;
        }
        {
            let mut failures = self.failures.lock().unwrap();
            if !failures.is_empty() {
                return Err(failures.remove(0));
            }
        }

        self.counters.launched.fetch_add(1, Ordering::SeqCst);
        let live = self.counters.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak_live.fetch_max(live, Ordering::SeqCst);

        let broken = self
            .crashing
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        Ok(MockRenderer {
            behavior: self.behavior.clone(),
            counters: self.counters.clone(),
            broken,
            crashed: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        })
    }
}

pub struct MockRenderer {
    behavior: PageBehavior,
    counters: MockCounters,
    broken: bool,
    crashed: AtomicBool,
    shut_down: AtomicBool,
}

impl Renderer for MockRenderer {
    type Page = MockPage;

    async fn open(&self, _url: &str, timeout: Duration) -> Result<MockPage, ScrapingError> {
        if self.broken {
            self.crashed.store(true, Ordering::SeqCst);
            return Err(ScrapingError::RendererCrashed("browser crashed".into()));
        }
        if !self.behavior.open_delay.is_zero() {
            tokio::time::sleep(self.behavior.open_delay.min(timeout)).await;
            if self.behavior.open_delay > timeout {
                return Err(ScrapingError::NavigationTimeout(timeout.as_secs()));
            }
        }
        let html = self.behavior.open.clone()?;
        self.counters.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(MockPage {
            html,
            screenshot: self.behavior.screenshot.clone(),
            closed: Arc::clone(&self.counters.pages_closed),
        })
    }

    fn is_alive(&self) -> bool {
        !self.crashed.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        if !self.shut_down.swap(true, Ordering::SeqCst) {
            self.counters.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

pub struct MockPage {
    html: String,
    screenshot: Result<Vec<u8>, ScrapingError>,
    closed: Arc<AtomicUsize>,
}

impl RenderedPage for MockPage {
    async fn content(&self) -> Result<String, ScrapingError> {
        Ok(self.html.clone())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, ScrapingError> {
        self.screenshot.clone()
    }

    async fn close(self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher with a page response queue and per-URL byte responses.
#[derive(Clone)]
pub struct MockFetcher {
    /// Each `fetch` pops the first element; an empty queue yields default HTML.
    responses: Arc<Mutex<Vec<Result<String, ScrapingError>>>>,
    bytes: Arc<Mutex<HashMap<String, Result<Vec<u8>, ScrapingError>>>>,
    pub requested: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new(html: &str) -> Self {
        Self::with_responses(vec![Ok(html.to_string())])
    }

    pub fn with_error(error: ScrapingError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    pub fn with_responses(responses: Vec<Result<String, ScrapingError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            bytes: Arc::new(Mutex::new(HashMap::new())),
            requested: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Serve `bytes` for `fetch_bytes(url)`.
    pub fn with_bytes(self, url: &str, bytes: Vec<u8>) -> Self {
        self.bytes.lock().unwrap().insert(url.to_string(), Ok(bytes));
        self
    }

    pub fn requested_urls(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, ScrapingError> {
        self.requested.lock().unwrap().push(url.to_string());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok("<html><body>default</body></html>".to_string())
        } else {
            responses.remove(0)
        }
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, ScrapingError> {
        self.requested.lock().unwrap().push(url.to_string());
        self.bytes
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err(ScrapingError::ImageFetch(format!("HTTP 404 for {url}"))))
    }
}

// ---------------------------------------------------------------------------
// MockTier
// ---------------------------------------------------------------------------

/// Mock extraction tier that always answers with the same outcome.
#[derive(Clone)]
pub struct MockTier {
    name: String,
    outcome: Result<ExtractionResult, ScrapingError>,
    calls: Arc<AtomicUsize>,
}

impl MockTier {
    pub fn ok(name: &str, result: ExtractionResult) -> Self {
        Self {
            name: name.to_string(),
            outcome: Ok(result),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn err(name: &str, error: ScrapingError) -> Self {
        Self {
            name: name.to_string(),
            outcome: Err(error),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ExtractionTier for MockTier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(&self, url: &str) -> Result<ExtractionResult, ScrapingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone().map(|mut result| {
            result.url = url.to_string();
            result.domain = crate::text::domain_of(url);
            result
        })
    }
}
