use std::sync::Arc;

use axum::Router;
use gleaner_core::error::ScrapingError;
use gleaner_core::models::ExtractionResult;
use gleaner_core::monitor::StrategyMonitor;
use gleaner_core::orchestrator::ExtractionOrchestrator;
use gleaner_core::pool::ResourcePool;
use gleaner_core::testutil::{MockLauncher, MockTier, PageBehavior};
use gleaner_server::routes;
use gleaner_server::state::AppState;

pub const TEST_API_KEY: &str = "test-secret-key";

pub struct TestApp {
    pub router: Router,
    pub primary: MockTier,
    pub article: MockTier,
}

fn ok(method: &str) -> ExtractionResult {
    ExtractionResult::new(
        "https://placeholder.test/",
        method,
        "Headline",
        "<p>body text</p>",
        "body text",
    )
}

/// Router whose primary tier fails with a timeout and whose article tier succeeds.
pub fn setup_test_app(api_key: Option<&str>) -> TestApp {
    let primary = MockTier::err("chromium-render", ScrapingError::NavigationTimeout(30));
    let article = MockTier::ok("readability", ok("readability"));
    let metadata = MockTier::ok("metadata-only", ok("metadata-only"));

    let orchestrator = ExtractionOrchestrator::new(
        primary.clone(),
        article.clone(),
        metadata,
        StrategyMonitor::new("chromium-render"),
    );
    let pool = Arc::new(ResourcePool::with_capacity(
        MockLauncher::new(PageBehavior::html("<html></html>")),
        3,
    ));
    let state = AppState::new(orchestrator)
        .with_pool(pool)
        .with_api_key(api_key.map(str::to_string))
        .with_max_batch(3);

    TestApp {
        router: routes::router(Arc::new(state)),
        primary,
        article,
    }
}
