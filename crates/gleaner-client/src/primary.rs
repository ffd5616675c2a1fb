use std::sync::Arc;
use std::time::Duration;

use gleaner_core::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use gleaner_core::config::ExtractorConfig;
use gleaner_core::error::ScrapingError;
use gleaner_core::models::{EnhancedImageResult, ExtractionResult, ImageCandidate, QualityTier};
use gleaner_core::pool::ResourcePool;
use gleaner_core::text::domain_of;
use gleaner_core::traits::{ExtractionTier, Fetcher, RenderedPage, Renderer, RendererLauncher};
use scraper::Html;
use url::Url;

use crate::dom::{self, PageMetadata};
use crate::enhance::ImageEnhancer;
use crate::image_select::ImageSelector;

/// Method name of the rendering tier.
pub const PRIMARY_METHOD: &str = "chromium-render";

/// High-fidelity tier: renders the page in a pooled headless browser.
///
/// The renderer is leased for the duration of one extraction and returned
/// to the pool on every exit path. Repeated renderer failures open a
/// circuit breaker so later requests fall through without paying the
/// navigation timeout.
pub struct PrimaryExtractor<L: RendererLauncher, F: Fetcher> {
    pool: Arc<ResourcePool<L>>,
    enhancer: ImageEnhancer<F>,
    selector: ImageSelector,
    breaker: CircuitBreaker,
    timeout: Duration,
    quality: QualityTier,
}

/// Everything read from the rendered DOM. Built synchronously so the parsed
/// document never lives across an await point.
struct RenderedArticle {
    meta: PageMetadata,
    content: String,
    text: String,
    lead_candidate: Option<ImageCandidate>,
}

impl<L: RendererLauncher, F: Fetcher> PrimaryExtractor<L, F> {
    pub fn new(pool: Arc<ResourcePool<L>>, image_fetcher: F, config: &ExtractorConfig) -> Self {
        Self {
            pool,
            enhancer: ImageEnhancer::new(image_fetcher),
            selector: ImageSelector::new(),
            breaker: CircuitBreaker::new(PRIMARY_METHOD, CircuitBreakerConfig::default()),
            timeout: config.request_timeout,
            quality: config.quality_tier,
        }
    }

    pub fn with_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker = CircuitBreaker::new(PRIMARY_METHOD, config);
        self
    }

    pub fn with_enhancer(mut self, enhancer: ImageEnhancer<F>) -> Self {
        self.enhancer = enhancer;
        self
    }

    pub fn pool(&self) -> &Arc<ResourcePool<L>> {
        &self.pool
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    async fn render(&self, url: &str) -> Result<ExtractionResult, ScrapingError> {
        let base = Url::parse(url).map_err(|e| ScrapingError::InvalidUrl(format!("{url}: {e}")))?;

        let renderer = self.pool.acquire().await?;
        tracing::debug!(%url, renderer_id = %renderer.id(), "Rendering page");

        let page = match renderer.open(url, self.timeout).await {
            Ok(page) => page,
            Err(e) if e.renderer_is_broken() => {
                self.pool.evict(renderer).await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        let outcome = self.read_page(&page, url, &base).await;
        page.close().await;
        self.pool.release(renderer);

        outcome
    }

    async fn read_page(
        &self,
        page: &<L::Renderer as Renderer>::Page,
        url: &str,
        base: &Url,
    ) -> Result<ExtractionResult, ScrapingError> {
        let html = page.content().await?;
        let article = self.parse(&html, base)?;

        let lead_image = match &article.lead_candidate {
            Some(candidate) => Some(self.enhancer.enhance(candidate, self.quality).await),
            None => self.screenshot_image(page, url).await,
        };

        let title = article.meta.title.clone().unwrap_or_else(|| domain_of(url));
        Ok(
            ExtractionResult::new(url, PRIMARY_METHOD, title, article.content, article.text)
                .with_description(article.meta.description.as_deref())
                .with_author(article.meta.author)
                .with_date_published(article.meta.date_published)
                .with_media(article.meta.media)
                .with_lead_image(lead_image),
        )
    }

    fn parse(&self, html: &str, base: &Url) -> Result<RenderedArticle, ScrapingError> {
        let doc = Html::parse_document(html);
        let (content, text) = dom::main_content(&doc).ok_or_else(|| {
            ScrapingError::ContentNotFound(format!("No readable text on {base}"))
        })?;
        let candidates = self.selector.collect_candidates(&doc, base);
        Ok(RenderedArticle {
            meta: PageMetadata::from_document(&doc),
            content,
            text,
            lead_candidate: self.selector.select_best(candidates),
        })
    }

    /// Screenshot fallback when the page offers no image candidate.
    async fn screenshot_image(
        &self,
        page: &<L::Renderer as Renderer>::Page,
        url: &str,
    ) -> Option<EnhancedImageResult> {
        let shot = match page.screenshot().await {
            Ok(png) => self.enhancer.enhance_screenshot(png, url, self.quality).await,
            Err(e) => Err(e),
        };
        match shot {
            Ok(image) => Some(image),
            Err(e) => {
                tracing::debug!(%url, error = %e, "No lead image available");
                None
            }
        }
    }
}

impl<L: RendererLauncher, F: Fetcher> ExtractionTier for PrimaryExtractor<L, F> {
    fn name(&self) -> &str {
        PRIMARY_METHOD
    }

    async fn extract(&self, url: &str) -> Result<ExtractionResult, ScrapingError> {
        self.breaker.call(|| self.render(url)).await
    }
}
