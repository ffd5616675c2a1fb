use gleaner_core::config::ExtractorConfig;
use gleaner_core::error::ScrapingError;
use gleaner_core::models::ExtractionResult;
use gleaner_core::text::{domain_of, truncate_chars};
use gleaner_core::traits::{ExtractionTier, Fetcher};
use scraper::Html;
use url::Url;

use crate::dom::{self, PageMetadata};

/// Method name of the last-resort tier.
pub const METADATA_METHOD: &str = "metadata-only";

/// Last-resort tier: plain GET, declared metadata plus capped body text.
///
/// Never returns `Err`. A failed GET becomes an unsuccessful result so the
/// caller always has something to hand back.
#[derive(Clone)]
pub struct MetadataOnlyFallback<F: Fetcher> {
    fetcher: F,
    body_text_cap: usize,
}

impl<F: Fetcher> MetadataOnlyFallback<F> {
    pub fn new(fetcher: F, config: &ExtractorConfig) -> Self {
        Self {
            fetcher,
            body_text_cap: config.body_text_cap,
        }
    }
}

impl<F: Fetcher> ExtractionTier for MetadataOnlyFallback<F> {
    fn name(&self) -> &str {
        METADATA_METHOD
    }

    async fn extract(&self, url: &str) -> Result<ExtractionResult, ScrapingError> {
        let result = match self.fetcher.fetch(url).await {
            Ok(html) => parse_metadata(&html, url, self.body_text_cap),
            Err(e) => {
                tracing::debug!(%url, error = %e, "Metadata fetch failed");
                ExtractionResult::failure(url, METADATA_METHOD, &e)
            }
        };
        Ok(result)
    }
}

/// Build a result from head metadata and up to `cap` characters of body text.
pub fn parse_metadata(html: &str, url: &str, cap: usize) -> ExtractionResult {
    let doc = Html::parse_document(html);
    let meta = PageMetadata::from_document(&doc);
    let text = dom::main_content(&doc)
        .map(|(_, text)| text)
        .unwrap_or_else(|| dom::body_text(&doc));
    let text = truncate_chars(&text, cap).to_string();

    if meta.title.is_none() && meta.description.is_none() && text.is_empty() {
        return ExtractionResult::failure(
            url,
            METADATA_METHOD,
            &ScrapingError::ContentNotFound(format!("No metadata or text on {url}")),
        );
    }

    let lead_image_url = meta
        .image
        .as_deref()
        .and_then(|img| Url::parse(url).ok()?.join(img).ok())
        .map(|u| u.to_string());
    let title = meta.title.unwrap_or_else(|| domain_of(url));

    ExtractionResult::new(url, METADATA_METHOD, title, text.clone(), text)
        .with_description(meta.description.as_deref())
        .with_author(meta.author)
        .with_date_published(meta.date_published)
        .with_media(meta.media)
        .with_lead_image_url(lead_image_url)
}

#[cfg(test)]
mod tests {
    use gleaner_core::models::{MediaMetadata, MediaType};
    use gleaner_core::testutil::MockFetcher;

    use super::*;

    const URL: &str = "https://video.example.net/watch/42";

    fn tier(fetcher: MockFetcher) -> MetadataOnlyFallback<MockFetcher> {
        MetadataOnlyFallback::new(fetcher, &ExtractorConfig::default())
    }

    #[tokio::test]
    async fn reads_declared_metadata() {
        let html = r#"<html><head>
            <meta property="og:title" content="Launch Recap">
            <meta property="og:description" content="Highlights from the launch.">
            <meta property="og:type" content="video.other">
            <meta property="og:video" content="https://video.example.net/v/42.mp4">
            <meta property="og:image" content="//cdn.example.net/42.jpg">
        </head><body><p>Short caption.</p></body></html>"#;

        let result = tier(MockFetcher::new(html)).extract(URL).await.unwrap();

        assert!(result.success);
        assert_eq!(result.method, METADATA_METHOD);
        assert_eq!(result.title, "Launch Recap");
        assert_eq!(result.excerpt, "Highlights from the launch.");
        assert_eq!(result.media_type, MediaType::Video);
        assert!(matches!(result.media, MediaMetadata::Video(_)));
        assert_eq!(
            result.lead_image_url.as_deref(),
            Some("https://cdn.example.net/42.jpg")
        );
        assert_eq!(result.text_content, "Short caption.");
    }

    #[tokio::test]
    async fn body_text_is_capped() {
        let html = format!("<html><body><div>{}</div></body></html>", "word ".repeat(5000));
        let config = ExtractorConfig {
            body_text_cap: 100,
            ..Default::default()
        };
        let result = MetadataOnlyFallback::new(MockFetcher::new(&html), &config)
            .extract(URL)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.text_content.chars().count(), 100);
        assert_eq!(result.title, "video.example.net");
    }

    #[tokio::test]
    async fn fetch_failure_is_an_unsuccessful_result() {
        let fetcher = MockFetcher::with_error(ScrapingError::HttpError(format!(
            "HTTP 503 for {URL}"
        )));
        let result = tier(fetcher).extract(URL).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.title, "video.example.net");
        assert!(result.error.unwrap().contains("503"));
    }

    #[tokio::test]
    async fn empty_page_is_an_unsuccessful_result() {
        let result = tier(MockFetcher::new("<html><body></body></html>"))
            .extract(URL)
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.error.is_some());
    }
}
