use dom_smoothie::{Config, Readability};
use gleaner_core::error::ScrapingError;
use gleaner_core::models::ExtractionResult;
use gleaner_core::text::{domain_of, normalize_whitespace};
use gleaner_core::traits::{ExtractionTier, Fetcher};
use scraper::Html;
use url::Url;

use crate::dom::{MIN_CONTENT_CHARS, PageMetadata};

/// Method name of the readability tier.
pub const ARTICLE_METHOD: &str = "readability";

/// Non-browser tier: plain GET followed by a Readability-style article parse.
#[derive(Clone)]
pub struct ArticleFallbackExtractor<F: Fetcher> {
    fetcher: F,
}

impl<F: Fetcher> ArticleFallbackExtractor<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }
}

impl<F: Fetcher> ExtractionTier for ArticleFallbackExtractor<F> {
    fn name(&self) -> &str {
        ARTICLE_METHOD
    }

    async fn extract(&self, url: &str) -> Result<ExtractionResult, ScrapingError> {
        let html = self.fetcher.fetch(url).await?;
        parse_article(&html, url)
    }
}

/// Run Readability over `html`. Pages yielding less than a paragraph of
/// text are reported as [`ScrapingError::ContentNotFound`].
pub fn parse_article(html: &str, url: &str) -> Result<ExtractionResult, ScrapingError> {
    let cfg = Config {
        max_elements_to_parse: 9000,
        ..Default::default()
    };
    let mut readability = Readability::new(html, Some(url), Some(cfg))
        .map_err(|e| ScrapingError::ContentNotFound(format!("Readability setup failed: {e}")))?;
    let article = readability
        .parse()
        .map_err(|e| ScrapingError::ContentNotFound(format!("No article found: {e}")))?;

    let text = normalize_whitespace(&article.text_content);
    if text.chars().count() < MIN_CONTENT_CHARS {
        return Err(ScrapingError::ContentNotFound(format!(
            "Article text too short ({} chars)",
            text.chars().count()
        )));
    }

    // Readability does not look at declared images or media tags.
    let meta = PageMetadata::from_document(&Html::parse_document(html));
    let lead_image_url = meta
        .image
        .as_deref()
        .and_then(|img| Url::parse(url).ok()?.join(img).ok())
        .map(|u| u.to_string());

    let title = Some(article.title.trim().to_string())
        .filter(|t| !t.is_empty())
        .or(meta.title)
        .unwrap_or_else(|| domain_of(url));

    Ok(
        ExtractionResult::new(url, ARTICLE_METHOD, title, article.content.to_string(), text)
            .with_description(article.excerpt.as_deref().or(meta.description.as_deref()))
            .with_author(article.byline.or(meta.author))
            .with_date_published(article.published_time.or(meta.date_published))
            .with_media(meta.media)
            .with_lead_image_url(lead_image_url),
    )
}

#[cfg(test)]
mod tests {
    use gleaner_core::testutil::MockFetcher;

    use super::*;

    const URL: &str = "https://blog.example.org/posts/rust";

    fn blog_post() -> String {
        let paragraphs: String = (0..8)
            .map(|i| {
                format!(
                    "<p>Paragraph {i} explains ownership, borrowing and lifetimes in enough \
                     detail that a reader can follow along, with examples and commentary.</p>"
                )
            })
            .collect();
        format!(
            r#"<html><head><title>Learning Rust - Blog</title>
                <meta property="og:image" content="/images/cover.jpg">
                <meta name="author" content="Casey">
            </head><body>
                <header><nav><a href="/">Home</a><a href="/about">About</a></nav></header>
                <article><h1>Learning Rust</h1>{paragraphs}</article>
                <footer>Copyright</footer>
            </body></html>"#
        )
    }

    #[tokio::test]
    async fn extracts_article_text() {
        let tier = ArticleFallbackExtractor::new(MockFetcher::new(&blog_post()));
        let result = tier.extract(URL).await.unwrap();

        assert!(result.success);
        assert_eq!(result.method, ARTICLE_METHOD);
        assert!(result.title.contains("Learning Rust"));
        assert!(result.text_content.contains("ownership, borrowing"));
        assert!(!result.text_content.contains("Copyright"));
        assert_eq!(
            result.word_count,
            result.text_content.split_whitespace().count()
        );
        assert_eq!(
            result.lead_image_url.as_deref(),
            Some("https://blog.example.org/images/cover.jpg")
        );
        assert!(result.excerpt.chars().count() <= 300);
    }

    #[tokio::test]
    async fn metadata_only_page_is_not_an_article() {
        let html = r#"<html><head><title>Shop</title>
            <meta property="og:description" content="Buy things"></head><body></body></html>"#;
        let tier = ArticleFallbackExtractor::new(MockFetcher::new(html));
        let err = tier.extract(URL).await.unwrap_err();
        assert!(matches!(err, ScrapingError::ContentNotFound(_)));
    }

    #[tokio::test]
    async fn fetch_errors_propagate() {
        let tier = ArticleFallbackExtractor::new(MockFetcher::with_error(
            ScrapingError::NetworkFailure("Connection failed".into()),
        ));
        let err = tier.extract(URL).await.unwrap_err();
        assert_eq!(err.code(), "NETWORK_FAILURE");
    }
}
