use std::future::Future;
use std::time::Duration;

use crate::error::ScrapingError;
use crate::models::ExtractionResult;

/// Fetches resources over plain HTTP (no script execution).
pub trait Fetcher: Send + Sync + Clone {
    /// Fetch a page body as text.
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, ScrapingError>> + Send;

    /// Fetch raw bytes (images).
    fn fetch_bytes(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, ScrapingError>> + Send;
}

/// Starts renderer processes. The pool is the only caller.
pub trait RendererLauncher: Send + Sync + 'static {
    type Renderer: Renderer;

    fn launch(&self) -> impl Future<Output = Result<Self::Renderer, ScrapingError>> + Send;
}

/// One running headless-rendering engine instance.
pub trait Renderer: Send + Sync + 'static {
    type Page: RenderedPage;

    /// Open a fresh page, navigate to `url`, and wait until network and DOM
    /// have settled or `timeout` elapses.
    fn open(
        &self,
        url: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Self::Page, ScrapingError>> + Send;

    /// False once the underlying process has exited. The pool never hands
    /// out a renderer that reports itself dead.
    fn is_alive(&self) -> bool {
        true
    }

    /// Terminate the underlying process.
    fn shutdown(&self) -> impl Future<Output = ()> + Send;
}

/// A loaded page owned by exactly one extraction.
pub trait RenderedPage: Send + Sync {
    /// Serialized DOM after scripts ran.
    fn content(&self) -> impl Future<Output = Result<String, ScrapingError>> + Send;

    /// Full-page screenshot at the renderer's fixed viewport, taken once all
    /// in-page images have finished loading.
    fn screenshot(&self) -> impl Future<Output = Result<Vec<u8>, ScrapingError>> + Send;

    fn close(self) -> impl Future<Output = ()> + Send;
}

/// One extraction technique in the fallback chain.
pub trait ExtractionTier: Send + Sync {
    /// Strategy name recorded as `ExtractionResult::method`.
    fn name(&self) -> &str;

    fn extract(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<ExtractionResult, ScrapingError>> + Send;
}
