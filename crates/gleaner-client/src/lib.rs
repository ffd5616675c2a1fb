pub mod article;
#[cfg(feature = "browser")]
pub mod browser;
pub mod dom;
pub mod enhance;
pub mod http;
pub mod image_select;
pub mod metadata;
pub mod primary;

pub use article::{ARTICLE_METHOD, ArticleFallbackExtractor};
#[cfg(feature = "browser")]
pub use browser::{ChromiumLauncher, ChromiumPage, ChromiumRenderer};
pub use dom::PageMetadata;
pub use enhance::{ImageEnhancer, OutputFormat};
pub use http::ReqwestFetcher;
pub use image_select::ImageSelector;
pub use metadata::{METADATA_METHOD, MetadataOnlyFallback};
pub use primary::{PRIMARY_METHOD, PrimaryExtractor};
