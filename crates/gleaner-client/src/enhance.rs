//! Lead-image fetching and re-encoding.
//!
//! The winning candidate is fetched (asking known CDNs for a suitably sized
//! variant), decoded to learn its true dimensions, cover-cropped to the
//! quality tier's target and re-encoded inline as a base64 data URI.
//! Failures never escape [`ImageEnhancer::enhance`]; they degrade to the
//! original URL instead.

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use gleaner_core::error::ScrapingError;
use gleaner_core::models::{EnhancedImageResult, ImageCandidate, QualityTier, TierTarget};
use gleaner_core::traits::Fetcher;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageReader};
use url::Url;

/// Social-card aspect ratio used to crop screenshots (1200x630).
const CARD_RATIO: (u32, u32) = (1200, 630);

/// Encoded output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Quality-controlled baseline JPEG.
    #[default]
    Jpeg,
    Png,
    /// Lossless WebP.
    WebP,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::WebP => "image/webp",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "webp" => Ok(OutputFormat::WebP),
            _ => Err(format!("Unknown output format: {s}")),
        }
    }
}

#[derive(Clone)]
pub struct ImageEnhancer<F: Fetcher> {
    fetcher: F,
    format: OutputFormat,
}

impl<F: Fetcher> ImageEnhancer<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            format: OutputFormat::default(),
        }
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Fetch and re-encode `candidate` for `tier`.
    ///
    /// Never fails: on any fetch/decode/encode error the result keeps the
    /// original URL and candidate dimensions with `quality = 0`.
    pub async fn enhance(&self, candidate: &ImageCandidate, tier: QualityTier) -> EnhancedImageResult {
        self.enhance_all(candidate, tier, &[self.format])
            .await
            .into_iter()
            .next()
            .unwrap_or_else(|| EnhancedImageResult::degraded(candidate))
    }

    /// Like [`enhance`](Self::enhance), emitting one result per format.
    /// The source is fetched and decoded once.
    pub async fn enhance_all(
        &self,
        candidate: &ImageCandidate,
        tier: QualityTier,
        formats: &[OutputFormat],
    ) -> Vec<EnhancedImageResult> {
        let target = tier.target();
        let degraded_all = || -> Vec<EnhancedImageResult> {
            formats
                .iter()
                .map(|_| EnhancedImageResult::degraded(candidate))
                .collect()
        };

        let bytes = match self.fetch_source(candidate, target).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(url = %candidate.url, error = %e, "Image enhancement degraded");
                return degraded_all();
            }
        };

        let jobs = formats.to_vec();
        let original_url = candidate.url.clone();
        let rendered = off_runtime(move || {
            let source = decode(&bytes)?;
            Ok(jobs
                .into_iter()
                .map(|format| (format, render(&source, target, format, &original_url)))
                .collect::<Vec<_>>())
        })
        .await;

        match rendered {
            Ok(outputs) => outputs
                .into_iter()
                .map(|(format, output)| {
                    output.unwrap_or_else(|e| {
                        tracing::warn!(url = %candidate.url, %format, error = %e, "Image encode failed");
                        EnhancedImageResult::degraded(candidate)
                    })
                })
                .collect(),
            Err(e) => {
                tracing::warn!(url = %candidate.url, error = %e, "Image enhancement degraded");
                degraded_all()
            }
        }
    }

    async fn fetch_source(
        &self,
        candidate: &ImageCandidate,
        target: TierTarget,
    ) -> Result<Vec<u8>, ScrapingError> {
        let url = resolve_cdn_url(&candidate.url, target);
        if url != candidate.url {
            tracing::debug!(original = %candidate.url, resolved = %url, "Requesting CDN variant");
        }
        self.fetcher.fetch_bytes(&url).await
    }

    /// Crop a full-page screenshot to the social-card ratio from the top and
    /// re-encode it. Errors mean "no image available".
    pub async fn enhance_screenshot(
        &self,
        png: Vec<u8>,
        page_url: &str,
        tier: QualityTier,
    ) -> Result<EnhancedImageResult, ScrapingError> {
        let (format, page_url) = (self.format, page_url.to_string());
        off_runtime(move || {
            let shot = decode(&png)?;
            let (w, h) = shot.dimensions();
            let crop_h =
                (w as u64 * CARD_RATIO.1 as u64 / CARD_RATIO.0 as u64).min(h as u64) as u32;
            let card = shot.crop_imm(0, 0, w, crop_h.max(1));
            render(&card, tier.target(), format, &page_url)
        })
        .await
    }
}

/// Run CPU-bound image work on the blocking pool.
async fn off_runtime<T, J>(job: J) -> Result<T, ScrapingError>
where
    T: Send + 'static,
    J: FnOnce() -> Result<T, ScrapingError> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| ScrapingError::ImageProcessing(format!("Image worker failed: {e}")))?
}

fn decode(bytes: &[u8]) -> Result<DynamicImage, ScrapingError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ScrapingError::ImageProcessing(format!("Failed to detect image format: {e}")))?
        .decode()
        .map_err(|e| ScrapingError::ImageProcessing(format!("Failed to decode image: {e}")))
}

/// Output size for a source of `width x height`: the tier target, scaled
/// down with its aspect ratio kept so neither side exceeds the source.
pub fn clamp_target(width: u32, height: u32, target: TierTarget) -> (u32, u32) {
    let (mut tw, mut th) = (target.width as u64, target.height as u64);
    let (sw, sh) = (width as u64, height as u64);
    if sw < tw {
        th = th * sw / tw;
        tw = sw;
    }
    if sh < th {
        tw = tw * sh / th;
        th = sh;
    }
    (tw.max(1) as u32, th.max(1) as u32)
}

fn render(
    source: &DynamicImage,
    target: TierTarget,
    format: OutputFormat,
    original_url: &str,
) -> Result<EnhancedImageResult, ScrapingError> {
    let (sw, sh) = source.dimensions();
    let (tw, th) = clamp_target(sw, sh, target);
    let resized = source.resize_to_fill(tw, th, FilterType::Lanczos3);

    let mut buf = Vec::new();
    let encoded = match format {
        OutputFormat::Jpeg => DynamicImage::ImageRgb8(resized.to_rgb8())
            .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, target.quality)),
        OutputFormat::Png => resized.write_with_encoder(PngEncoder::new(&mut buf)),
        OutputFormat::WebP => DynamicImage::ImageRgba8(resized.to_rgba8())
            .write_with_encoder(WebPEncoder::new_lossless(&mut buf)),
    };
    encoded.map_err(|e| ScrapingError::ImageProcessing(format!("Failed to encode {format}: {e}")))?;

    let quality = match format {
        OutputFormat::Jpeg => target.quality,
        OutputFormat::Png | OutputFormat::WebP => 100,
    };

    Ok(EnhancedImageResult {
        original_url: original_url.to_string(),
        enhanced_url: Some(format!("data:{};base64,{}", format.mime(), STANDARD.encode(&buf))),
        width: resized.width(),
        height: resized.height(),
        format: format.as_str().to_string(),
        quality,
        file_size: buf.len(),
    })
}

/// Ask known image CDNs for a variant at the target size.
///
/// Unknown hosts, and URLs that fail to parse, are returned unchanged.
pub fn resolve_cdn_url(url: &str, target: TierTarget) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    let Some(host) = parsed.host_str().map(str::to_lowercase) else {
        return url.to_string();
    };
    let (w, h, q) = (
        target.width.to_string(),
        target.height.to_string(),
        target.quality.to_string(),
    );
    let (w, h, q) = (w.as_str(), h.as_str(), q.as_str());

    let params: Vec<(&str, &str)> = if host.ends_with(".imgix.net")
        || host == "images.unsplash.com"
        || host == "cdn.sanity.io"
    {
        vec![
            ("auto", "format,compress"),
            ("w", w),
            ("h", h),
            ("fit", "crop"),
            ("q", q),
        ]
    } else if host == "images.ctfassets.net" {
        vec![("w", w), ("h", h), ("fit", "fill"), ("q", q)]
    } else if host == "cdn.shopify.com" || host.ends_with(".myshopify.com") {
        vec![("width", w), ("height", h), ("crop", "center")]
    } else if host == "res.cloudinary.com" {
        return cloudinary_variant(url, target).unwrap_or_else(|| url.to_string());
    } else {
        return url.to_string();
    };

    let keep: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !params.iter().any(|(p, _)| *p == k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    {
        let mut query = parsed.query_pairs_mut();
        query.clear();
        query.extend_pairs(keep);
        query.extend_pairs(params);
    }
    parsed.to_string()
}

/// Cloudinary encodes transformations as a path segment after `/upload/`.
fn cloudinary_variant(url: &str, target: TierTarget) -> Option<String> {
    let (head, tail) = url.split_once("/upload/")?;
    let transform = format!(
        "w_{},h_{},c_fill,g_auto,q_{},f_auto",
        target.width, target.height, target.quality
    );
    Some(format!("{head}/upload/{transform}/{tail}"))
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use gleaner_core::models::CandidateSource;
    use gleaner_core::testutil::MockFetcher;
    use image::{ImageFormat, RgbImage};

    use super::*;

    const IMG_URL: &str = "https://example.com/photo.png";

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn candidate(url: &str, width: u32, height: u32) -> ImageCandidate {
        ImageCandidate {
            url: url.to_string(),
            width,
            height,
            format: "png".into(),
            score: 100,
            source_type: CandidateSource::Meta,
            alt: None,
        }
    }

    #[tokio::test]
    async fn never_upscales_small_sources() {
        let fetcher = MockFetcher::new("").with_bytes(IMG_URL, png_bytes(400, 300));
        let enhancer = ImageEnhancer::new(fetcher);

        let result = enhancer.enhance(&candidate(IMG_URL, 0, 0), QualityTier::High).await;

        assert!(result.is_enhanced());
        assert_eq!(result.width, 400);
        assert_eq!(result.height, 225);
        assert_eq!(result.quality, 85);
        assert_eq!(result.format, "jpeg");
        assert!(result.file_size > 0);
        assert!(
            result
                .enhanced_url
                .as_deref()
                .unwrap()
                .starts_with("data:image/jpeg;base64,")
        );
    }

    #[tokio::test]
    async fn large_source_is_cropped_to_tier() {
        let fetcher = MockFetcher::new("").with_bytes(IMG_URL, png_bytes(1600, 1200));
        let enhancer = ImageEnhancer::new(fetcher);

        let result = enhancer
            .enhance(&candidate(IMG_URL, 0, 0), QualityTier::Standard)
            .await;
        assert_eq!((result.width, result.height), (1200, 630));
        assert_eq!(result.quality, 80);
    }

    #[tokio::test]
    async fn fetch_failure_degrades_to_original() {
        let enhancer = ImageEnhancer::new(MockFetcher::new(""));
        let result = enhancer
            .enhance(&candidate("https://example.com/missing.jpg", 1200, 630), QualityTier::High)
            .await;

        assert!(!result.is_enhanced());
        assert_eq!(result.original_url, "https://example.com/missing.jpg");
        assert_eq!((result.width, result.height), (1200, 630));
        assert_eq!(result.quality, 0);
        assert_eq!(result.file_size, 0);
    }

    #[tokio::test]
    async fn undecodable_bytes_degrade() {
        let fetcher = MockFetcher::new("").with_bytes(IMG_URL, b"<html>not an image</html>".to_vec());
        let result = ImageEnhancer::new(fetcher)
            .enhance(&candidate(IMG_URL, 10, 10), QualityTier::Thumbnail)
            .await;
        assert_eq!(result.quality, 0);
        assert!(result.enhanced_url.is_none());
    }

    #[tokio::test]
    async fn enhance_all_emits_each_format() {
        let fetcher = MockFetcher::new("").with_bytes(IMG_URL, png_bytes(800, 450));
        let enhancer = ImageEnhancer::new(fetcher.clone());
        let results = enhancer
            .enhance_all(
                &candidate(IMG_URL, 0, 0),
                QualityTier::Thumbnail,
                &[OutputFormat::Jpeg, OutputFormat::Png, OutputFormat::WebP],
            )
            .await;

        let formats: Vec<&str> = results.iter().map(|r| r.format.as_str()).collect();
        assert_eq!(formats, vec!["jpeg", "png", "webp"]);
        assert!(results.iter().all(|r| (r.width, r.height) == (400, 225)));
        assert!(results[2].enhanced_url.as_deref().unwrap().starts_with("data:image/webp"));
        assert_eq!(fetcher.requested_urls().len(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn image_work_leaves_the_runtime_free() {
        let fetcher = MockFetcher::new("").with_bytes(IMG_URL, png_bytes(2400, 1800));
        let enhancer = ImageEnhancer::new(fetcher);

        // On a single-threaded runtime the second branch can only run before
        // the first finishes if decoding and encoding happen elsewhere.
        let (finished, other_task_ran) = tokio::join!(
            async {
                let result = enhancer.enhance(&candidate(IMG_URL, 0, 0), QualityTier::Ultra).await;
                assert!(result.is_enhanced());
                Instant::now()
            },
            async { Instant::now() },
        );
        assert!(other_task_ran < finished);
    }

    #[tokio::test]
    async fn screenshot_is_cropped_to_card_ratio() {
        let enhancer = ImageEnhancer::new(MockFetcher::new(""));
        let result = enhancer
            .enhance_screenshot(png_bytes(1920, 3000), "https://example.com/", QualityTier::Standard)
            .await
            .unwrap();
        assert_eq!((result.width, result.height), (1200, 630));
        assert_eq!(result.original_url, "https://example.com/");
    }

    #[tokio::test]
    async fn screenshot_garbage_is_an_error() {
        let enhancer = ImageEnhancer::new(MockFetcher::new(""));
        let result = enhancer
            .enhance_screenshot(b"nope".to_vec(), "https://example.com/", QualityTier::High)
            .await;
        assert!(matches!(result, Err(ScrapingError::ImageProcessing(_))));
    }

    #[test]
    fn clamp_keeps_tier_ratio_and_source_bounds() {
        let high = QualityTier::High.target();
        assert_eq!(clamp_target(400, 300, high), (400, 225));
        assert_eq!(clamp_target(4000, 3000, high), (1920, 1080));
        assert_eq!(clamp_target(1920, 540, high), (960, 540));
    }

    #[test]
    fn cdn_urls_request_sized_variants() {
        let target = QualityTier::Standard.target();
        let imgix = resolve_cdn_url("https://acme.imgix.net/a.jpg?w=100&dpr=2", target);
        assert!(imgix.contains("dpr=2"));
        assert!(imgix.contains("w=1200"));
        assert!(!imgix.contains("w=100&"));
        assert!(imgix.contains("fit=crop"));
        assert!(imgix.contains("q=80"));

        let shopify = resolve_cdn_url("https://cdn.shopify.com/s/files/a.jpg", target);
        assert!(shopify.ends_with("width=1200&height=630&crop=center"));

        let cloudinary =
            resolve_cdn_url("https://res.cloudinary.com/demo/image/upload/v1/a.jpg", target);
        assert_eq!(
            cloudinary,
            "https://res.cloudinary.com/demo/image/upload/w_1200,h_630,c_fill,g_auto,q_80,f_auto/v1/a.jpg"
        );

        let plain = "https://example.com/a.jpg";
        assert_eq!(resolve_cdn_url(plain, target), plain);
    }

    #[test]
    fn output_format_parses() {
        assert_eq!("JPG".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        assert_eq!("webp".parse::<OutputFormat>().unwrap(), OutputFormat::WebP);
        assert!("tiff".parse::<OutputFormat>().is_err());
    }
}
