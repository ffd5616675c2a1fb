use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ErrorInfo, ScrapingError};
use crate::text;

/// Method name recorded when every tier failed.
pub const STUB_METHOD: &str = "stub";

/// Kind of media the page primarily represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    #[default]
    Text,
    Video,
    Audio,
    Image,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Text => "text",
            MediaType::Video => "video",
            MediaType::Audio => "audio",
            MediaType::Image => "image",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub url: Option<String>,
    pub embed_url: Option<String>,
    pub duration_secs: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioMetadata {
    pub url: Option<String>,
    pub duration_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Media-specific metadata, discriminated by kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MediaMetadata {
    #[default]
    None,
    Video(VideoMetadata),
    Audio(AudioMetadata),
    Image(ImageMetadata),
}

impl MediaMetadata {
    pub fn media_type(&self) -> MediaType {
        match self {
            MediaMetadata::None => MediaType::Text,
            MediaMetadata::Video(_) => MediaType::Video,
            MediaMetadata::Audio(_) => MediaType::Audio,
            MediaMetadata::Image(_) => MediaType::Image,
        }
    }
}

/// Where an image candidate was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateSource {
    Meta,
    Srcset,
    Content,
}

/// One possible lead image, before and during ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageCandidate {
    /// Absolute URL.
    pub url: String,
    pub width: u32,
    pub height: u32,
    /// Lowercase file extension or `unknown`.
    pub format: String,
    pub score: i32,
    pub source_type: CandidateSource,
    pub alt: Option<String>,
}

/// Outcome of re-encoding the lead image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedImageResult {
    pub original_url: String,
    /// Inline data URI; absent when enhancement failed.
    pub enhanced_url: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: String,
    /// 0 when enhancement failed.
    pub quality: u8,
    pub file_size: usize,
}

impl EnhancedImageResult {
    /// Degraded result that keeps the original URL and pre-enhancement dimensions.
    pub fn degraded(candidate: &ImageCandidate) -> Self {
        Self {
            original_url: candidate.url.clone(),
            enhanced_url: None,
            width: candidate.width,
            height: candidate.height,
            format: candidate.format.clone(),
            quality: 0,
            file_size: 0,
        }
    }

    pub fn is_enhanced(&self) -> bool {
        self.enhanced_url.is_some()
    }
}

/// Named target resolution/quality preset for the image enhancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Thumbnail,
    Standard,
    #[default]
    High,
    Ultra,
}

/// Target width, height and encoder quality of a [`QualityTier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierTarget {
    pub width: u32,
    pub height: u32,
    pub quality: u8,
}

impl QualityTier {
    pub fn target(&self) -> TierTarget {
        match self {
            QualityTier::Thumbnail => TierTarget {
                width: 400,
                height: 225,
                quality: 70,
            },
            QualityTier::Standard => TierTarget {
                width: 1200,
                height: 630,
                quality: 80,
            },
            QualityTier::High => TierTarget {
                width: 1920,
                height: 1080,
                quality: 85,
            },
            QualityTier::Ultra => TierTarget {
                width: 2560,
                height: 1440,
                quality: 92,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Thumbnail => "thumbnail",
            QualityTier::Standard => "standard",
            QualityTier::High => "high",
            QualityTier::Ultra => "ultra",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for QualityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "thumbnail" => Ok(QualityTier::Thumbnail),
            "standard" => Ok(QualityTier::Standard),
            "high" => Ok(QualityTier::High),
            "ultra" => Ok(QualityTier::Ultra),
            _ => Err(format!("Unknown quality tier: {s}")),
        }
    }
}

/// A tier that failed before the result was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierFailure {
    pub method: String,
    pub error: ErrorInfo,
}

/// Canonical extraction output, whichever tier produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub title: String,
    /// HTML or plain text of the main content.
    pub content: String,
    /// Plain text, script/style stripped.
    pub text_content: String,
    pub excerpt: String,
    pub author: Option<String>,
    pub date_published: Option<String>,
    pub lead_image_url: Option<String>,
    pub lead_image: Option<EnhancedImageResult>,
    pub url: String,
    pub domain: String,
    pub word_count: usize,
    pub reading_time: String,
    pub success: bool,
    pub method: String,
    pub media_type: MediaType,
    pub media: MediaMetadata,
    pub error: Option<String>,
    /// Failures of the tiers tried before this result was produced.
    pub tier_errors: Vec<TierFailure>,
    /// SHA-256 of `text_content`.
    pub content_hash: String,
    pub extracted_at: DateTime<Utc>,
}

impl ExtractionResult {
    /// Successful result; derived fields are computed from `text_content`.
    pub fn new(
        url: &str,
        method: &str,
        title: impl Into<String>,
        content: impl Into<String>,
        text_content: impl Into<String>,
    ) -> Self {
        let text_content = text_content.into();
        let word_count = text::word_count(&text_content);
        Self {
            title: title.into(),
            content: content.into(),
            excerpt: text::excerpt(&text_content, text::MAX_EXCERPT_CHARS),
            content_hash: compute_hash(&text_content),
            text_content,
            author: None,
            date_published: None,
            lead_image_url: None,
            lead_image: None,
            url: url.to_string(),
            domain: text::domain_of(url),
            word_count,
            reading_time: text::reading_time(word_count),
            success: true,
            method: method.to_string(),
            media_type: MediaType::Text,
            media: MediaMetadata::None,
            error: None,
            tier_errors: Vec::new(),
            extracted_at: Utc::now(),
        }
    }

    /// Failed result carrying only the domain (also used as title) and the error.
    pub fn failure(url: &str, method: &str, error: &ScrapingError) -> Self {
        let domain = text::domain_of(url);
        let mut result = Self::new(url, method, domain, "", "");
        result.success = false;
        result.error = Some(error.to_string());
        result
    }

    /// Replace the excerpt with a declared description, if one is present.
    pub fn with_description(mut self, description: Option<&str>) -> Self {
        if let Some(desc) = description.map(str::trim).filter(|d| !d.is_empty()) {
            self.excerpt = text::excerpt(desc, text::MAX_EXCERPT_CHARS);
        }
        self
    }

    pub fn with_author(mut self, author: Option<String>) -> Self {
        self.author = author.filter(|a| !a.trim().is_empty());
        self
    }

    pub fn with_date_published(mut self, date: Option<String>) -> Self {
        self.date_published = date.filter(|d| !d.trim().is_empty());
        self
    }

    pub fn with_media(mut self, media: MediaMetadata) -> Self {
        self.media_type = media.media_type();
        self.media = media;
        self
    }

    /// Attach the enhanced lead image; the data URI wins over the original URL.
    pub fn with_lead_image(mut self, image: Option<EnhancedImageResult>) -> Self {
        self.lead_image_url = image
            .as_ref()
            .map(|img| img.enhanced_url.clone().unwrap_or(img.original_url.clone()));
        self.lead_image = image;
        self
    }

    pub fn with_lead_image_url(mut self, url: Option<String>) -> Self {
        self.lead_image_url = url;
        self
    }
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_hash_consistency() {
        let h1 = compute_hash("hello world");
        let h2 = compute_hash("hello world");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn new_result_derives_counts_from_text() {
        let text = "word ".repeat(450);
        let result = ExtractionResult::new(
            "https://www.example.com/post",
            "chromium-render",
            "Title",
            "<p>x</p>",
            text,
        );
        assert!(result.success);
        assert_eq!(result.word_count, 450);
        assert_eq!(result.reading_time, "3 min read");
        assert_eq!(result.domain, "www.example.com");
        assert!(result.excerpt.chars().count() <= 300);
        assert!(result.error.is_none());
    }

    #[test]
    fn failure_result_uses_domain_as_title() {
        let err = ScrapingError::NetworkFailure("connection refused".into());
        let result = ExtractionResult::failure("https://news.example.org/a", STUB_METHOD, &err);
        assert!(!result.success);
        assert_eq!(result.title, "news.example.org");
        assert_eq!(result.domain, "news.example.org");
        assert_eq!(result.word_count, 0);
        assert_eq!(result.reading_time, "1 min read");
        assert!(!result.error.unwrap().is_empty());
    }

    #[test]
    fn media_metadata_drives_media_type() {
        let result = ExtractionResult::new("https://v.example.com", "m", "t", "", "")
            .with_media(MediaMetadata::Video(VideoMetadata::default()));
        assert_eq!(result.media_type, MediaType::Video);

        let json = serde_json::to_value(&result.media).unwrap();
        assert_eq!(json["kind"], "video");
    }

    #[test]
    fn lead_image_prefers_enhanced_data_uri() {
        let enhanced = EnhancedImageResult {
            original_url: "https://example.com/a.jpg".into(),
            enhanced_url: Some("data:image/jpeg;base64,AAAA".into()),
            width: 10,
            height: 10,
            format: "jpeg".into(),
            quality: 85,
            file_size: 3,
        };
        let result = ExtractionResult::new("https://example.com", "m", "t", "", "")
            .with_lead_image(Some(enhanced.clone()));
        assert_eq!(
            result.lead_image_url.as_deref(),
            Some("data:image/jpeg;base64,AAAA")
        );

        let degraded = EnhancedImageResult {
            enhanced_url: None,
            ..enhanced
        };
        let result = ExtractionResult::new("https://example.com", "m", "t", "", "")
            .with_lead_image(Some(degraded));
        assert_eq!(
            result.lead_image_url.as_deref(),
            Some("https://example.com/a.jpg")
        );
    }

    #[test]
    fn quality_tier_roundtrip() {
        for tier in [
            QualityTier::Thumbnail,
            QualityTier::Standard,
            QualityTier::High,
            QualityTier::Ultra,
        ] {
            let parsed: QualityTier = tier.as_str().parse().unwrap();
            assert_eq!(parsed, tier);
        }
        assert!("huge".parse::<QualityTier>().is_err());
        assert_eq!(QualityTier::High.target().width, 1920);
    }
}
