//! Lead-image discovery and ranking.
//!
//! Candidates are collected from declared metadata, structured data,
//! responsive `<picture>` sources and in-content `<img>` tags, in that
//! order, deduplicated by absolute URL. Scoring adjustments are applied in a
//! separate pass by [`ImageSelector::select_best`].

use std::collections::HashSet;
use std::sync::LazyLock;

use gleaner_core::models::{CandidateSource, ImageCandidate};
use regex::Regex;
use scraper::{ElementRef, Html};
use url::Url;

use crate::dom::{JsonLd, selector};

/// `1200x630`-shaped dimension hints embedded in image URLs.
static DIMENSIONS_IN_URL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)(\d{2,5})\s?[x×]\s?(\d{2,5})").ok());

const META_SOURCES: &[(&str, i32)] = &[
    ("meta[property=\"og:image:secure_url\"]", 100),
    ("meta[property=\"og:image\"]", 100),
    ("meta[property=\"og:image:url\"]", 100),
    ("meta[name=\"twitter:image\"]", 90),
    ("meta[name=\"twitter:image:src\"]", 90),
    ("meta[property=\"twitter:image\"]", 90),
];

const JSON_LD_SCORE: i32 = 85;
const SRCSET_SCORE: i32 = 80;
const CONTENT_SCORE: i32 = 60;

const CONTENT_IMAGE_SELECTORS: &[&str] = &[
    "article img",
    "main img",
    "[role=\"main\"] img",
    ".post-content img",
    ".entry-content img",
    ".article-body img",
    ".article-content img",
    "figure img",
];

const KNOWN_FORMATS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "avif", "svg", "bmp"];

/// Collects and ranks lead-image candidates.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageSelector;

impl ImageSelector {
    pub fn new() -> Self {
        Self
    }

    /// All candidates on the page with their base scores, in collection order.
    pub fn collect_candidates(&self, doc: &Html, base_url: &Url) -> Vec<ImageCandidate> {
        let mut collector = Collector {
            base_url,
            seen: HashSet::new(),
            candidates: Vec::new(),
        };

        // 1. Open Graph / Twitter Card.
        let og_width = meta_number(doc, "meta[property=\"og:image:width\"]");
        let og_height = meta_number(doc, "meta[property=\"og:image:height\"]");
        for (css, score) in META_SOURCES {
            let Some(sel) = selector(css) else { continue };
            for el in doc.select(&sel) {
                let Some(url) = el.value().attr("content") else {
                    continue;
                };
                let dims = if css.contains("og:image") {
                    og_width.zip(og_height)
                } else {
                    None
                };
                collector.push(url, dims, *score, CandidateSource::Meta, None);
            }
        }

        // 2. Structured data.
        for url in JsonLd::from_document(doc).images {
            collector.push(&url, None, JSON_LD_SCORE, CandidateSource::Meta, None);
        }

        // 3. Responsive <picture> sources, one representative per element.
        if let Some(sel) = selector("picture source[srcset], picture img[srcset]") {
            for el in doc.select(&sel) {
                if let Some(best) = el.value().attr("srcset").and_then(best_srcset_entry) {
                    let dims = best.width.map(|w| (w, 0));
                    collector.push(best.url, dims, SRCSET_SCORE, CandidateSource::Srcset, alt_of(el));
                }
            }
        }

        // 4. In-content images.
        for css in CONTENT_IMAGE_SELECTORS {
            let Some(sel) = selector(css) else { continue };
            for el in doc.select(&sel) {
                collector.push_img(el);
            }
        }

        tracing::debug!(count = collector.candidates.len(), "Collected image candidates");
        collector.candidates
    }

    /// Apply scoring adjustments and return the best candidate.
    ///
    /// Candidates with `width >= 600 || height >= 400 || score >= 80` are
    /// preferred; when none qualify, the top-scoring candidate overall is
    /// returned. Earlier candidates win ties.
    pub fn select_best(&self, mut candidates: Vec<ImageCandidate>) -> Option<ImageCandidate> {
        apply_adjustments(&mut candidates);

        let qualifies = |c: &&ImageCandidate| c.width >= 600 || c.height >= 400 || c.score >= 80;
        top_scoring(candidates.iter().filter(qualifies))
            .or_else(|| top_scoring(candidates.iter()))
            .cloned()
    }
}

/// Highest score; the earliest candidate wins ties.
fn top_scoring<'a>(
    candidates: impl Iterator<Item = &'a ImageCandidate>,
) -> Option<&'a ImageCandidate> {
    candidates.fold(None, |best, c| match best {
        Some(b) if b.score >= c.score => Some(b),
        _ => Some(c),
    })
}

/// Dimension, ratio and format adjustments on top of the base score.
///
/// Dimension rules only apply when both dimensions are known.
pub fn apply_adjustments(candidates: &mut [ImageCandidate]) {
    for c in candidates.iter_mut() {
        c.score += adjustment(c);
    }
}

fn adjustment(c: &ImageCandidate) -> i32 {
    let mut delta = 0;
    if c.width > 0 && c.height > 0 {
        if c.width >= 1200 && c.height >= 630 {
            delta += 20;
        }
        if c.width >= 800 && c.height >= 600 {
            delta += 10;
        }
        if c.width < 400 || c.height < 300 {
            delta -= 20;
        }
        let ratio = c.width as f64 / c.height as f64;
        if (1.5..=2.0).contains(&ratio) {
            delta += 10;
        }
    }
    match c.format.as_str() {
        "webp" | "avif" => delta += 5,
        "svg" => delta -= 10,
        _ => {}
    }
    delta
}

struct Collector<'a> {
    base_url: &'a Url,
    seen: HashSet<String>,
    candidates: Vec<ImageCandidate>,
}

impl Collector<'_> {
    /// Resolve, deduplicate and add one candidate.
    fn push(
        &mut self,
        raw: &str,
        dims: Option<(u32, u32)>,
        score: i32,
        source_type: CandidateSource,
        alt: Option<String>,
    ) {
        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with("data:") {
            return;
        }
        let Ok(resolved) = self.base_url.join(raw) else {
            return;
        };
        if !matches!(resolved.scheme(), "http" | "https") {
            return;
        }
        let url = resolved.to_string();
        if !self.seen.insert(url.clone()) {
            return;
        }

        let inferred = infer_dimensions(&url);
        let (width, height) = match (dims, inferred) {
            (Some((w, h)), Some((iw, ih))) => (
                if w > 0 { w } else { iw },
                if h > 0 { h } else { ih },
            ),
            (Some(d), None) => d,
            (None, Some(d)) => d,
            (None, None) => (0, 0),
        };

        self.candidates.push(ImageCandidate {
            format: format_of(&resolved),
            url,
            width,
            height,
            score,
            source_type,
            alt,
        });
    }

    fn push_img(&mut self, el: ElementRef<'_>) {
        let attrs = el.value();
        let attr_dim = |name: &str| attrs.attr(name).and_then(|v| v.trim().parse::<u32>().ok());
        let declared = (attr_dim("width").unwrap_or(0), attr_dim("height").unwrap_or(0));

        let largest = attrs
            .attr("srcset")
            .or_else(|| attrs.attr("data-srcset"))
            .and_then(best_srcset_entry);
        let (url, dims) = match largest {
            Some(entry) => {
                let width = entry.width.unwrap_or(declared.0);
                // Declared height only describes the rendered size of `src`.
                let height = if entry.width.is_some() { 0 } else { declared.1 };
                (entry.url, (width, height))
            }
            None => {
                let Some(src) = attrs
                    .attr("src")
                    .or_else(|| attrs.attr("data-src"))
                    .or_else(|| attrs.attr("data-lazy-src"))
                else {
                    return;
                };
                (src, declared)
            }
        };

        let dims = (dims != (0, 0)).then_some(dims);
        self.push(url, dims, CONTENT_SCORE, CandidateSource::Content, alt_of(el));
    }
}

fn alt_of(el: ElementRef<'_>) -> Option<String> {
    el.value()
        .attr("alt")
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
}

fn meta_number(doc: &Html, css: &str) -> Option<u32> {
    let sel = selector(css)?;
    doc.select(&sel)
        .filter_map(|el| el.value().attr("content"))
        .find_map(|v| v.trim().parse().ok())
}

/// One `srcset` entry.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SrcsetEntry<'a> {
    url: &'a str,
    width: Option<u32>,
    density: Option<f32>,
}

impl SrcsetEntry<'_> {
    /// Width descriptors rank by pixels, density descriptors as ~1000px per `1x`.
    fn rank(&self) -> f32 {
        match (self.width, self.density) {
            (Some(w), _) => w as f32,
            (None, Some(d)) => d * 1000.0,
            (None, None) => 1000.0,
        }
    }
}

/// The largest entry of a `srcset` attribute.
fn best_srcset_entry(srcset: &str) -> Option<SrcsetEntry<'_>> {
    parse_srcset(srcset)
        .into_iter()
        .fold(None, |best: Option<SrcsetEntry<'_>>, e| match best {
            Some(b) if b.rank() >= e.rank() => Some(b),
            _ => Some(e),
        })
}

/// Split on whitespace; commas inside URLs (common on image CDNs) are kept.
fn parse_srcset(srcset: &str) -> Vec<SrcsetEntry<'_>> {
    let mut entries = Vec::new();
    let mut tokens = srcset.split_whitespace().peekable();
    while let Some(token) = tokens.next() {
        let url = token.trim_end_matches(',');
        if url.is_empty() {
            continue;
        }
        let mut entry = SrcsetEntry {
            url,
            width: None,
            density: None,
        };
        if !token.ends_with(',')
            && let Some(next) = tokens.peek()
        {
            let desc = next.trim_end_matches(',');
            if let Some(w) = desc.strip_suffix('w').and_then(|w| w.parse().ok()) {
                entry.width = Some(w);
                tokens.next();
            } else if let Some(d) = desc.strip_suffix('x').and_then(|d| d.parse().ok()) {
                entry.density = Some(d);
                tokens.next();
            }
        }
        entries.push(entry);
    }
    entries
}

/// Last `WxH` pair in the URL, e.g. `hero-1200x630.jpg`.
pub fn infer_dimensions(url: &str) -> Option<(u32, u32)> {
    let re = DIMENSIONS_IN_URL.as_ref()?;
    re.captures_iter(url)
        .filter_map(|c| Some((c[1].parse().ok()?, c[2].parse().ok()?)))
        .filter(|&(w, h): &(u32, u32)| w > 0 && h > 0)
        .last()
}

/// Lowercase file extension, a format query parameter, or `unknown`.
fn format_of(url: &Url) -> String {
    let from_path = url
        .path()
        .rsplit('/')
        .next()
        .and_then(|file| file.rsplit_once('.'))
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| KNOWN_FORMATS.contains(&ext.as_str()));
    let from_query = || {
        url.query_pairs()
            .find(|(k, _)| matches!(k.as_ref(), "fm" | "format" | "f"))
            .map(|(_, v)| v.to_lowercase())
            .filter(|v| KNOWN_FORMATS.contains(&v.as_str()))
    };
    match from_path.or_else(from_query) {
        Some(ext) if ext == "jpeg" => "jpg".to_string(),
        Some(ext) => ext,
        None => "unknown".to_string(),
    }
}
