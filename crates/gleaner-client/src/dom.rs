//! DOM queries shared by the extraction tiers.
//!
//! Everything here works on a parsed [`scraper::Html`]; the primary tier
//! feeds it the serialized DOM of a rendered page, the fallback tiers feed
//! it a plain HTTP response body.

use gleaner_core::models::{AudioMetadata, ImageMetadata, MediaMetadata, VideoMetadata};
use gleaner_core::text::normalize_whitespace;
use scraper::{ElementRef, Html, Node, Selector};
use serde_json::Value;

/// Containers tried in order when looking for the main article body.
pub const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "[itemprop=\"articleBody\"]",
    "main",
    "[role=\"main\"]",
    ".post-content",
    ".entry-content",
    ".article-content",
    ".article-body",
    ".story-body",
    "#content",
    ".content",
];

/// A content container must yield at least this much text to be used.
pub const MIN_CONTENT_CHARS: usize = 100;

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg"];

pub(crate) fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// First non-empty `content` attribute among `selectors`, in order.
pub fn meta_content(doc: &Html, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|css| {
        let sel = selector(css)?;
        doc.select(&sel)
            .filter_map(|el| el.value().attr("content"))
            .map(str::trim)
            .find(|v| !v.is_empty())
            .map(str::to_string)
    })
}

/// Text of the first element matching `css`, whitespace-normalized.
pub fn first_text(doc: &Html, css: &str) -> Option<String> {
    let sel = selector(css)?;
    doc.select(&sel)
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))
        .find(|t| !t.is_empty())
}

/// Visible text under `el`, with script/style/template content skipped.
pub fn visible_text(el: ElementRef<'_>) -> String {
    let mut buf = String::new();
    for node in el.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| SKIPPED_TAGS.contains(&e.name()))
        });
        if !hidden {
            buf.push_str(text);
            buf.push(' ');
        }
    }
    normalize_whitespace(&buf)
}

/// Main content as `(html, text)`.
///
/// The first container from [`CONTENT_SELECTORS`] with at least
/// [`MIN_CONTENT_CHARS`] of text wins; otherwise the whole `<body>` is used.
/// `None` when the page has no visible text at all.
pub fn main_content(doc: &Html) -> Option<(String, String)> {
    for css in CONTENT_SELECTORS {
        let Some(sel) = selector(css) else { continue };
        for el in doc.select(&sel) {
            let text = visible_text(el);
            if text.chars().count() >= MIN_CONTENT_CHARS {
                tracing::debug!(selector = css, chars = text.len(), "Content container matched");
                return Some((el.inner_html(), text));
            }
        }
    }

    let body = selector("body").and_then(|sel| doc.select(&sel).next())?;
    let text = visible_text(body);
    if text.is_empty() {
        None
    } else {
        Some((body.inner_html(), text))
    }
}

/// Plain `<body>` text (fallback for the metadata tier).
pub fn body_text(doc: &Html) -> String {
    selector("body")
        .and_then(|sel| doc.select(&sel).next())
        .map(visible_text)
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// JSON-LD
// ---------------------------------------------------------------------------

/// Article fields declared in `application/ld+json` blocks.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct JsonLd {
    pub headline: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub date_published: Option<String>,
    pub images: Vec<String>,
}

impl JsonLd {
    pub fn from_document(doc: &Html) -> Self {
        let mut out = JsonLd::default();
        let Some(sel) = selector("script[type=\"application/ld+json\"]") else {
            return out;
        };

        let mut nodes = Vec::new();
        for script in doc.select(&sel) {
            let raw = script.text().collect::<String>();
            match serde_json::from_str::<Value>(raw.trim()) {
                Ok(value) => flatten_json_ld(value, &mut nodes),
                Err(e) => tracing::debug!(error = %e, "Skipping malformed JSON-LD block"),
            }
        }

        for node in &nodes {
            if out.headline.is_none() {
                out.headline = string_field(node, "headline");
            }
            if out.description.is_none() {
                out.description = string_field(node, "description");
            }
            if out.author.is_none() {
                out.author = node.get("author").and_then(person_name);
            }
            if out.date_published.is_none() {
                out.date_published = string_field(node, "datePublished");
            }
            if let Some(image) = node.get("image") {
                collect_image_urls(image, &mut out.images);
            }
            if let Some(thumb) = node.get("thumbnailUrl") {
                collect_image_urls(thumb, &mut out.images);
            }
        }
        out
    }
}

/// Expand top-level arrays and `@graph` containers into a flat list of objects.
fn flatten_json_ld(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => items.into_iter().for_each(|v| flatten_json_ld(v, out)),
        Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                flatten_json_ld(graph, out);
            }
            if !map.is_empty() {
                out.push(Value::Object(map));
            }
        }
        _ => {}
    }
}

fn string_field(node: &Value, key: &str) -> Option<String> {
    node.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// `"Jane"`, `{"name": "Jane"}` or a list of either; lists are joined.
fn person_name(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Object(_) => string_field(value, "name"),
        Value::Array(items) => {
            let names: Vec<String> = items.iter().filter_map(person_name).collect();
            (!names.is_empty()).then(|| names.join(", "))
        }
        _ => None,
    }
}

fn collect_image_urls(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) if !s.trim().is_empty() => out.push(s.trim().to_string()),
        Value::Object(_) => {
            if let Some(url) = string_field(value, "url").or_else(|| string_field(value, "contentUrl"))
            {
                out.push(url);
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_image_urls(v, out)),
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Page metadata
// ---------------------------------------------------------------------------

/// Declared metadata of a page: Open Graph first, then Twitter Card, then
/// generic `<meta name>` tags, then JSON-LD.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub date_published: Option<String>,
    pub image: Option<String>,
    pub media: MediaMetadata,
}

impl PageMetadata {
    pub fn from_document(doc: &Html) -> Self {
        let json_ld = JsonLd::from_document(doc);

        let title = meta_content(doc, &["meta[property=\"og:title\"]", "meta[name=\"twitter:title\"]"])
            .or_else(|| first_text(doc, "title"))
            .or_else(|| json_ld.headline.clone())
            .or_else(|| first_text(doc, "h1"));

        let description = meta_content(
            doc,
            &[
                "meta[property=\"og:description\"]",
                "meta[name=\"twitter:description\"]",
                "meta[name=\"description\"]",
            ],
        )
        .or_else(|| json_ld.description.clone());

        let author = meta_content(
            doc,
            &[
                "meta[property=\"article:author\"]",
                "meta[name=\"twitter:creator\"]",
                "meta[name=\"author\"]",
            ],
        )
        .or_else(|| json_ld.author.clone());

        let date_published = meta_content(
            doc,
            &[
                "meta[property=\"article:published_time\"]",
                "meta[name=\"date\"]",
                "meta[itemprop=\"datePublished\"]",
            ],
        )
        .or_else(|| json_ld.date_published.clone())
        .or_else(|| {
            let sel = selector("time[datetime]")?;
            doc.select(&sel)
                .filter_map(|t| t.value().attr("datetime"))
                .map(str::to_string)
                .next()
        });

        let image = meta_content(
            doc,
            &[
                "meta[property=\"og:image\"]",
                "meta[property=\"og:image:url\"]",
                "meta[name=\"twitter:image\"]",
                "meta[name=\"twitter:image:src\"]",
            ],
        )
        .or_else(|| json_ld.images.first().cloned());

        Self {
            title,
            description,
            author,
            date_published,
            image,
            media: detect_media(doc),
        }
    }
}

/// Classify the page from `og:type`, `og:video`, `og:audio` and `twitter:player`.
pub fn detect_media(doc: &Html) -> MediaMetadata {
    let og_type = meta_content(doc, &["meta[property=\"og:type\"]"])
        .unwrap_or_default()
        .to_lowercase();
    let number = |css: &str| meta_content(doc, &[css]).and_then(|v| v.parse::<u64>().ok());

    let video_url = meta_content(
        doc,
        &[
            "meta[property=\"og:video:secure_url\"]",
            "meta[property=\"og:video:url\"]",
            "meta[property=\"og:video\"]",
        ],
    );
    let player = meta_content(doc, &["meta[name=\"twitter:player\"]"]);
    if og_type.starts_with("video") || video_url.is_some() || player.is_some() {
        return MediaMetadata::Video(VideoMetadata {
            url: video_url,
            embed_url: player,
            duration_secs: number("meta[property=\"video:duration\"]"),
            width: number("meta[property=\"og:video:width\"]").map(|w| w as u32),
            height: number("meta[property=\"og:video:height\"]").map(|h| h as u32),
        });
    }

    let audio_url = meta_content(
        doc,
        &[
            "meta[property=\"og:audio:secure_url\"]",
            "meta[property=\"og:audio:url\"]",
            "meta[property=\"og:audio\"]",
        ],
    );
    if og_type.starts_with("music") || og_type.starts_with("audio") || audio_url.is_some() {
        return MediaMetadata::Audio(AudioMetadata {
            url: audio_url,
            duration_secs: number("meta[property=\"music:duration\"]"),
        });
    }

    if og_type == "image"
        && let Some(url) = meta_content(doc, &["meta[property=\"og:image\"]"])
    {
        return MediaMetadata::Image(ImageMetadata {
            url,
            width: number("meta[property=\"og:image:width\"]").map(|w| w as u32),
            height: number("meta[property=\"og:image:height\"]").map(|h| h as u32),
        });
    }

    MediaMetadata::None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_lookup_respects_selector_order() {
        let doc = Html::parse_document(
            r#"<html><head>
                <meta name="description" content="generic">
                <meta name="twitter:description" content="twitter">
                <meta property="og:description" content="  ">
            </head></html>"#,
        );
        let desc = meta_content(
            &doc,
            &[
                "meta[property=\"og:description\"]",
                "meta[name=\"twitter:description\"]",
                "meta[name=\"description\"]",
            ],
        );
        assert_eq!(desc.as_deref(), Some("twitter"));
    }

    #[test]
    fn visible_text_skips_scripts() {
        let doc = Html::parse_document(
            "<body><p>Hello <b>world</b></p><script>var x = 1;</script><style>p{}</style></body>",
        );
        assert_eq!(body_text(&doc), "Hello world");
    }

    #[test]
    fn main_content_prefers_article_with_enough_text() {
        let long = "word ".repeat(40);
        let html = format!(
            "<body><nav>Menu</nav><article><p>{long}</p></article><footer>foot</footer></body>"
        );
        let doc = Html::parse_document(&html);
        let (content, text) = main_content(&doc).unwrap();
        assert!(content.contains("<p>"));
        assert!(!text.contains("Menu"));
        assert_eq!(text.split_whitespace().count(), 40);
    }

    #[test]
    fn main_content_falls_back_to_body_when_containers_are_short() {
        let doc = Html::parse_document(
            "<body><article>Too short</article><div>Rest of the page</div></body>",
        );
        let (_, text) = main_content(&doc).unwrap();
        assert_eq!(text, "Too short Rest of the page");
    }

    #[test]
    fn main_content_none_for_empty_body() {
        let doc = Html::parse_document("<html><body><script>x()</script></body></html>");
        assert!(main_content(&doc).is_none());
    }

    #[test]
    fn json_ld_reads_graph_and_nested_author() {
        let doc = Html::parse_document(
            r#"<script type="application/ld+json">
            {"@context":"https://schema.org","@graph":[
                {"@type":"WebSite","name":"Site"},
                {"@type":"NewsArticle","headline":"Big News",
                 "author":[{"@type":"Person","name":"Ada"},{"@type":"Person","name":"Grace"}],
                 "datePublished":"2024-03-01T10:00:00Z",
                 "image":{"@type":"ImageObject","url":"https://cdn.example.com/a.jpg"}}
            ]}
            </script>"#,
        );
        let ld = JsonLd::from_document(&doc);
        assert_eq!(ld.headline.as_deref(), Some("Big News"));
        assert_eq!(ld.author.as_deref(), Some("Ada, Grace"));
        assert_eq!(ld.date_published.as_deref(), Some("2024-03-01T10:00:00Z"));
        assert_eq!(ld.images, vec!["https://cdn.example.com/a.jpg"]);
    }

    #[test]
    fn json_ld_ignores_malformed_blocks() {
        let doc = Html::parse_document(
            r#"<script type="application/ld+json">{ not json</script>
               <script type="application/ld+json">{"headline":"ok"}</script>"#,
        );
        assert_eq!(JsonLd::from_document(&doc).headline.as_deref(), Some("ok"));
    }

    #[test]
    fn page_metadata_falls_back_through_sources() {
        let doc = Html::parse_document(
            r#"<html><head><title>Doc Title</title>
                <meta name="author" content="Jo">
                <script type="application/ld+json">{"datePublished":"2023-01-01"}</script>
            </head><body></body></html>"#,
        );
        let meta = PageMetadata::from_document(&doc);
        assert_eq!(meta.title.as_deref(), Some("Doc Title"));
        assert_eq!(meta.author.as_deref(), Some("Jo"));
        assert_eq!(meta.date_published.as_deref(), Some("2023-01-01"));
        assert_eq!(meta.media, MediaMetadata::None);
    }

    #[test]
    fn detects_video_pages() {
        let doc = Html::parse_document(
            r#"<meta property="og:type" content="video.other">
               <meta property="og:video:url" content="https://v.example.com/1.mp4">
               <meta property="og:video:width" content="1280">
               <meta property="video:duration" content="95">"#,
        );
        match detect_media(&doc) {
            MediaMetadata::Video(v) => {
                assert_eq!(v.url.as_deref(), Some("https://v.example.com/1.mp4"));
                assert_eq!(v.width, Some(1280));
                assert_eq!(v.duration_secs, Some(95));
            }
            other => panic!("expected video, got {other:?}"),
        }
    }

    #[test]
    fn detects_audio_pages() {
        let doc = Html::parse_document(
            r#"<meta property="og:type" content="music.song">
               <meta property="og:audio" content="https://a.example.com/s.mp3">"#,
        );
        assert!(matches!(detect_media(&doc), MediaMetadata::Audio(_)));
    }
}
