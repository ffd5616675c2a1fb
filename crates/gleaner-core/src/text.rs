//! Text helpers shared by every tier so derived fields stay consistent.

use url::Url;

/// Reading speed used for `reading_time`.
pub const WORDS_PER_MINUTE: usize = 200;

/// Upper bound on excerpt length, in characters.
pub const MAX_EXCERPT_CHARS: usize = 300;

/// Whitespace-token count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Human reading time, `max(1, ceil(words / 200))` minutes.
pub fn reading_time(word_count: usize) -> String {
    let minutes = word_count.div_ceil(WORDS_PER_MINUTE).max(1);
    format!("{minutes} min read")
}

/// Collapse runs of whitespace into single spaces.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Whitespace-normalized excerpt of at most `max_chars` characters.
///
/// Longer text is cut and suffixed with `...`, still within the bound.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let max_chars = max_chars.min(MAX_EXCERPT_CHARS);
    let normalized = normalize_whitespace(text);
    if normalized.chars().count() <= max_chars {
        return normalized;
    }
    let cut = truncate_chars(&normalized, max_chars.saturating_sub(3));
    format!("{}...", cut.trim_end())
}

/// Hostname of a URL, or the input itself when it cannot be parsed.
pub fn domain_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_time_rounds_up_with_floor_of_one() {
        assert_eq!(reading_time(0), "1 min read");
        assert_eq!(reading_time(1), "1 min read");
        assert_eq!(reading_time(200), "1 min read");
        assert_eq!(reading_time(201), "2 min read");
        assert_eq!(reading_time(1000), "5 min read");
    }

    #[test]
    fn word_count_splits_on_any_whitespace() {
        assert_eq!(word_count(""), 0);
        assert_eq!(word_count("  one\ttwo\n\nthree  "), 3);
    }

    #[test]
    fn excerpt_respects_bound() {
        let long = "lorem ipsum ".repeat(100);
        let ex = excerpt(&long, 300);
        assert!(ex.chars().count() <= 300);
        assert!(ex.ends_with("..."));

        assert_eq!(excerpt("  short   text ", 300), "short text");
    }

    #[test]
    fn excerpt_is_char_boundary_safe() {
        let text = "é".repeat(400);
        let ex = excerpt(&text, 300);
        assert_eq!(ex.chars().count(), 300);
    }

    #[test]
    fn domain_of_handles_bad_input() {
        assert_eq!(domain_of("https://blog.example.com/x?y=1"), "blog.example.com");
        assert_eq!(domain_of("not a url"), "not a url");
    }
}
