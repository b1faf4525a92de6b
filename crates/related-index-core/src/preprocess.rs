//! Text normalization and bounded chunking.
//!
//! Every document is reduced to a single lowercase, markup-free, ASCII
//! chunk before it is embedded. The query path runs the exact same steps on
//! the querying document so both sides of the similarity comparison see
//! identically shaped text.
//!
//! # Pipeline
//!
//! 1. Strip HTML markup (text nodes only).
//! 2. Lowercase.
//! 3. Remove URLs (`http\S+`).
//! 4. Remove every character outside `[a-z0-9 $]` (whitespace survives).
//! 5. Collapse whitespace runs to a single space and trim.
//!
//! [`chunk`] then keeps the first `bound` characters, preferring to cut on
//! a word boundary.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{ChunkMetadata, Document, IndexedChunk};

/// Default chunk bound in characters.
pub const DEFAULT_CHUNK_CHARS: usize = 8000;

static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"http\S+").expect("valid url regex"));
static DISALLOWED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9\s$]").expect("valid charset regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Normalize raw (possibly HTML) content into clean, comparable text.
///
/// Idempotent: `normalize(&normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }

    let text = strip_markup(raw).to_lowercase();
    let text = URL_RE.replace_all(&text, "");
    let text = DISALLOWED_RE.replace_all(&text, "");
    // Deleting punctuation can glue a new `http...` token together.
    let text = URL_RE.replace_all(&text, "");
    WHITESPACE_RE.replace_all(&text, " ").trim().to_string()
}

/// Return the first segment of `clean` that fits in `bound` characters.
///
/// Text shorter than the bound is returned unchanged. Longer text is cut at
/// the last space inside the window when there is one, otherwise hard at the
/// bound. The result never exceeds `bound` characters.
pub fn chunk(clean: &str, bound: usize) -> String {
    if clean.chars().count() <= bound {
        return clean.to_string();
    }

    let end = clean
        .char_indices()
        .nth(bound)
        .map(|(i, _)| i)
        .unwrap_or(clean.len());
    let window = &clean[..end];

    let cut = match window.rfind(' ') {
        Some(pos) if pos > 0 => &window[..pos],
        _ => window,
    };
    cut.trim_end().to_string()
}

/// Normalize and chunk a document into the record that gets embedded.
///
/// Returns `None` when nothing indexable is left after normalization.
pub fn prepare(document: &Document, bound: usize) -> Option<IndexedChunk> {
    let text = chunk(&normalize(&document.raw_text), bound);
    if text.is_empty() {
        return None;
    }

    Some(IndexedChunk {
        id: document.id.clone(),
        text,
        metadata: ChunkMetadata::from_published_at(document.published_at),
    })
}

fn strip_markup(raw: &str) -> String {
    if !raw.contains('<') && !raw.contains('&') {
        return raw.to_string();
    }
    let fragment = scraper::Html::parse_fragment(raw);
    fragment.root_element().text().collect::<String>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn strips_markup_urls_and_punctuation() {
        let raw = "<p>Check <b>THIS</b> out: https://example.com/a?b=1 &mdash; only $5!</p>";
        assert_eq!(normalize(raw), "check this out only $5");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(normalize("  Red\n\n sports\t car  "), "red sports car");
    }

    #[test]
    fn empty_input_gives_empty_output() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   \n"), "");
        assert_eq!(chunk("", 10), "");
    }

    #[test]
    fn normalize_is_idempotent() {
        let samples = [
            "<div>Hello <a href=\"http://x.io\">World</a></div>",
            "htt-px glued token",
            "Ünïcödé — façade, naïve café",
            "price: $1,000.00 (approx.)",
            "&lt;script&gt;alert(1)&lt;/script&gt;",
            "line\r\nbreaks\u{00A0}and\u{2003}spaces",
        ];
        for s in samples {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", s);
        }
    }

    #[test]
    fn chunk_keeps_short_text_unchanged() {
        assert_eq!(chunk("blue sedan parked at night", 8000), "blue sedan parked at night");
    }

    #[test]
    fn chunk_never_exceeds_bound() {
        let text = "word ".repeat(5000);
        let text = text.trim();
        for bound in [0, 1, 3, 4, 5, 7, 100, 8000] {
            let out = chunk(text, bound);
            assert!(out.chars().count() <= bound, "bound {} got {}", bound, out.len());
        }
        let solid = "x".repeat(9000);
        assert_eq!(chunk(&solid, 8000).len(), 8000);
    }

    #[test]
    fn chunk_prefers_word_boundary() {
        assert_eq!(chunk("alpha beta gamma", 12), "alpha beta");
    }

    #[test]
    fn prepare_skips_documents_without_text() {
        let doc = Document {
            id: "7".to_string(),
            raw_text: "<img src=\"a.png\"/>".to_string(),
            published_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        };
        assert!(prepare(&doc, DEFAULT_CHUNK_CHARS).is_none());
    }

    #[test]
    fn prepare_builds_chunk_with_metadata() {
        let doc = Document {
            id: "1".to_string(),
            raw_text: "Red sports car driving on highway".to_string(),
            published_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        };
        let chunk = prepare(&doc, DEFAULT_CHUNK_CHARS).unwrap();
        assert_eq!(chunk.id, "1");
        assert_eq!(chunk.text, "red sports car driving on highway");
        assert_eq!(chunk.metadata.formatted_date, "2024-01-01 00:00:00");
    }
}
