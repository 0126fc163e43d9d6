//! Citation marker syntax.
//!
//! The generation engine emits bare markers:
//!
//! ```text
//! <citation chunk-id="ID">display text</citation>
//! ```
//!
//! After validation each one is rewritten to an enriched marker that keeps
//! `chunk-id` as the first attribute and adds display metadata. Enriched
//! markers are matched too: every marker carrying a `chunk-id` is looked up
//! again and re-rendered, so extra attributes never vouch for a chunk.

use lazy_static::lazy_static;
use regex::Regex;
use std::ops::Range;

pub const CITATION_OPEN: &str = "<citation";
pub const CITATION_CLOSE: &str = "</citation>";

lazy_static! {
    /// A well-formed marker, bare or enriched, anywhere in the text.
    static ref MARKER: Regex =
        Regex::new(r#"(?s)<citation\s+chunk-id="([^"<>]+)"(?:\s+[a-z-]+="[^"<>]*")*\s*>(.*?)</citation>"#)
            .expect("citation pattern compiles");

    /// Any well-formed marker, bare or enriched, anchored at the start.
    static ref COMPLETE_MARKER: Regex =
        Regex::new(r#"(?s)\A<citation\s+chunk-id="[^"<>]+"(?:\s+[a-z-]+="[^"<>]*")*\s*>.*?</citation>"#)
            .expect("complete citation pattern compiles");
}

/// A marker found in generated text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationMarker {
    /// Decoded `chunk-id` attribute
    pub chunk_id: String,
    pub display_text: String,
    /// Byte range of the whole marker in the scanned text
    pub range: Range<usize>,
}

/// All well-formed markers in `text`, in order of appearance
pub fn find_markers(text: &str) -> Vec<CitationMarker> {
    MARKER.captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(CitationMarker {
                chunk_id: unescape_attr(caps.get(1)?.as_str()),
                display_text: caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
                range: whole.range(),
            })
        })
        .collect()
}

/// Length of the well-formed marker starting at the beginning of `text`
pub fn complete_marker_len(text: &str) -> Option<usize> {
    COMPLETE_MARKER.find(text).map(|m| m.end())
}

/// Collapse whitespace and cap at `max_chars`, ending with "..." when cut.
/// Caps too small to hold the ellipsis cut without one.
pub fn excerpt(content: &str, max_chars: usize) -> String {
    let collapsed = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    if max_chars <= 3 {
        return collapsed.chars().take(max_chars).collect();
    }

    let keep = max_chars.saturating_sub(3);
    let mut cut: String = collapsed.chars().take(keep).collect();
    cut.truncate(cut.trim_end().len());
    cut.push_str("...");
    cut
}

/// Escape a value for use inside a double-quoted attribute
pub fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Inverse of `escape_attr`
pub fn unescape_attr(value: &str) -> String {
    value.replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Remove citation tags that are not well-formed.
///
/// Well-formed markers are kept verbatim. A malformed opening tag is dropped
/// up to its `</citation>` (or up to the next opening tag, whichever comes
/// first); one that is never closed truncates the text, as streaming does.
pub fn strip_malformed(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find(CITATION_OPEN) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if let Some(len) = complete_marker_len(tail) {
            out.push_str(&tail[..len]);
            rest = &tail[len..];
            continue;
        }

        let next_open = tail[CITATION_OPEN.len()..].find(CITATION_OPEN)
            .map(|i| i + CITATION_OPEN.len());
        let next_close = tail.find(CITATION_CLOSE);

        rest = match (next_open, next_close) {
            (Some(open), Some(close)) if open < close => &tail[open..],
            (_, Some(close)) => &tail[close + CITATION_CLOSE.len()..],
            (Some(open), None) => &tail[open..],
            (None, None) => "",
        };
    }

    out.push_str(rest);
    out
}
