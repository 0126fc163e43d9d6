//! Streaming-safe truncation.
//!
//! While an answer streams in, the accumulated text may end partway through
//! a citation marker. Only the prefix that cannot turn out to be the start of
//! a marker is shown, so a partial tag never reaches the reader and shown
//! text never has to be taken back.

use super::markers::{complete_marker_len, CITATION_OPEN};

/// Longest prefix of `text` that is safe to display.
///
/// A trailing opening tag without its closing tag is cut, as is any trailing
/// fragment that could still grow into `<citation`.
pub fn safe_prefix(text: &str) -> &str {
    let text = withhold_partial_opener(text);

    match text.rfind(CITATION_OPEN) {
        Some(pos) if complete_marker_len(&text[pos..]).is_none() => &text[..pos],
        _ => text,
    }
}

/// Drop a trailing proper prefix of `<citation`, e.g. `"... <cit"`
fn withhold_partial_opener(text: &str) -> &str {
    for k in (1..CITATION_OPEN.len()).rev() {
        if text.ends_with(&CITATION_OPEN[..k]) {
            return &text[..text.len() - k];
        }
    }
    text
}

/// Accumulates streamed fragments and hands out only the newly safe text
#[derive(Debug, Default)]
pub struct CitationStream {
    buffer: String,
    emitted: usize,
}

impl CitationStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment; returns text that became safe to show, if any
    pub fn push(&mut self, fragment: &str) -> Option<&str> {
        self.buffer.push_str(fragment);
        let safe = safe_prefix(&self.buffer).len();
        if safe <= self.emitted {
            return None;
        }

        let start = self.emitted;
        self.emitted = safe;
        Some(&self.buffer[start..safe])
    }

    /// Everything shown so far
    pub fn visible(&self) -> &str {
        &self.buffer[..self.emitted]
    }

    /// The full received text, for post-processing once the stream ends
    pub fn finish(self) -> String {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANSWER: &str = concat!(
        "Revenue grew <citation chunk-id=\"c1\">here</citation> while ",
        "costs fell <citation chunk-id=\"c2\" ordinal=\"2\" page=\"4\">[2]</citation>.",
    );

    #[test]
    fn test_unclosed_marker_is_withheld() {
        assert_eq!(safe_prefix(r#"See source <citation chunk-id="c1""#), "See source ");
        assert_eq!(safe_prefix(r#"See source <citation chunk-id="c1">text"#), "See source ");
    }

    #[test]
    fn test_partial_opener_is_withheld() {
        assert_eq!(safe_prefix("See <"), "See ");
        assert_eq!(safe_prefix("See <cit"), "See ");
        assert_eq!(safe_prefix("See <b>"), "See <b>");
    }

    #[test]
    fn test_complete_text_passes_through() {
        assert_eq!(safe_prefix(ANSWER), ANSWER);
        assert_eq!(safe_prefix("plain text"), "plain text");
        assert_eq!(safe_prefix(""), "");
    }

    #[test]
    fn test_every_prefix_shows_only_whole_markers() {
        let boundaries: Vec<usize> = ANSWER.char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(ANSWER.len()))
            .collect();

        let mut previous = "";
        for &end in &boundaries {
            let shown = safe_prefix(&ANSWER[..end]);

            assert!(shown.starts_with(previous), "shown text shrank at {}", end);
            assert_eq!(
                shown.matches("<citation").count(),
                shown.matches("</citation>").count(),
                "partial marker shown at {}: {:?}",
                end,
                shown
            );
            assert!(!shown.ends_with('<'));
            previous = shown;
        }
        assert_eq!(previous, ANSWER);
    }

    #[test]
    fn test_stream_deltas_reassemble_answer() {
        let mut stream = CitationStream::new();
        let mut shown = String::new();

        for fragment in ["Revenue grew <cit", "ation chunk-id=\"c1\">he", "re</citation> while "] {
            if let Some(delta) = stream.push(fragment) {
                assert!(!delta.contains("<cit") || delta.contains("</citation>"));
                shown.push_str(delta);
            }
        }

        assert_eq!(shown, stream.visible());
        assert_eq!(shown, "Revenue grew <citation chunk-id=\"c1\">here</citation> while ");
        assert_eq!(stream.finish(), shown);
    }

    #[test]
    fn test_stream_holds_back_until_closed() {
        let mut stream = CitationStream::new();
        assert_eq!(stream.push("Hi "), Some("Hi "));
        assert_eq!(stream.push("<citation chunk-id=\"a\">"), None);
        assert_eq!(stream.visible(), "Hi ");
        assert_eq!(stream.push("x</citation>"), Some("<citation chunk-id=\"a\">x</citation>"));
    }
}
