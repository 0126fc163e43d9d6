//! Page Segmentation
//!
//! Splits extracted page text into fixed-width overlapping windows.
//! Positions are character offsets (Unicode scalar values) into the
//! original page text, half-open: `start_index..end_index`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Default window width in characters
pub const DEFAULT_WINDOW_SIZE: usize = 1000;

/// Default number of characters shared by consecutive windows
pub const DEFAULT_OVERLAP: usize = 150;

/// Maximum page length (chars) accepted for segmentation.
const MAX_PAGE_CHARS: usize = 2_000_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SegmentError {
    #[error("Window size must be greater than 0")]
    ZeroWindow,
    #[error("Overlap {overlap} must be less than window size {window_size}")]
    OverlapTooLarge { overlap: usize, window_size: usize },
    #[error("Page numbers are 1-based, got 0")]
    InvalidPage,
    #[error("Page too large: {0} chars (max {1} chars)")]
    PageTooLarge(usize, usize),
}

impl Serialize for SegmentError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Window geometry shared by every page of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentConfig {
    pub window_size: usize,
    pub overlap: usize,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

impl SegmentConfig {
    pub fn new(window_size: usize, overlap: usize) -> Result<Self, SegmentError> {
        let config = Self { window_size, overlap };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SegmentError> {
        if self.window_size == 0 {
            return Err(SegmentError::ZeroWindow);
        }
        if self.overlap >= self.window_size {
            return Err(SegmentError::OverlapTooLarge {
                overlap: self.overlap,
                window_size: self.window_size,
            });
        }
        Ok(())
    }

    /// Distance between the starts of consecutive windows
    pub fn step(&self) -> usize {
        self.window_size - self.overlap
    }
}

/// A window of page text, before it is given an id and an owning file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    /// Window text, including the overlap shared with the previous window
    pub content: String,
    /// 1-based page number
    pub page: u32,
    /// Start position in the page text (chars)
    pub start_index: usize,
    /// End position in the page text (chars, exclusive)
    pub end_index: usize,
}

/// Page-level text produced by extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedPage {
    /// 1-based page number
    pub page: u32,
    pub text: String,
}

/// A page that could not be segmented
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageFailure {
    pub page: u32,
    pub error: SegmentError,
}

/// Segments for a whole document, plus the pages that were skipped
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentedPages {
    pub segments: Vec<Segment>,
    pub failures: Vec<PageFailure>,
}

/// Split one page into overlapping windows.
///
/// Every window except the last is exactly `window_size` chars and starts
/// `window_size - overlap` chars after its predecessor. Text no longer than
/// one window (including empty text) yields a single window covering it.
pub fn segment(page_text: &str, page: u32, config: &SegmentConfig) -> Result<Vec<Segment>, SegmentError> {
    config.validate()?;
    if page == 0 {
        return Err(SegmentError::InvalidPage);
    }

    // Byte offset of every char boundary, including the end of the text
    let boundaries: Vec<usize> = page_text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(page_text.len()))
        .collect();
    let total = boundaries.len() - 1;

    if total > MAX_PAGE_CHARS {
        return Err(SegmentError::PageTooLarge(total, MAX_PAGE_CHARS));
    }

    if total <= config.window_size {
        return Ok(vec![Segment {
            content: page_text.to_string(),
            page,
            start_index: 0,
            end_index: total,
        }]);
    }

    let step = config.step();
    let mut segments = Vec::with_capacity(total / step + 1);
    let mut start = 0usize;

    loop {
        let end = (start + config.window_size).min(total);
        segments.push(Segment {
            content: page_text[boundaries[start]..boundaries[end]].to_string(),
            page,
            start_index: start,
            end_index: end,
        });
        if end == total {
            break;
        }
        start += step;
    }

    debug!(page = page, chars = total, segments = segments.len(), "Segmented page");
    Ok(segments)
}

/// Segment every page of a document.
///
/// A page that fails is logged and contributes no segments; the remaining
/// pages are still segmented.
pub fn segment_pages(pages: &[ExtractedPage], config: &SegmentConfig) -> SegmentedPages {
    let mut result = SegmentedPages::default();

    for page in pages {
        match segment(&page.text, page.page, config) {
            Ok(segments) => result.segments.extend(segments),
            Err(e) => {
                warn!(page = page.page, error = %e, "Page segmentation failed, skipping page");
                result.failures.push(PageFailure { page: page.page, error: e });
            }
        }
    }

    result
}

/// Split a text file into pages on form feeds (the usual page break of
/// text extractors). Pages are numbered from 1.
pub fn split_form_feeds(text: &str) -> Vec<ExtractedPage> {
    text.split('\x0c')
        .enumerate()
        .map(|(i, page)| ExtractedPage {
            page: i as u32 + 1,
            text: page.to_string(),
        })
        .collect()
}
