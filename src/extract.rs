//! Page-range extraction.
//!
//! The whole document is the concatenation of all page texts in page
//! order, joined by [`PAGE_SEPARATOR`]. Every offset in this crate is an
//! absolute char offset into that concatenation.

use crate::{
    error::{Error, Result},
    material::{PageText, TocSection},
};

/// Separator placed between consecutive pages.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Length of [`PAGE_SEPARATOR`] in chars.
pub const PAGE_SEPARATOR_LEN: usize = 2;

#[derive(Debug, Clone)]
struct PageEntry {
    page_number: u32,
    offset: usize,
    len: usize,
}

/// Absolute char offsets of every supplied page.
#[derive(Debug, Clone)]
pub struct PageLayout {
    pages: Vec<PageText>,
    entries: Vec<PageEntry>,
}

impl PageLayout {
    /// Build the layout. Pages are ordered by page number.
    pub fn new(mut pages: Vec<PageText>) -> Self {
        pages.sort_by_key(|p| p.page_number);

        let mut offset = 0;
        let entries = pages
            .iter()
            .map(|page| {
                let len = page.text.chars().count();
                let entry = PageEntry {
                    page_number: page.page_number,
                    offset,
                    len,
                };
                offset += len + PAGE_SEPARATOR_LEN;
                entry
            })
            .collect();

        Self { pages, entries }
    }

    pub fn pages(&self) -> &[PageText] {
        &self.pages
    }

    /// Total length of the concatenated document in chars.
    pub fn total_len(&self) -> usize {
        self.entries
            .last()
            .map(|e| e.offset + e.len)
            .unwrap_or_default()
    }

    /// Absolute offset where `page_number` starts: the sum of
    /// `len + separator` over every page before it.
    pub fn page_offset(&self, page_number: u32) -> usize {
        self.entries
            .iter()
            .take_while(|e| e.page_number < page_number)
            .map(|e| e.len + PAGE_SEPARATOR_LEN)
            .sum()
    }

    /// The page containing the absolute offset. Offsets that fall on a
    /// separator belong to the preceding page.
    pub fn page_at(&self, offset: usize) -> Option<u32> {
        let idx = self.entries.partition_point(|e| e.offset <= offset);
        idx.checked_sub(1).map(|i| self.entries[i].page_number)
    }
}

/// Content of a TOC section's declared page range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRange {
    /// Trimmed concatenation of the pages in range.
    pub content: String,
    /// Absolute offset of the first char of `content`.
    pub char_start: usize,
    /// Absolute offset one past the last char of `content`.
    pub char_end: usize,
    /// First page actually present in the range.
    pub first_page: u32,
    /// Last page actually present in the range.
    pub last_page: u32,
}

impl ExtractedRange {
    pub fn len(&self) -> usize {
        self.char_end - self.char_start
    }

    pub fn is_empty(&self) -> bool {
        self.char_start == self.char_end
    }
}

/// Concatenate all pages whose number lies in `[page_start, page_end]`.
///
/// Fails with [`Error::MissingPages`] when no supplied page falls inside
/// the range.
pub fn extract_section(
    toc: &TocSection,
    layout: &PageLayout,
) -> Result<ExtractedRange> {
    let in_range: Vec<(&PageText, &PageEntry)> = layout
        .pages
        .iter()
        .zip(&layout.entries)
        .filter(|(page, _)| {
            page.page_number >= toc.page_start
                && page.page_number <= toc.page_end
        })
        .collect();

    let (Some((_, first)), Some((_, last))) = (in_range.first(), in_range.last())
    else {
        return Err(Error::MissingPages {
            title: toc.title.clone(),
            page_start: toc.page_start,
            page_end: toc.page_end,
        });
    };

    let raw = in_range
        .iter()
        .map(|(page, _)| page.text.as_str())
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR);

    let leading = raw.chars().take_while(|c| c.is_whitespace()).count();
    let content = raw.trim().to_string();
    let char_start = first.offset + leading;
    let char_end = char_start + content.chars().count();

    Ok(ExtractedRange {
        content,
        char_start,
        char_end,
        first_page: first.page_number,
        last_page: last.page_number,
    })
}
