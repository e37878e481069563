//! Boundary refinement: narrow a page-range section to the text between
//! its own title and the next section's title.

use crate::{
    extract::{ExtractedRange, PageLayout},
    text_util::{char_len, char_slice},
    title_match::{
        Haystack,
        MatchStrategy,
        TitleMatch,
        find_title,
        include_number,
    },
};

/// Why a section kept its unrefined page-range content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnrefinedReason {
    EmptyTitle,
    StartNotFound,
    TooShort { len: usize },
}

impl std::fmt::Display for UnrefinedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnrefinedReason::EmptyTitle => f.write_str("empty title"),
            UnrefinedReason::StartNotFound => {
                f.write_str("title not found in page range")
            }
            UnrefinedReason::TooShort { len } => {
                write!(f, "refined content too short ({len} chars)")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefineOutcome {
    Refined {
        range: ExtractedRange,
        start_strategy: MatchStrategy,
        /// `None` when the section runs to the end of its page range.
        end_strategy: Option<MatchStrategy>,
    },
    Unrefined(UnrefinedReason),
}

/// Where to look for a section's boundaries.
#[derive(Debug, Clone, Copy)]
pub struct RefineTarget<'a> {
    /// Normalized title of the section being refined.
    pub title: &'a str,
    /// Section number printed before the title, e.g. `"5.1"`.
    pub number: Option<&'a str>,
    /// Normalized title of the following TOC section.
    pub next_title: Option<&'a str>,
    /// Section number of the following TOC section.
    pub next_number: Option<&'a str>,
    /// Absolute offset where text not yet attributed to an earlier
    /// section begins.
    pub search_from: usize,
}

/// Refine `range` to start at its title and end before the next title.
/// Section numbers printed in front of either title belong to that title.
///
/// Only text inside `range` is searched. Results shorter than
/// `min_chars` after trimming are rejected.
pub fn refine_section(
    range: &ExtractedRange,
    layout: &PageLayout,
    target: RefineTarget<'_>,
    min_chars: usize,
) -> RefineOutcome {
    if target.title.trim().is_empty() {
        return RefineOutcome::Unrefined(UnrefinedReason::EmptyTitle);
    }

    let haystack = Haystack::new(&range.content);
    let from = if target.search_from > range.char_start
        && target.search_from < range.char_end
    {
        target.search_from - range.char_start
    } else {
        0
    };

    let Some(start) = find_title(&haystack, target.title, from) else {
        return RefineOutcome::Unrefined(UnrefinedReason::StartNotFound);
    };
    let start = widen(&haystack, start, target.number, from);

    let end = target.next_title.and_then(|next| {
        find_title(&haystack, next, start.end)
            .map(|m| widen(&haystack, m, target.next_number, start.end))
    });
    let end_offset = end.map_or(haystack.len(), |m| m.start);

    let raw = char_slice(&range.content, start.start, end_offset);
    let leading = raw.chars().take_while(|c| c.is_whitespace()).count();
    let content = raw.trim();
    let len = char_len(content);
    if len < min_chars {
        return RefineOutcome::Unrefined(UnrefinedReason::TooShort { len });
    }

    let char_start = range.char_start + start.start + leading;
    let char_end = char_start + len;
    let first_page = layout.page_at(char_start).unwrap_or(range.first_page);
    let last_page = layout
        .page_at(char_end.saturating_sub(1))
        .unwrap_or(range.last_page);

    RefineOutcome::Refined {
        range: ExtractedRange {
            content: content.to_string(),
            char_start,
            char_end,
            first_page,
            last_page,
        },
        start_strategy: start.strategy,
        end_strategy: end.map(|m| m.strategy),
    }
}

fn widen(
    haystack: &Haystack<'_>,
    found: TitleMatch,
    number: Option<&str>,
    floor: usize,
) -> TitleMatch {
    match number {
        Some(number) => include_number(haystack, found, number, floor),
        None => found,
    }
}
