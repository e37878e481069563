//! Deterministic title matchers used to locate section boundaries inside
//! noisy page text.
//!
//! Each [`MatchStrategy`] is a pure function of (haystack, title, start
//! offset). [`find_title`] tries them in order and returns the first hit.
//! All offsets are char offsets into the haystack.

use regex::RegexBuilder;

use crate::text_util::{fold_case, fold_char};

/// Titles shorter than this (whitespace excluded) never use edit-distance
/// matching; short titles produce too many spurious hits.
const MIN_FUZZY_TITLE_CHARS: usize = 8;

/// One allowed edit per this many title chars.
const CHARS_PER_EDIT: usize = 8;

/// Strip a leading section number such as `"1.2.3 "` or `"5.1. "` and
/// collapse whitespace runs.
///
/// ```
/// use docsect::title_match::normalize_title;
///
/// assert_eq!(normalize_title("5.1 Hardver"), "Hardver");
/// assert_eq!(normalize_title("  2.3.  Operativni   sistemi "), "Operativni sistemi");
/// assert_eq!(normalize_title("Uvod"), "Uvod");
/// ```
pub fn normalize_title(title: &str) -> String {
    let trimmed = title.trim_start();
    let rest = match split_numeric_prefix(trimmed) {
        Some((_, rest)) => rest,
        None => trimmed,
    };
    rest.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The section number of a title, without a trailing dot
/// (`"5.1. Hardver"` gives `"5.1"`).
pub fn numeric_prefix(title: &str) -> Option<String> {
    split_numeric_prefix(title.trim_start())
        .map(|(prefix, _)| prefix.trim_end_matches('.').to_string())
}

/// Split `"5.1. rest"` into `("5.1.", "rest")`. The prefix must be digit
/// groups separated by single dots and be followed by whitespace.
fn split_numeric_prefix(title: &str) -> Option<(&str, &str)> {
    let end = title
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(title.len());
    let prefix = &title[..end];
    let rest = &title[end..];

    let valid = !prefix.is_empty()
        && prefix.starts_with(|c: char| c.is_ascii_digit())
        && !prefix.contains("..")
        && rest.starts_with(char::is_whitespace);

    valid.then(|| (prefix, rest.trim_start()))
}

/// A located title: `[start, end)` in haystack chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TitleMatch {
    pub start: usize,
    pub end: usize,
    pub strategy: MatchStrategy,
}

/// Title matchers, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchStrategy {
    /// Case-insensitive exact substring.
    Exact,
    /// Exact match after removing all whitespace from both sides. Covers
    /// every spacing variant of the title (inserted, doubled, removed or
    /// letter-by-letter spacing).
    SpaceInsensitive,
    /// Regex allowing whitespace, hyphens and soft hyphens between every
    /// title char, for titles broken across lines.
    FlexibleWhitespace,
    /// Approximate substring match over whitespace-free text with a small
    /// edit budget, for OCR substitutions.
    BoundedEditDistance,
}

impl MatchStrategy {
    pub const ALL: [MatchStrategy; 4] = [
        MatchStrategy::Exact,
        MatchStrategy::SpaceInsensitive,
        MatchStrategy::FlexibleWhitespace,
        MatchStrategy::BoundedEditDistance,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MatchStrategy::Exact => "exact",
            MatchStrategy::SpaceInsensitive => "space-insensitive",
            MatchStrategy::FlexibleWhitespace => "flexible-whitespace",
            MatchStrategy::BoundedEditDistance => "edit-distance",
        }
    }

    /// Find `title` in `haystack` at or after char offset `from`.
    pub fn find(
        self,
        haystack: &Haystack<'_>,
        title: &str,
        from: usize,
    ) -> Option<TitleMatch> {
        let (start, end) = match self {
            MatchStrategy::Exact => haystack.find_exact(title, from),
            MatchStrategy::SpaceInsensitive => {
                haystack.find_space_insensitive(title, from)
            }
            MatchStrategy::FlexibleWhitespace => {
                haystack.find_flexible(title, from)
            }
            MatchStrategy::BoundedEditDistance => {
                haystack.find_edit_distance(title, from)
            }
        }?;
        Some(TitleMatch {
            start,
            end,
            strategy: self,
        })
    }
}

impl std::fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Try every strategy in order; the first hit wins.
pub fn find_title(
    haystack: &Haystack<'_>,
    title: &str,
    from: usize,
) -> Option<TitleMatch> {
    if title.trim().is_empty() {
        return None;
    }
    MatchStrategy::ALL
        .iter()
        .find_map(|strategy| strategy.find(haystack, title, from))
}

/// Widen `found` backwards over the section number printed in front of
/// the title, so `"5.1 Hardver"` is matched whole when the search used the
/// normalized `"Hardver"`. The widened start never moves below `floor`.
///
/// The number must stand on its own: it may be followed by a dot and
/// whitespace, and must not be the tail of a longer number or word.
///
/// ```
/// use docsect::title_match::{Haystack, find_title, include_number};
///
/// let haystack = Haystack::new("kraj.\n5.1 Hardver\ntekst");
/// let found = find_title(&haystack, "Hardver", 0).unwrap();
/// assert_eq!(include_number(&haystack, found, "5.1", 0).start, 6);
/// assert_eq!(include_number(&haystack, found, "1", 0).start, found.start);
/// ```
pub fn include_number(
    haystack: &Haystack<'_>,
    found: TitleMatch,
    number: &str,
    floor: usize,
) -> TitleMatch {
    let number = number.trim().trim_end_matches('.');
    if number.is_empty() || floor >= found.start || found.start > haystack.len()
    {
        return found;
    }

    let before = &haystack.text
        [haystack.text_bytes[floor]..haystack.text_bytes[found.start]];
    let head = before.trim_end();
    let head = head.strip_suffix('.').unwrap_or(head);
    let Some(rest) = head.strip_suffix(number) else {
        return found;
    };
    if rest.ends_with(|c: char| c.is_alphanumeric() || c == '.') {
        return found;
    }

    TitleMatch {
        start: floor + rest.chars().count(),
        ..found
    }
}

/// Text prepared once for repeated title searches.
#[derive(Debug)]
pub struct Haystack<'a> {
    text: &'a str,
    /// Byte offset of every char of `text`, plus `text.len()`.
    text_bytes: Vec<usize>,
    folded: String,
    folded_bytes: Vec<usize>,
    /// Case-folded non-whitespace chars.
    compact: Vec<char>,
    compact_str: String,
    compact_bytes: Vec<usize>,
    /// Haystack char offset of every compact char.
    compact_pos: Vec<usize>,
}

impl<'a> Haystack<'a> {
    pub fn new(text: &'a str) -> Self {
        let folded = fold_case(text);

        let mut compact = Vec::new();
        let mut compact_pos = Vec::new();
        for (i, c) in folded.chars().enumerate() {
            if !c.is_whitespace() {
                compact.push(c);
                compact_pos.push(i);
            }
        }
        let compact_str: String = compact.iter().collect();

        Self {
            text,
            text_bytes: byte_offsets(text),
            folded_bytes: byte_offsets(&folded),
            folded,
            compact_bytes: byte_offsets(&compact_str),
            compact,
            compact_str,
            compact_pos,
        }
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    /// Length in chars.
    pub fn len(&self) -> usize {
        self.text_bytes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find_exact(&self, title: &str, from: usize) -> Option<(usize, usize)> {
        let needle = fold_case(title.trim());
        if needle.is_empty() || from > self.len() {
            return None;
        }
        let from_byte = self.folded_bytes[from];
        let byte = self.folded[from_byte..].find(&needle)? + from_byte;
        let start = char_at_byte(&self.folded_bytes, byte);
        Some((start, start + needle.chars().count()))
    }

    fn find_space_insensitive(
        &self,
        title: &str,
        from: usize,
    ) -> Option<(usize, usize)> {
        let needle: String = compact_chars(title).into_iter().collect();
        if needle.is_empty() {
            return None;
        }
        let from_compact = self.compact_pos.partition_point(|&p| p < from);
        let from_byte = self.compact_bytes[from_compact];
        let byte = self.compact_str[from_byte..].find(&needle)? + from_byte;
        let start = char_at_byte(&self.compact_bytes, byte);
        Some(self.compact_span(start, start + needle.chars().count()))
    }

    fn find_flexible(&self, title: &str, from: usize) -> Option<(usize, usize)> {
        let pattern = title
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| regex::escape(&c.to_string()))
            .collect::<Vec<_>>()
            .join(r"(?:\s|-|\x{AD})*");
        if pattern.is_empty() || from > self.len() {
            return None;
        }

        let re = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .ok()?;
        let found = re.find_at(self.text, self.text_bytes[from])?;
        Some((
            char_at_byte(&self.text_bytes, found.start()),
            char_at_byte(&self.text_bytes, found.end()),
        ))
    }

    /// Sellers' approximate substring search: the pattern may start at any
    /// text position, so row zero costs nothing. Each cell carries the
    /// compact offset where its alignment began.
    fn find_edit_distance(
        &self,
        title: &str,
        from: usize,
    ) -> Option<(usize, usize)> {
        let pattern = compact_chars(title);
        let m = pattern.len();
        if m < MIN_FUZZY_TITLE_CHARS {
            return None;
        }
        let budget = (m / CHARS_PER_EDIT).max(1);

        let from_compact = self.compact_pos.partition_point(|&p| p < from);
        let text = &self.compact[from_compact..];

        // (cost, start) for rows 0..=m of the previous column.
        let mut prev: Vec<(usize, usize)> = (0..=m).map(|i| (i, 0)).collect();
        let mut best: Option<(usize, usize, usize)> = None;

        for (j, &tc) in text.iter().enumerate() {
            let mut cur = Vec::with_capacity(m + 1);
            cur.push((0, j + 1));
            for i in 1..=m {
                let substitution = usize::from(pattern[i - 1] != tc);
                let diag = (prev[i - 1].0 + substitution, prev[i - 1].1);
                let skip_text = (prev[i].0 + 1, prev[i].1);
                let skip_title = (cur[i - 1].0 + 1, cur[i - 1].1);

                let mut cell = diag;
                if skip_text.0 < cell.0 {
                    cell = skip_text;
                }
                if skip_title.0 < cell.0 {
                    cell = skip_title;
                }
                cur.push(cell);
            }

            let (cost, start) = cur[m];
            if cost <= budget {
                match best {
                    Some((c, s, e)) if cost == c && start == s && e == j => {
                        // Same alignment absorbing one more char.
                        best = Some((c, s, j + 1));
                    }
                    Some((c, _, _)) if cost >= c => {}
                    _ => best = Some((cost, start, j + 1)),
                }
                if cost == 0 {
                    break;
                }
            }
            prev = cur;
        }

        let (_, start, end) = best?;
        if start >= end {
            return None;
        }
        Some(self.compact_span(from_compact + start, from_compact + end))
    }

    /// Map a compact `[start, end)` range back to haystack chars.
    fn compact_span(&self, start: usize, end: usize) -> (usize, usize) {
        (self.compact_pos[start], self.compact_pos[end - 1] + 1)
    }
}

fn compact_chars(title: &str) -> Vec<char> {
    title
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(fold_char)
        .collect()
}

fn byte_offsets(s: &str) -> Vec<usize> {
    s.char_indices().map(|(i, _)| i).chain([s.len()]).collect()
}

fn char_at_byte(offsets: &[usize], byte: usize) -> usize {
    offsets.partition_point(|&b| b < byte)
}
