/// Default length of a content preview in chars.
pub const DEFAULT_PREVIEW_LEN: usize = 200;

/// Chars of left context kept before the first query-word occurrence.
pub const PREVIEW_LEFT_CONTEXT: usize = 50;

/// Query words of this many chars or fewer are ignored.
const MIN_SIGNIFICANT_WORD_CHARS: usize = 2;

pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Slice `s` by char positions, clamping both ends to the string length.
pub fn char_slice(s: &str, start: usize, end: usize) -> &str {
    let mut indices = s.char_indices().map(|(i, _)| i).chain([s.len()]);
    let start_byte = indices.clone().nth(start).unwrap_or(s.len());
    let end_byte = indices.nth(end.max(start)).unwrap_or(s.len());
    &s[start_byte..end_byte]
}

/// Lowercase char by char so the result has exactly as many chars as the
/// input and char offsets stay valid in both.
pub fn fold_case(s: &str) -> String {
    s.chars().map(fold_char).collect()
}

pub fn fold_char(c: char) -> char {
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(l), None) => l,
        _ => c,
    }
}

/// Char offset of the first occurrence of `needle` in `haystack`.
/// Both are expected to be case-folded already.
pub fn find_char_offset(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    haystack
        .find(needle)
        .map(|byte| haystack[..byte].chars().count())
}

/// Distinct, case-folded query words longer than two chars, in query
/// order. Surrounding punctuation is stripped.
pub fn significant_words(query: &str) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    for raw in query.split_whitespace() {
        let word = fold_case(raw.trim_matches(|c: char| !c.is_alphanumeric()));
        if char_len(&word) > MIN_SIGNIFICANT_WORD_CHARS && !words.contains(&word)
        {
            words.push(word);
        }
    }
    words
}

/// Build a preview of `content` around the first occurrence of any
/// significant query word.
///
/// The window starts [`PREVIEW_LEFT_CONTEXT`] chars before the match and
/// spans `preview_len` chars. `"..."` marks truncation at either end. When
/// no query word occurs, the head of the content is used.
pub fn content_preview(content: &str, query: &str, preview_len: usize) -> String {
    let total = char_len(content);
    if total <= preview_len {
        return content.to_string();
    }

    let folded = fold_case(content);
    let first_hit = significant_words(query)
        .iter()
        .filter_map(|w| find_char_offset(&folded, w))
        .min();

    let start = first_hit
        .map(|pos| pos.saturating_sub(PREVIEW_LEFT_CONTEXT))
        .unwrap_or(0)
        .min(total.saturating_sub(preview_len));
    let end = (start + preview_len).min(total);

    let mut preview = String::new();
    if start > 0 {
        preview.push_str("...");
    }
    preview.push_str(char_slice(content, start, end));
    if end < total {
        preview.push_str("...");
    }
    preview
}
