//! Size enforcement for section content.
//!
//! Two independent limits apply. The embedding ceiling is hard: content
//! above it is cut into sequential parts whose concatenation reproduces
//! the input exactly. The chunk size is soft: parts are regrouped into
//! paragraph-aligned chunks for fine-grained retrieval.
//!
//! All sizes and offsets are in chars.

/// Hard ceiling on the content of one embedding-safe part.
pub const DEFAULT_EMBED_CEILING: usize = 10_000;

/// Soft ceiling on the content of one chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 2_000;

/// Upper bound on parts per section. Content past it is dropped.
pub const DEFAULT_MAX_PARTS: usize = 50;

/// Sections with less content than this are not persisted.
pub const DEFAULT_MIN_SECTION_CHARS: usize = 50;

/// Fraction of a prospective part, counted back from the ceiling, that is
/// searched for a natural cut point.
pub const DEFAULT_CUT_WINDOW: f64 = 0.3;

/// Separator between paragraphs.
const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Size limits applied to section content.
///
/// # Examples
///
/// ```
/// use docsect::chunking::{ChunkingConfig, DEFAULT_EMBED_CEILING};
///
/// let config = ChunkingConfig::default();
/// assert_eq!(config.embed_ceiling, DEFAULT_EMBED_CEILING);
/// assert!(config.chunk_size < config.embed_ceiling);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkingConfig {
    /// Maximum part size in chars.
    pub embed_ceiling: usize,
    /// Target chunk size in chars.
    pub chunk_size: usize,
    /// Maximum number of parts per section.
    pub max_parts: usize,
    /// Minimum section content length in chars.
    pub min_section_chars: usize,
    /// Backward search window for cut points, as a fraction of the ceiling.
    pub cut_window: f64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            embed_ceiling: DEFAULT_EMBED_CEILING,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_parts: DEFAULT_MAX_PARTS,
            min_section_chars: DEFAULT_MIN_SECTION_CHARS,
            cut_window: DEFAULT_CUT_WINDOW,
        }
    }
}

/// A `[start, end)` char range of section content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartSpan {
    pub start: usize,
    pub end: usize,
}

impl PartSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Cut `content` into embedding-safe parts.
///
/// Content within the ceiling yields one span covering all of it. Longer
/// content is cut repeatedly; each cut point is searched backward from the
/// ceiling within the last `cut_window` of the prospective part, preferring
/// a paragraph break, then a sentence end, then a line break, and falling
/// back to the ceiling itself.
///
/// # Examples
///
/// ```
/// use docsect::chunking::{split_embedding_parts, ChunkingConfig};
///
/// let config = ChunkingConfig { embed_ceiling: 10, ..Default::default() };
/// let spans = split_embedding_parts("aaaa. bbbbbbbbbbbbb", &config);
/// assert_eq!(spans.len(), 2);
/// assert!(spans.iter().all(|s| s.len() <= 10));
/// ```
pub fn split_embedding_parts(
    content: &str,
    config: &ChunkingConfig,
) -> Vec<PartSpan> {
    let chars: Vec<char> = content.chars().collect();
    let total = chars.len();
    let ceiling = config.embed_ceiling.max(1);
    let window = ((ceiling as f64) * config.cut_window).floor() as usize;

    let mut spans = Vec::new();
    let mut pos = 0;

    while pos < total || spans.is_empty() {
        if spans.len() == config.max_parts.max(1) {
            tracing::warn!(
                parts = spans.len(),
                dropped_chars = total - pos,
                "section exceeds part limit, truncating"
            );
            break;
        }
        if total - pos <= ceiling {
            spans.push(PartSpan {
                start: pos,
                end: total,
            });
            break;
        }

        let limit = pos + ceiling;
        let window_start = limit.saturating_sub(window).max(pos + 1);
        let cut = find_cut_point(&chars, window_start, limit).unwrap_or(limit);

        spans.push(PartSpan {
            start: pos,
            end: cut,
        });
        pos = cut;
    }

    spans
}

/// Best cut in `chars[window_start..limit]`, as the offset where the next
/// part begins.
fn find_cut_point(
    chars: &[char],
    window_start: usize,
    limit: usize,
) -> Option<usize> {
    let last_before = |pred: &dyn Fn(usize) -> bool, tail: usize| {
        (window_start..limit.saturating_sub(tail))
            .rev()
            .find(|&i| pred(i))
    };

    last_before(&|i| chars[i] == '\n' && chars[i + 1] == '\n', 1)
        .map(|i| i + 2)
        .or_else(|| {
            last_before(
                &|i| chars[i] == '.' && chars[i + 1].is_whitespace(),
                1,
            )
            .map(|i| i + 1)
        })
        .or_else(|| last_before(&|i| chars[i] == '\n', 0).map(|i| i + 1))
}

/// A paragraph-aligned chunk of section content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParagraphChunk {
    /// Trimmed paragraphs joined by a blank line.
    pub text: String,
    /// Offset of the first char of the first paragraph.
    pub start: usize,
    /// Offset one past the last char of the last paragraph.
    pub end: usize,
}

/// Regroup `content` into chunks of whole paragraphs.
///
/// Paragraphs (separated by a blank line) are trimmed and accumulated
/// until adding the next one would exceed `chunk_size`; the accumulation
/// is then flushed. A paragraph larger than `chunk_size` becomes a chunk on
/// its own. Whitespace-only paragraphs are skipped.
///
/// # Examples
///
/// ```
/// use docsect::chunking::chunk_paragraphs;
///
/// let chunks = chunk_paragraphs("one\n\ntwo\n\nthree", 8);
/// let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
/// assert_eq!(texts, ["one\n\ntwo", "three"]);
/// ```
pub fn chunk_paragraphs(content: &str, chunk_size: usize) -> Vec<ParagraphChunk> {
    let mut chunks = Vec::new();
    let mut current: Option<ParagraphChunk> = None;
    let mut current_len = 0;

    for (start, end, text) in paragraphs(content) {
        let len = end - start;
        if let Some(chunk) = current.as_mut() {
            if current_len + PARAGRAPH_SEPARATOR.len() + len <= chunk_size {
                chunk.text.push_str(PARAGRAPH_SEPARATOR);
                chunk.text.push_str(text);
                chunk.end = end;
                current_len += PARAGRAPH_SEPARATOR.len() + len;
                continue;
            }
            chunks.extend(current.take());
        }
        current = Some(ParagraphChunk {
            text: text.to_string(),
            start,
            end,
        });
        current_len = len;
    }

    chunks.extend(current);
    chunks
}

/// Trimmed, non-empty paragraphs with their char ranges.
fn paragraphs(content: &str) -> Vec<(usize, usize, &str)> {
    let mut result = Vec::new();
    let mut offset = 0;

    for piece in content.split(PARAGRAPH_SEPARATOR) {
        let piece_len = piece.chars().count();
        let text = piece.trim();
        if !text.is_empty() {
            let leading = piece.chars().take_while(|c| c.is_whitespace()).count();
            let start = offset + leading;
            result.push((start, start + text.chars().count(), text));
        }
        offset += piece_len + PARAGRAPH_SEPARATOR.len();
    }

    result
}
