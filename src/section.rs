//! Assembly of processed sections: identifiers, hierarchical paths,
//! embedding-safe part chains and their chunks.

use serde::{Deserialize, Serialize};

use crate::{
    chunking::{ChunkingConfig, chunk_paragraphs, split_embedding_parts},
    extract::{ExtractedRange, PageLayout},
    ids::SectionId,
    material::TocSection,
    text_util::char_slice,
    title_match::numeric_prefix,
};

/// A retrieval-sized, paragraph-aligned piece of a section part.
///
/// `char_start..char_end` spans the first through last joined paragraph
/// in the material text. `content` rejoins those paragraphs with a single
/// blank line and drops empty ones, so its char count can be smaller than
/// the span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub chunk_id: String,
    pub section_id: String,
    pub title: String,
    pub path: String,
    pub page: u32,
    pub paragraph_idx: usize,
    pub char_start: usize,
    pub char_end: usize,
    pub content: String,
}

/// A section ready for persistence. Oversized sections are a chain: the
/// first part owns the remaining parts in `follow_up_parts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedSection {
    pub section_id: String,
    pub title: String,
    pub clean_title: String,
    pub path: String,
    pub level: u32,
    pub page_start: u32,
    pub page_end: u32,
    pub char_start: usize,
    pub char_end: usize,
    pub content: String,
    pub parent_section_id: Option<String>,
    pub semantic_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub follow_up_parts: Vec<ProcessedSection>,
    #[serde(default)]
    pub chunks: Vec<Chunk>,
}

impl ProcessedSection {
    /// This part followed by its follow-up parts, in document order.
    pub fn parts(&self) -> impl Iterator<Item = &ProcessedSection> {
        std::iter::once(self).chain(self.follow_up_parts.iter())
    }

    pub fn part_count(&self) -> usize {
        1 + self.follow_up_parts.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.parts().map(|p| p.chunks.len()).sum()
    }
}

/// Deepest level honoured when deriving paths from counters.
const MAX_DEPTH: usize = 16;

/// Hierarchical path of every TOC section.
///
/// A numeric title prefix (`"5.1 Hardver"`) is used as is. Otherwise the
/// path comes from per-level counters folded over the TOC in order; a
/// numbered title resets the counters so later unnumbered siblings
/// continue from it.
pub fn section_paths(sections: &[TocSection]) -> Vec<String> {
    let mut counters: Vec<usize> = Vec::new();

    sections
        .iter()
        .map(|section| {
            if let Some(prefix) = numeric_prefix(&section.title) {
                let parsed: Option<Vec<usize>> =
                    prefix.split('.').map(|n| n.parse().ok()).collect();
                if let Some(parsed) = parsed {
                    counters = parsed;
                }
                return prefix;
            }

            let depth = (section.level as usize).clamp(1, MAX_DEPTH);
            counters.resize(depth, 0);
            counters[depth - 1] += 1;
            counters
                .iter()
                .map(usize::to_string)
                .collect::<Vec<_>>()
                .join(".")
        })
        .collect()
}

/// Everything needed to assemble one TOC section.
#[derive(Debug, Clone, Copy)]
pub struct SectionSource<'a> {
    pub toc_index: usize,
    pub toc: &'a TocSection,
    pub path: &'a str,
    pub range: &'a ExtractedRange,
}

/// Build the processed section for `source.range`, splitting it into
/// embedding-safe parts and chunking every part.
///
/// Content within the ceiling gives a single section `sec_NNN`. Longer
/// content gives parts `sec_NNN_embedpart1..N` with paths suffixed `.1..N`;
/// the first part owns the others. Chunk sequence numbers continue across
/// parts.
pub fn build_processed_section(
    source: SectionSource<'_>,
    layout: &PageLayout,
    config: &ChunkingConfig,
) -> ProcessedSection {
    let range = source.range;
    let base_id = SectionId::new(source.toc_index);
    let spans = split_embedding_parts(&range.content, config);
    let split = spans.len() > 1;
    let clean_title = source.toc.search_title();

    let mut paragraph_idx = 0;
    let mut parts: Vec<ProcessedSection> = spans
        .iter()
        .enumerate()
        .map(|(i, span)| {
            let (id, path) = if split {
                (base_id.with_part(i + 1), format!("{}.{}", source.path, i + 1))
            } else {
                (base_id.clone(), source.path.to_string())
            };
            let content = char_slice(&range.content, span.start, span.end);
            let char_start = range.char_start + span.start;
            let char_end = range.char_start + span.end;
            let page_start = layout.page_at(char_start).unwrap_or(range.first_page);
            let page_end = layout
                .page_at(char_end.saturating_sub(1).max(char_start))
                .unwrap_or(range.last_page);

            let chunks = chunk_paragraphs(content, config.chunk_size)
                .into_iter()
                .map(|chunk| {
                    let start = char_start + chunk.start;
                    let built = Chunk {
                        chunk_id: id.chunk_id(paragraph_idx),
                        section_id: id.to_string(),
                        title: clean_title.clone(),
                        path: path.clone(),
                        page: layout.page_at(start).unwrap_or(page_start),
                        paragraph_idx,
                        char_start: start,
                        char_end: char_start + chunk.end,
                        content: chunk.text,
                    };
                    paragraph_idx += 1;
                    built
                })
                .collect();

            ProcessedSection {
                section_id: id.to_string(),
                title: source.toc.title.clone(),
                clean_title: clean_title.clone(),
                path,
                level: source.toc.level,
                page_start,
                page_end,
                char_start,
                char_end,
                content: content.to_string(),
                parent_section_id: source.toc.parent_section_id.clone(),
                semantic_type: source.toc.semantic_type.clone(),
                follow_up_parts: Vec::new(),
                chunks,
            }
        })
        .collect();

    let mut first = parts.remove(0);
    first.follow_up_parts = parts;
    first
}
