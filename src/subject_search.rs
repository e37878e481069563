//! Lexical ranking of the ready materials of one subject.

use rayon::prelude::*;
use serde::Serialize;

use crate::{
    error::Result,
    material::MaterialStatus,
    store::SectionDb,
    text_util::{
        DEFAULT_PREVIEW_LEN,
        char_len,
        content_preview,
        fold_case,
        significant_words,
    },
};

/// Upper bound of a normalized score.
pub const MAX_SCORE: f64 = 20.0;

pub const DEFAULT_LIMIT: usize = 10;

const PHRASE_IN_TITLE: f64 = 10.0;
const PHRASE_IN_CONTENT: f64 = 8.0;
const PHRASE_IN_ABSTRACT: f64 = 6.0;
const WORD_IN_TITLE: f64 = 3.0;
const WORD_IN_CONTENT: f64 = 1.0;
const WORD_IN_ABSTRACT: f64 = 2.0;

/// Content length, in chars, per unit of the length normalization.
const LENGTH_UNIT: f64 = 100.0;

/// A material as seen by subject search.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectDocument {
    pub doc_id: String,
    pub title: String,
    pub content: String,
    pub abstract_text: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct SubjectSearchOptions {
    pub limit: usize,
    pub preview_len: usize,
}

impl Default for SubjectSearchOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            preview_len: DEFAULT_PREVIEW_LEN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectHit {
    pub doc_id: String,
    pub title: String,
    pub score: f64,
    pub preview: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSearchResults {
    pub query: String,
    pub results: Vec<SubjectHit>,
    /// Hints for the user when nothing was found.
    pub suggestions: Vec<String>,
}

/// Score one document against `query`, case-insensitively.
///
/// The whole query found in the title, content or abstract adds 10, 8 or
/// 6. Each distinct query word longer than two chars adds 3, 1 or 2 per
/// field it occurs in. The raw score is divided by `ln(len / 100 + 1)`
/// where `len` is the content length in chars, and capped at
/// [`MAX_SCORE`]. Empty content leaves the raw score undivided.
///
/// ```
/// use docsect::subject_search::score_document;
///
/// let score = score_document("keš", "Keš memorija", "", None);
/// assert_eq!(score, 10.0 + 3.0);
/// assert_eq!(score_document("disk", "Memorija", "RAM", None), 0.0);
/// ```
pub fn score_document(
    query: &str,
    title: &str,
    content: &str,
    abstract_text: Option<&str>,
) -> f64 {
    let title_f = fold_case(title);
    let content_f = fold_case(content);
    let abstract_f = abstract_text.map(fold_case).unwrap_or_default();
    let phrase = fold_case(query.trim());

    let mut raw = 0.0;
    if !phrase.is_empty() {
        if title_f.contains(&phrase) {
            raw += PHRASE_IN_TITLE;
        }
        if content_f.contains(&phrase) {
            raw += PHRASE_IN_CONTENT;
        }
        if abstract_f.contains(&phrase) {
            raw += PHRASE_IN_ABSTRACT;
        }
    }

    for word in significant_words(query) {
        if title_f.contains(&word) {
            raw += WORD_IN_TITLE;
        }
        if content_f.contains(&word) {
            raw += WORD_IN_CONTENT;
        }
        if abstract_f.contains(&word) {
            raw += WORD_IN_ABSTRACT;
        }
    }

    let len = char_len(content);
    let divisor = if len == 0 {
        1.0
    } else {
        (len as f64 / LENGTH_UNIT + 1.0).ln()
    };
    (raw / divisor).min(MAX_SCORE)
}

/// Rank `documents` for `query`. Documents scoring zero are dropped.
pub fn search_subject(
    query: &str,
    documents: &[SubjectDocument],
    options: &SubjectSearchOptions,
) -> SubjectSearchResults {
    if documents.is_empty() {
        return SubjectSearchResults {
            query: query.to_string(),
            results: Vec::new(),
            suggestions: vec![
                "No ready materials are available for this subject yet. \
                 Upload materials or wait for processing to finish."
                    .to_string(),
            ],
        };
    }

    let mut results: Vec<SubjectHit> = documents
        .par_iter()
        .filter_map(|doc| {
            let score = score_document(
                query,
                &doc.title,
                &doc.content,
                doc.abstract_text.as_deref(),
            );
            (score > 0.0).then(|| SubjectHit {
                doc_id: doc.doc_id.clone(),
                title: doc.title.clone(),
                score,
                preview: content_preview(
                    &doc.content,
                    query,
                    options.preview_len,
                ),
            })
        })
        .collect();

    results.sort_by(|a, b| {
        b.score.total_cmp(&a.score).then_with(|| a.doc_id.cmp(&b.doc_id))
    });
    results.truncate(options.limit);

    let suggestions = if results.is_empty() {
        suggestions_for(query)
    } else {
        Vec::new()
    };

    SubjectSearchResults {
        query: query.to_string(),
        results,
        suggestions,
    }
}

fn suggestions_for(query: &str) -> Vec<String> {
    let mut suggestions = Vec::new();
    if significant_words(query).is_empty() {
        suggestions.push("Use words longer than two characters.".to_string());
    }
    if query.split_whitespace().count() > 1 {
        suggestions.push("Try fewer or more general words.".to_string());
    }
    suggestions.push(format!(
        "No material mentions \"{}\". Check the spelling or try a synonym.",
        query.trim()
    ));
    suggestions
}

/// The ready materials of a subject, with their saved sections as content.
pub fn subject_documents(
    db: &SectionDb,
    subject_id: &str,
) -> Result<Vec<SubjectDocument>> {
    let mut documents = Vec::new();
    for material in db.list_materials()? {
        if material.subject_id != subject_id
            || material.status != MaterialStatus::Ready
        {
            continue;
        }
        let content = db
            .list_sections(&material.doc_id)?
            .into_iter()
            .map(|s| s.content)
            .collect::<Vec<_>>()
            .join("\n\n");
        documents.push(SubjectDocument {
            doc_id: material.doc_id,
            title: material.name,
            content,
            abstract_text: material.abstract_text,
        });
    }
    Ok(documents)
}

/// Format results for terminal output.
pub fn format_human(results: &SubjectSearchResults) {
    if results.results.is_empty() {
        println!("No results found.");
        for suggestion in &results.suggestions {
            println!("  - {suggestion}");
        }
        return;
    }

    for (i, hit) in results.results.iter().enumerate() {
        println!(
            "{:>3}. [{:.3}] {} ({})",
            i + 1,
            hit.score,
            hit.title,
            hit.doc_id
        );
        println!("     {}", hit.preview.replace('\n', " "));
    }
    println!("\n{} result(s)", results.results.len());
}
