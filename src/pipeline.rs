//! Ingestion of one material: a sequential fold over its TOC sections.
//!
//! For every TOC section not yet processed: extract its page range, refine
//! the boundaries, split and chunk, persist, then flag the TOC section. The
//! fold carries the char ranges already attributed to earlier sections so
//! each boundary search starts after them.

use std::ops::Range;

use serde::Serialize;

use crate::{
    chunking::ChunkingConfig,
    error::{Error, Result},
    extract::{ExtractedRange, PageLayout, extract_section},
    material::{IngestInput, Material, MaterialStatus, PageText, TocAnalysis},
    persist::persist_section,
    refine::{RefineOutcome, RefineTarget, refine_section},
    section::{SectionSource, build_processed_section, section_paths},
    store::SectionDb,
    text_util::char_len,
    title_match::numeric_prefix,
    vector_store::VectorStore,
};

/// Counts collected over one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub doc_id: String,
    /// TOC sections whose parts were all saved.
    pub sections_saved: usize,
    pub parts_saved: usize,
    pub chunks_saved: usize,
    pub refined: usize,
    pub unrefined: usize,
    /// TOC sections already processed by an earlier run.
    pub skipped_processed: usize,
    /// TOC sections with too little content to keep.
    pub skipped_short: usize,
    /// TOC sections with at least one part that failed to persist.
    pub failed: usize,
}

#[derive(Debug, Default)]
struct IngestState {
    /// Char ranges attributed to sections so far, in TOC order.
    covered: Vec<Range<usize>>,
    processed_sections: usize,
    report: IngestReport,
}

impl IngestState {
    fn search_from(&self) -> usize {
        self.covered.last().map_or(0, |r| r.end)
    }
}

/// Store the material and its TOC analysis from an input file, then ingest.
///
/// A stored TOC analysis listing the same sections is kept, so processed
/// flags from an interrupted run survive and those sections are skipped.
/// Any other TOC replaces it, and every section, chunk and vector
/// registration saved under the previous one is removed first.
pub fn ingest_input(
    db: &SectionDb,
    vectors: &dyn VectorStore,
    input: IngestInput,
    config: &ChunkingConfig,
) -> Result<IngestReport> {
    let doc_id = input.material.doc_id.clone();
    let mut toc = input.toc;
    toc.doc_id = doc_id.clone();

    db.put_material(&input.material)?;
    match db.get_toc_analysis(&doc_id)? {
        Some(stored) if same_sections(&stored, &toc) => {
            tracing::info!(
                doc_id = %doc_id,
                processed = stored.processed_sections,
                "resuming from stored TOC analysis"
            );
        }
        _ => {
            let stale = db.clear_sections(&doc_id)?;
            for section_id in &stale {
                vectors.remove_section(&doc_id, section_id)?;
            }
            if !stale.is_empty() {
                tracing::info!(
                    doc_id = %doc_id,
                    removed = stale.len(),
                    "TOC changed, removed sections of the previous analysis"
                );
            }
            toc.total_sections = toc.sections.len();
            toc.processed_sections =
                toc.sections.iter().filter(|s| s.processed).count();
            db.put_toc_analysis(&toc)?;
        }
    }

    ingest_material(db, vectors, &doc_id, input.pages, config)
}

fn same_sections(a: &TocAnalysis, b: &TocAnalysis) -> bool {
    a.sections.len() == b.sections.len()
        && a.sections.iter().zip(&b.sections).all(|(x, y)| {
            x.title == y.title
                && x.page_start == y.page_start
                && x.page_end == y.page_end
        })
}

/// Ingest a stored material from its page texts.
///
/// Sets the material status to `processing`, then `ready` when the fold
/// completes, or `failed` when it aborts. Missing pages for a declared
/// range abort the run; every other per-section problem is logged and
/// counted.
pub fn ingest_material(
    db: &SectionDb,
    vectors: &dyn VectorStore,
    doc_id: &str,
    pages: Vec<PageText>,
    config: &ChunkingConfig,
) -> Result<IngestReport> {
    let material = db.get_material(doc_id)?.ok_or_else(|| Error::NotFound {
        kind: "material",
        name: doc_id.to_string(),
    })?;
    let toc = db.get_toc_analysis(doc_id)?.ok_or_else(|| Error::NotFound {
        kind: "toc analysis",
        name: doc_id.to_string(),
    })?;

    db.set_material_status(doc_id, MaterialStatus::Processing)?;
    tracing::info!(
        doc_id,
        sections = toc.sections.len(),
        pages = pages.len(),
        "ingesting material"
    );

    let layout = PageLayout::new(pages);
    let paths = section_paths(&toc.sections);
    let ctx = FoldContext {
        db,
        vectors,
        material: &material,
        toc: &toc,
        paths: &paths,
        layout: &layout,
        config,
    };

    let initial = IngestState {
        report: IngestReport {
            doc_id: doc_id.to_string(),
            ..Default::default()
        },
        ..Default::default()
    };
    let folded = (0..toc.sections.len())
        .try_fold(initial, |state, index| ctx.step(state, index));

    let state = match folded {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(doc_id, error = %e, "ingestion aborted");
            if let Err(status_err) =
                db.set_material_status(doc_id, MaterialStatus::Failed)
            {
                tracing::warn!(
                    doc_id,
                    error = %status_err,
                    "could not mark material failed"
                );
            }
            return Err(e);
        }
    };

    db.set_material_status(doc_id, MaterialStatus::Ready)?;
    let report = state.report;
    tracing::info!(
        doc_id,
        sections = report.sections_saved,
        processed = state.processed_sections,
        parts = report.parts_saved,
        chunks = report.chunks_saved,
        skipped_short = report.skipped_short,
        failed = report.failed,
        "material ready"
    );
    Ok(report)
}

struct FoldContext<'a> {
    db: &'a SectionDb,
    vectors: &'a dyn VectorStore,
    material: &'a Material,
    toc: &'a TocAnalysis,
    paths: &'a [String],
    layout: &'a PageLayout,
    config: &'a ChunkingConfig,
}

impl FoldContext<'_> {
    fn step(&self, mut state: IngestState, index: usize) -> Result<IngestState> {
        let toc_section = &self.toc.sections[index];
        if toc_section.processed {
            state.report.skipped_processed += 1;
            state.processed_sections += 1;
            return Ok(state);
        }

        let raw = extract_section(toc_section, self.layout)?;

        let next = self.toc.sections.get(index + 1);
        let title = toc_section.search_title();
        let number = numeric_prefix(&toc_section.title);
        let next_title = next.map(|s| s.search_title());
        let next_number = next.and_then(|s| numeric_prefix(&s.title));
        let target = RefineTarget {
            title: &title,
            number: number.as_deref(),
            next_title: next_title.as_deref(),
            next_number: next_number.as_deref(),
            search_from: state.search_from(),
        };
        let range = match refine_section(
            &raw,
            self.layout,
            target,
            self.config.min_section_chars,
        ) {
            RefineOutcome::Refined {
                range,
                start_strategy,
                end_strategy,
            } => {
                tracing::debug!(
                    section = %toc_section.title,
                    start = %start_strategy,
                    end = end_strategy.map_or("range end", |s| s.name()),
                    "refined boundaries"
                );
                state.report.refined += 1;
                range
            }
            RefineOutcome::Unrefined(reason) => {
                tracing::debug!(
                    section = %toc_section.title,
                    %reason,
                    "using page range content"
                );
                state.report.unrefined += 1;
                raw
            }
        };

        if char_len(&range.content) < self.config.min_section_chars {
            tracing::info!(
                section = %toc_section.title,
                chars = range.len(),
                "skipping section with too little content"
            );
            state.report.skipped_short += 1;
            return Ok(state);
        }

        self.persist(state, index, range)
    }

    fn persist(
        &self,
        mut state: IngestState,
        index: usize,
        range: ExtractedRange,
    ) -> Result<IngestState> {
        let section = build_processed_section(
            SectionSource {
                toc_index: index,
                toc: &self.toc.sections[index],
                path: &self.paths[index],
                range: &range,
            },
            self.layout,
            self.config,
        );
        let outcome =
            persist_section(self.db, self.vectors, self.material, &section);

        state.covered.push(range.char_start..range.char_end);
        state.report.parts_saved += outcome.parts_saved;
        state.report.chunks_saved += outcome.chunks_saved;

        if outcome.is_complete() {
            self.db
                .mark_toc_section_processed(&self.material.doc_id, index)?;
            state.processed_sections += 1;
            state.report.sections_saved += 1;
        } else {
            state.report.failed += 1;
        }
        Ok(state)
    }
}
