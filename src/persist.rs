use crate::{
    error::Result,
    ids::SectionId,
    material::Material,
    section::{Chunk, ProcessedSection},
    store::{DocumentChunk, DocumentSection, SectionDb},
    vector_store::{SectionMetadata, VectorStore},
};

/// What happened to the parts of one processed section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistOutcome {
    pub parts_saved: usize,
    pub parts_failed: usize,
    pub chunks_saved: usize,
}

impl PersistOutcome {
    /// Every part was stored and registered.
    pub fn is_complete(&self) -> bool {
        self.parts_failed == 0 && self.parts_saved > 0
    }
}

/// Store every part of `section` and register it with the vector store.
///
/// Parts are handled independently: a failing part is logged and counted,
/// and its siblings are still attempted.
pub fn persist_section(
    db: &SectionDb,
    vectors: &dyn VectorStore,
    material: &Material,
    section: &ProcessedSection,
) -> PersistOutcome {
    let part_count = section.part_count();
    let mut outcome = PersistOutcome::default();

    if let Err(e) = remove_stale_parts(db, vectors, &material.doc_id, section) {
        tracing::warn!(
            doc_id = %material.doc_id,
            section_id = %section.section_id,
            error = %e,
            "failed to remove stale section parts"
        );
    }

    for (i, part) in section.parts().enumerate() {
        match persist_part(db, vectors, material, part, i + 1, part_count) {
            Ok(chunks) => {
                outcome.parts_saved += 1;
                outcome.chunks_saved += chunks;
            }
            Err(e) => {
                tracing::warn!(
                    doc_id = %material.doc_id,
                    section_id = %part.section_id,
                    error = %e,
                    "failed to persist section part"
                );
                outcome.parts_failed += 1;
            }
        }
    }

    outcome
}

/// Remove saved parts of the same TOC entry that `section` no longer
/// produces, such as `sec_NNN_embedpartN` records left over after the
/// section shrank below the ceiling.
fn remove_stale_parts(
    db: &SectionDb,
    vectors: &dyn VectorStore,
    doc_id: &str,
    section: &ProcessedSection,
) -> Result<usize> {
    let Some(toc_index) =
        SectionId::parse(&section.section_id).map(|id| id.toc_index())
    else {
        return Ok(0);
    };
    let produced: Vec<&str> =
        section.parts().map(|p| p.section_id.as_str()).collect();

    let mut removed = 0;
    for id in db.list_section_ids(doc_id)? {
        let same_entry = SectionId::parse(&id)
            .is_some_and(|parsed| parsed.toc_index() == toc_index);
        if !same_entry || produced.contains(&id.as_str()) {
            continue;
        }
        db.remove_section(doc_id, &id)?;
        vectors.remove_section(doc_id, &id)?;
        tracing::debug!(doc_id, section_id = %id, "removed stale section part");
        removed += 1;
    }
    Ok(removed)
}

fn persist_part(
    db: &SectionDb,
    vectors: &dyn VectorStore,
    material: &Material,
    part: &ProcessedSection,
    part_index: usize,
    part_count: usize,
) -> Result<usize> {
    let record = document_section(material, part, part_index, part_count);
    db.upsert_section(&record)?;

    let chunks: Vec<DocumentChunk> = part
        .chunks
        .iter()
        .map(|chunk| document_chunk(&material.doc_id, chunk))
        .collect();
    db.replace_section_chunks(&material.doc_id, &part.section_id, &chunks)?;

    let metadata = SectionMetadata {
        doc_id: material.doc_id.clone(),
        subject_id: material.subject_id.clone(),
        title: part.clean_title.clone(),
        path: part.path.clone(),
        page_start: part.page_start,
        page_end: part.page_end,
    };
    let vector_id =
        vectors.add_section(&part.section_id, &part.content, &metadata)?;
    db.set_section_vector_id(&material.doc_id, &part.section_id, &vector_id)?;

    Ok(chunks.len())
}

/// The stored form of one part. The vector id is attached separately once
/// registration succeeds.
pub fn document_section(
    material: &Material,
    part: &ProcessedSection,
    part_index: usize,
    part_count: usize,
) -> DocumentSection {
    DocumentSection {
        doc_id: material.doc_id.clone(),
        section_id: part.section_id.clone(),
        title: part.title.clone(),
        clean_title: part.clean_title.clone(),
        path: part.path.clone(),
        level: part.level,
        page_start: part.page_start,
        page_end: part.page_end,
        char_start: part.char_start,
        char_end: part.char_end,
        content: part.content.clone(),
        parent_section_id: part.parent_section_id.clone(),
        semantic_type: part.semantic_type.clone(),
        part_index,
        part_count,
        subject_id: material.subject_id.clone(),
        faculty_id: material.faculty_id.clone(),
        department_id: material.department_id.clone(),
        year: material.year,
        vector_id: None,
    }
}

pub fn document_chunk(doc_id: &str, chunk: &Chunk) -> DocumentChunk {
    DocumentChunk {
        doc_id: doc_id.to_string(),
        chunk_id: chunk.chunk_id.clone(),
        section_id: chunk.section_id.clone(),
        title: chunk.title.clone(),
        path: chunk.path.clone(),
        page: chunk.page,
        paragraph_idx: chunk.paragraph_idx,
        char_start: chunk.char_start,
        char_end: chunk.char_end,
        content: chunk.content.clone(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::{
        chunk_index::ChunkHit,
        chunking::ChunkingConfig,
        error::Error,
        extract::{PageLayout, extract_section},
        material::{PageText, TocSection},
        section::{SectionSource, build_processed_section},
        store::tests::{material, test_db},
    };

    /// Vector store that records registrations and fails for chosen
    /// section ids.
    #[derive(Default)]
    pub(crate) struct RecordingStore {
        pub fail_for: Vec<String>,
        pub added: RefCell<Vec<String>>,
        pub removed: RefCell<Vec<String>>,
    }

    impl VectorStore for RecordingStore {
        fn add_section(
            &self,
            section_id: &str,
            _content: &str,
            _metadata: &SectionMetadata,
        ) -> Result<String> {
            if self.fail_for.iter().any(|id| id == section_id) {
                return Err(Error::VectorStore("unavailable".to_string()));
            }
            self.added.borrow_mut().push(section_id.to_string());
            Ok(format!("vec_{section_id}"))
        }

        fn remove_section(
            &self,
            _doc_id: &str,
            section_id: &str,
        ) -> Result<bool> {
            self.removed.borrow_mut().push(section_id.to_string());
            Ok(true)
        }

        fn search_similar_chunks(
            &self,
            _query: &str,
            _candidates: &[DocumentChunk],
            _limit: usize,
        ) -> Result<Vec<ChunkHit>> {
            Ok(Vec::new())
        }
    }

    fn split_section() -> ProcessedSection {
        let text = "Rečenica o mrežama i protokolima.\n\n".repeat(900);
        let layout = PageLayout::new(vec![PageText::new(1, text)]);
        let toc = TocSection::new("Mreže", 1, 1);
        let range = extract_section(&toc, &layout).unwrap();
        build_processed_section(
            SectionSource {
                toc_index: 2,
                toc: &toc,
                path: "3",
                range: &range,
            },
            &layout,
            &ChunkingConfig::default(),
        )
    }

    #[test]
    fn saves_every_part_with_vector_ids() {
        let (_tmp, db) = test_db();
        let vectors = RecordingStore::default();
        let section = split_section();
        assert_eq!(section.part_count(), 4);

        let outcome =
            persist_section(&db, &vectors, &material("m1", "s1"), &section);

        assert!(outcome.is_complete());
        assert_eq!(outcome.parts_saved, 4);
        assert_eq!(outcome.chunks_saved, section.chunk_count());

        let saved = db.list_sections("m1").unwrap();
        assert_eq!(saved.len(), 4);
        assert_eq!(saved[0].part_index, 1);
        assert_eq!(saved[3].part_count, 4);
        assert_eq!(saved[0].subject_id, "s1");
        assert_eq!(saved[0].faculty_id.as_deref(), Some("etf"));
        assert_eq!(
            saved[2].vector_id.as_deref(),
            Some("vec_sec_002_embedpart3")
        );
        assert_eq!(db.list_chunks("m1").unwrap().len(), section.chunk_count());
    }

    #[test]
    fn failed_registration_does_not_stop_siblings() {
        let (_tmp, db) = test_db();
        let vectors = RecordingStore {
            fail_for: vec!["sec_002_embedpart2".to_string()],
            ..Default::default()
        };
        let section = split_section();

        let outcome =
            persist_section(&db, &vectors, &material("m1", "s1"), &section);

        assert!(!outcome.is_complete());
        assert_eq!(outcome.parts_failed, 1);
        assert_eq!(outcome.parts_saved, 3);
        assert_eq!(vectors.added.borrow().len(), 3);

        let failed = db
            .get_section("m1", "sec_002_embedpart2")
            .unwrap()
            .unwrap();
        assert!(failed.vector_id.is_none());
    }

    fn single_section(toc_index: usize) -> ProcessedSection {
        let text = "Rečenica o mrežama i protokolima.\n\n".repeat(20);
        let layout = PageLayout::new(vec![PageText::new(1, text)]);
        let toc = TocSection::new("Mreže", 1, 1);
        let range = extract_section(&toc, &layout).unwrap();
        build_processed_section(
            SectionSource {
                toc_index,
                toc: &toc,
                path: "3",
                range: &range,
            },
            &layout,
            &ChunkingConfig::default(),
        )
    }

    #[test]
    fn unsplit_rerun_drops_old_parts() {
        let (_tmp, db) = test_db();
        let vectors = RecordingStore::default();
        let m = material("m1", "s1");
        persist_section(&db, &vectors, &m, &split_section());
        persist_section(&db, &vectors, &m, &single_section(1));

        let section = single_section(2);
        assert_eq!(section.part_count(), 1);
        let outcome = persist_section(&db, &vectors, &m, &section);

        assert!(outcome.is_complete());
        assert_eq!(db.list_section_ids("m1").unwrap(), ["sec_001", "sec_002"]);
        assert!(
            db.list_chunks("m1")
                .unwrap()
                .iter()
                .all(|c| !c.section_id.contains("embedpart"))
        );
        assert_eq!(
            *vectors.removed.borrow(),
            [
                "sec_002_embedpart1",
                "sec_002_embedpart2",
                "sec_002_embedpart3",
                "sec_002_embedpart4"
            ]
        );
    }

    #[test]
    fn split_rerun_drops_old_single_part() {
        let (_tmp, db) = test_db();
        let vectors = RecordingStore::default();
        let m = material("m1", "s1");
        persist_section(&db, &vectors, &m, &single_section(2));

        persist_section(&db, &vectors, &m, &split_section());

        let ids = db.list_section_ids("m1").unwrap();
        assert_eq!(ids.len(), 4);
        assert!(ids.iter().all(|id| id.starts_with("sec_002_embedpart")));
        assert_eq!(*vectors.removed.borrow(), ["sec_002"]);
    }

    #[test]
    fn rerun_overwrites_instead_of_duplicating() {
        let (_tmp, db) = test_db();
        let vectors = RecordingStore::default();
        let section = split_section();
        let m = material("m1", "s1");

        persist_section(&db, &vectors, &m, &section);
        persist_section(&db, &vectors, &m, &section);

        assert_eq!(db.list_sections("m1").unwrap().len(), 4);
        assert_eq!(db.list_chunks("m1").unwrap().len(), section.chunk_count());
    }
}
