use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::{
    error::{Error, Result},
    ids::SectionId,
    store::{DocumentChunk, DocumentSection, SectionDb},
    text_util::{fold_case, significant_words},
    vector_store::VectorStore,
};

pub const DEFAULT_CHUNK_WITH_VECTOR: f32 = 0.8;
pub const DEFAULT_CHUNK_WITHOUT_VECTOR: f32 = 0.5;
pub const DEFAULT_TOC_ONLY: f32 = 0.6;
pub const DEFAULT_TOC_BONUS: f32 = 0.2;
pub const DEFAULT_TOP_K: usize = 5;

/// Chunk hits requested from the vector store per query.
const CHUNK_HIT_LIMIT: usize = 20;

/// Relevance values assigned by the combiner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringConfig {
    /// Chunk hit whose section has a vector registration.
    pub chunk_with_vector: f32,
    /// Chunk hit whose section has none.
    pub chunk_without_vector: f32,
    /// Section matched only through its TOC title or content.
    pub toc_only: f32,
    /// Added when a chunk-hit section also matches through the TOC.
    pub toc_bonus: f32,
    pub top_k: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            chunk_with_vector: DEFAULT_CHUNK_WITH_VECTOR,
            chunk_without_vector: DEFAULT_CHUNK_WITHOUT_VECTOR,
            toc_only: DEFAULT_TOC_ONLY,
            toc_bonus: DEFAULT_TOC_BONUS,
            top_k: DEFAULT_TOP_K,
        }
    }
}

/// Which signals selected a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateSource {
    Chunks,
    Toc,
    Both,
}

/// A section selected for a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalCandidate {
    pub material_id: String,
    pub material_name: String,
    pub section_id: String,
    pub section_title: String,
    pub path: String,
    pub content: String,
    /// Always within `[0, 1]`.
    pub relevance_score: f32,
    pub source: CandidateSource,
}

/// Retrieve the sections of one material most relevant to `query`.
///
/// 1. Rank the material's chunks through the vector store
/// 2. Merge hits per section, keeping the best score
/// 3. Add or boost sections whose title or content matches the query
/// 4. Sort by relevance and keep the top `top_k`
pub fn retrieve(
    db: &SectionDb,
    vectors: &dyn VectorStore,
    doc_id: &str,
    query: &str,
    config: &ScoringConfig,
) -> Result<Vec<RetrievalCandidate>> {
    let material = db.get_material(doc_id)?.ok_or_else(|| Error::NotFound {
        kind: "material",
        name: doc_id.to_string(),
    })?;

    let sections: Vec<DocumentSection> = db
        .list_sections(doc_id)?
        .into_iter()
        .filter(|s| well_formed(&s.section_id))
        .collect();
    let chunks: Vec<DocumentChunk> = db
        .list_chunks(doc_id)?
        .into_iter()
        .filter(|c| well_formed(&c.section_id))
        .collect();

    let hits: Vec<&DocumentChunk> = if chunks.is_empty() || query.trim().is_empty()
    {
        Vec::new()
    } else {
        vectors
            .search_similar_chunks(query, &chunks, CHUNK_HIT_LIMIT)?
            .into_iter()
            .filter_map(|hit| chunks.get(hit.index))
            .collect()
    };

    let mut candidates = combine(query, &sections, &chunks, &hits, config);
    for candidate in &mut candidates {
        candidate.material_id = material.doc_id.clone();
        candidate.material_name = material.name.clone();
    }
    Ok(candidates)
}

fn well_formed(section_id: &str) -> bool {
    let ok = SectionId::parse(section_id).is_some();
    if !ok {
        tracing::debug!(section_id, "skipping malformed section id");
    }
    ok
}

struct Group<'a> {
    chunks: Vec<&'a DocumentChunk>,
    score: f32,
    source: CandidateSource,
}

/// Merge ranked chunk hits with TOC matches. Material fields are left
/// empty for the caller to fill.
fn combine(
    query: &str,
    sections: &[DocumentSection],
    chunks: &[DocumentChunk],
    hits: &[&DocumentChunk],
    config: &ScoringConfig,
) -> Vec<RetrievalCandidate> {
    let by_id: HashMap<&str, &DocumentSection> =
        sections.iter().map(|s| (s.section_id.as_str(), s)).collect();

    let mut groups: BTreeMap<&str, Group<'_>> = BTreeMap::new();
    for &chunk in hits {
        let base = match by_id.get(chunk.section_id.as_str()) {
            Some(section) if section.vector_id.is_some() => {
                config.chunk_with_vector
            }
            _ => config.chunk_without_vector,
        };
        let group = groups.entry(&chunk.section_id).or_insert(Group {
            chunks: Vec::new(),
            score: 0.0,
            source: CandidateSource::Chunks,
        });
        group.score = group.score.max(base);
        if !group.chunks.iter().any(|c| c.chunk_id == chunk.chunk_id) {
            group.chunks.push(chunk);
        }
    }

    let words = significant_words(query);
    let phrase = fold_case(query.trim());
    for section in sections {
        if !toc_match(section, &words, &phrase) {
            continue;
        }
        match groups.get_mut(section.section_id.as_str()) {
            Some(group) => {
                group.score = (group.score + config.toc_bonus).min(1.0);
                group.source = CandidateSource::Both;
            }
            None => {
                let own: Vec<&DocumentChunk> = chunks
                    .iter()
                    .filter(|c| c.section_id == section.section_id)
                    .collect();
                groups.insert(
                    &section.section_id,
                    Group {
                        chunks: own,
                        score: config.toc_only,
                        source: CandidateSource::Toc,
                    },
                );
            }
        }
    }

    let mut candidates: Vec<RetrievalCandidate> = groups
        .into_iter()
        .map(|(section_id, mut group)| {
            group.chunks.sort_by_key(|c| c.paragraph_idx);
            let section = by_id.get(section_id);
            let content = if group.chunks.is_empty() {
                section.map(|s| s.content.clone()).unwrap_or_default()
            } else {
                group
                    .chunks
                    .iter()
                    .map(|c| c.content.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n")
            };
            let (section_title, path) = match (section, group.chunks.first()) {
                (Some(s), _) => (s.clean_title.clone(), s.path.clone()),
                (None, Some(c)) => (c.title.clone(), c.path.clone()),
                (None, None) => (String::new(), String::new()),
            };
            RetrievalCandidate {
                material_id: String::new(),
                material_name: String::new(),
                section_id: section_id.to_string(),
                section_title,
                path,
                content,
                relevance_score: group.score.clamp(0.0, 1.0),
                source: group.source,
            }
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.relevance_score
            .total_cmp(&a.relevance_score)
            .then_with(|| {
                SectionId::parse(&a.section_id)
                    .cmp(&SectionId::parse(&b.section_id))
            })
    });
    candidates.truncate(config.top_k);
    candidates
}

/// A section matches when a significant query word occurs in its clean
/// title or the whole query occurs in its content.
fn toc_match(section: &DocumentSection, words: &[String], phrase: &str) -> bool {
    let title = fold_case(&section.clean_title);
    words.iter().any(|w| title.contains(w.as_str()))
        || (!phrase.is_empty() && fold_case(&section.content).contains(phrase))
}

/// Format candidates for terminal output.
pub fn format_human(candidates: &[RetrievalCandidate]) {
    if candidates.is_empty() {
        println!("No relevant sections found.");
        return;
    }

    for (i, c) in candidates.iter().enumerate() {
        println!(
            "{:>3}. [{:.2}] {} {} ({})",
            i + 1,
            c.relevance_score,
            c.path,
            c.section_title,
            c.section_id
        );
        let preview: String = c.content.chars().take(160).collect();
        println!("     {}", preview.replace('\n', " "));
    }
    println!("\n{} section(s)", candidates.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chunk_index::ChunkHit,
        store::tests::{material, test_db},
        vector_store::{LocalVectorStore, SectionMetadata},
    };

    fn section(id: &str, title: &str, content: &str) -> DocumentSection {
        DocumentSection {
            doc_id: "m1".to_string(),
            section_id: id.to_string(),
            title: title.to_string(),
            clean_title: title.to_string(),
            path: "1".to_string(),
            level: 1,
            page_start: 1,
            page_end: 1,
            char_start: 0,
            char_end: content.chars().count(),
            content: content.to_string(),
            parent_section_id: None,
            semantic_type: "chapter".to_string(),
            part_index: 1,
            part_count: 1,
            subject_id: "s1".to_string(),
            faculty_id: None,
            department_id: None,
            year: None,
            vector_id: Some(format!("vec_{id}")),
        }
    }

    fn chunk(section_id: &str, idx: usize, content: &str) -> DocumentChunk {
        DocumentChunk {
            doc_id: "m1".to_string(),
            chunk_id: format!("{section_id}_c{idx:04}"),
            section_id: section_id.to_string(),
            title: String::new(),
            path: "1".to_string(),
            page: 1,
            paragraph_idx: idx,
            char_start: 0,
            char_end: content.chars().count(),
            content: content.to_string(),
        }
    }

    #[test]
    fn chunk_hits_merge_per_section() {
        let sections = vec![section("sec_000", "Uvod", "a b")];
        let chunks = vec![chunk("sec_000", 0, "prvi"), chunk("sec_000", 1, "drugi")];
        let hits = vec![&chunks[1], &chunks[0]];

        let out = combine("xyz", &sections, &chunks, &hits, &ScoringConfig::default());

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content, "prvi\n\ndrugi");
        assert_eq!(out[0].relevance_score, 0.8);
        assert_eq!(out[0].source, CandidateSource::Chunks);
    }

    #[test]
    fn section_without_vector_scores_lower() {
        let mut bare = section("sec_001", "Mreže", "c");
        bare.vector_id = None;
        let sections = vec![section("sec_000", "Uvod", "a"), bare];
        let chunks = vec![chunk("sec_000", 0, "x"), chunk("sec_001", 0, "y")];
        let hits = vec![&chunks[1], &chunks[0]];

        let out = combine("qqq", &sections, &chunks, &hits, &ScoringConfig::default());

        assert_eq!(out[0].section_id, "sec_000");
        assert_eq!(out[1].relevance_score, 0.5);
    }

    #[test]
    fn toc_match_boosts_and_adds() {
        let sections = vec![
            section("sec_000", "Memorija", "tekst o memoriji"),
            section("sec_001", "Keš memorija", "brza memorija"),
            section("sec_002", "Mreže", "protokoli"),
        ];
        let chunks = vec![chunk("sec_000", 0, "ram"), chunk("sec_001", 0, "keš")];
        let hits = vec![&chunks[0]];

        let out =
            combine("memorija", &sections, &chunks, &hits, &ScoringConfig::default());

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].section_id, "sec_000");
        assert!((out[0].relevance_score - 1.0).abs() < 1e-6);
        assert_eq!(out[0].source, CandidateSource::Both);
        assert_eq!(out[1].section_id, "sec_001");
        assert_eq!(out[1].relevance_score, 0.6);
        assert_eq!(out[1].content, "keš");
        assert_eq!(out[1].source, CandidateSource::Toc);
    }

    #[test]
    fn phrase_in_content_selects_section() {
        let sections = vec![section("sec_000", "Uvod", "Ovde je Fon Nojmanova arhitektura opisana.")];

        let out = combine(
            "fon nojmanova arhitektura",
            &sections,
            &[],
            &[],
            &ScoringConfig::default(),
        );

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content, sections[0].content);
    }

    #[test]
    fn short_words_do_not_match_titles() {
        let sections = vec![section("sec_000", "IT i društvo", "tekst")];
        let out = combine("it", &sections, &[], &[], &ScoringConfig::default());
        assert!(out.is_empty());
    }

    #[test]
    fn ties_break_by_section_order_and_top_k_applies() {
        let sections: Vec<_> = (0..12)
            .map(|i| section(&format!("sec_{i:03}"), "Procesor", "x"))
            .collect();

        let out = combine("procesor", &sections, &[], &[], &ScoringConfig::default());

        let ids: Vec<_> = out.iter().map(|c| c.section_id.as_str()).collect();
        assert_eq!(ids, ["sec_000", "sec_001", "sec_002", "sec_003", "sec_004"]);
    }

    #[test]
    fn bonus_is_capped() {
        let config = ScoringConfig {
            chunk_with_vector: 0.95,
            toc_bonus: 0.5,
            ..Default::default()
        };
        let sections = vec![section("sec_000", "Memorija", "m")];
        let chunks = vec![chunk("sec_000", 0, "memorija")];
        let hits = vec![&chunks[0]];

        let out = combine("memorija", &sections, &chunks, &hits, &config);
        assert_eq!(out[0].relevance_score, 1.0);
    }

    struct FixedHits(Vec<ChunkHit>);

    impl VectorStore for FixedHits {
        fn add_section(
            &self,
            section_id: &str,
            _content: &str,
            _metadata: &SectionMetadata,
        ) -> Result<String> {
            Ok(section_id.to_string())
        }

        fn remove_section(
            &self,
            _doc_id: &str,
            _section_id: &str,
        ) -> Result<bool> {
            Ok(false)
        }

        fn search_similar_chunks(
            &self,
            _query: &str,
            _candidates: &[DocumentChunk],
            _limit: usize,
        ) -> Result<Vec<ChunkHit>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn retrieve_skips_malformed_ids_and_bad_hits() {
        let (_tmp, db) = test_db();
        db.put_material(&material("m1", "s1")).unwrap();
        db.upsert_section(&section("sec_000", "Uvod", "a")).unwrap();
        db.upsert_section(&section("chapter-1", "Uvod", "b")).unwrap();
        db.replace_section_chunks("m1", "sec_000", &[chunk("sec_000", 0, "a")])
            .unwrap();
        let vectors = FixedHits(vec![
            ChunkHit {
                index: 0,
                score: 1.0,
            },
            ChunkHit {
                index: 99,
                score: 0.5,
            },
        ]);

        let out =
            retrieve(&db, &vectors, "m1", "nešto", &ScoringConfig::default())
                .unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].section_id, "sec_000");
        assert_eq!(out[0].material_name, "Material m1");
    }

    #[test]
    fn no_lexical_match_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let (_db_tmp, db) = test_db();
        let vectors =
            LocalVectorStore::open(&tmp.path().join("vectors.redb")).unwrap();
        db.put_material(&material("m1", "s1")).unwrap();
        db.upsert_section(&section("sec_000", "Uvod", "osnove računara"))
            .unwrap();
        db.replace_section_chunks(
            "m1",
            "sec_000",
            &[chunk("sec_000", 0, "osnove računara")],
        )
        .unwrap();

        let out = retrieve(
            &db,
            &vectors,
            "m1",
            "kvantna hromodinamika",
            &ScoringConfig::default(),
        )
        .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn scores_stay_in_unit_range() {
        let config = ScoringConfig {
            chunk_with_vector: 1.0,
            toc_bonus: 1.0,
            toc_only: 1.0,
            ..Default::default()
        };
        let sections = vec![
            section("sec_000", "Memorija", "memorija"),
            section("sec_001", "Memorija", "memorija"),
        ];
        let chunks = vec![chunk("sec_000", 0, "memorija")];
        let hits = vec![&chunks[0], &chunks[0]];

        for c in combine("memorija", &sections, &chunks, &hits, &config) {
            assert!((0.0..=1.0).contains(&c.relevance_score));
        }
    }
}
