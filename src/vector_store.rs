use std::path::Path;

use redb::{
    Database,
    ReadableDatabase,
    ReadableTable,
    ReadableTableMetadata,
    TableDefinition,
};
use serde::{Deserialize, Serialize};

use crate::{
    chunk_index::{ChunkHit, ChunkIndex},
    error::Result,
    ids,
    store::DocumentChunk,
};

/// Vector id -> JSON [`VectorRecord`].
const VECTORS: TableDefinition<&str, &[u8]> = TableDefinition::new("vectors");
/// `doc_id \0 section_id` -> current vector id.
const SECTION_VECTORS: TableDefinition<&str, &str> =
    TableDefinition::new("section_vectors");

/// Attributes registered alongside a section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionMetadata {
    pub doc_id: String,
    pub subject_id: String,
    pub title: String,
    pub path: String,
    pub page_start: u32,
    pub page_end: u32,
}

/// The contract ingestion and retrieval need from a vector index.
pub trait VectorStore {
    /// Register a section's content and return its vector id.
    fn add_section(
        &self,
        section_id: &str,
        content: &str,
        metadata: &SectionMetadata,
    ) -> Result<String>;

    /// Drop the registration of one section. Returns `false` when there
    /// was none.
    fn remove_section(&self, doc_id: &str, section_id: &str) -> Result<bool>;

    /// Rank `candidates` by similarity to `query`, best first. Hits index
    /// into `candidates`.
    fn search_similar_chunks(
        &self,
        query: &str,
        candidates: &[DocumentChunk],
        limit: usize,
    ) -> Result<Vec<ChunkHit>>;
}

/// A stored registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorRecord {
    pub vector_id: String,
    pub section_id: String,
    pub content_chars: usize,
    pub metadata: SectionMetadata,
}

/// Local [`VectorStore`]: registrations live in a redb ledger and ranking
/// is lexical BM25 over the candidates.
pub struct LocalVectorStore {
    db: Database,
}

impl LocalVectorStore {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(VECTORS)?;
        txn.open_table(SECTION_VECTORS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    pub fn get(&self, vector_id: &str) -> Result<Option<VectorRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(VECTORS)?;
        match table.get(vector_id)? {
            Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
            None => Ok(None),
        }
    }

    /// Current vector id of a section, if registered.
    pub fn vector_for_section(
        &self,
        doc_id: &str,
        section_id: &str,
    ) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SECTION_VECTORS)?;
        let key = format!("{doc_id}\0{section_id}");
        Ok(table.get(key.as_str())?.map(|v| v.value().to_string()))
    }

    pub fn count(&self) -> Result<u64> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(VECTORS)?;
        Ok(table.len()?)
    }

    /// Drop every registration of a material. Returns how many were removed.
    pub fn remove_document(&self, doc_id: &str) -> Result<usize> {
        let prefix = format!("{doc_id}\0");
        let end = format!("{doc_id}\u{1}");
        let txn = self.db.begin_write()?;
        let removed = {
            let mut sections = txn.open_table(SECTION_VECTORS)?;
            let entries: Vec<(String, String)> = sections
                .range::<&str>(prefix.as_str()..end.as_str())?
                .map(|entry| {
                    entry.map(|(k, v)| {
                        (k.value().to_string(), v.value().to_string())
                    })
                })
                .collect::<std::result::Result<_, _>>()?;

            let mut vectors = txn.open_table(VECTORS)?;
            for (key, vector_id) in &entries {
                sections.remove(key.as_str())?;
                vectors.remove(vector_id.as_str())?;
            }
            entries.len()
        };
        txn.commit()?;
        Ok(removed)
    }
}

impl VectorStore for LocalVectorStore {
    fn add_section(
        &self,
        section_id: &str,
        content: &str,
        metadata: &SectionMetadata,
    ) -> Result<String> {
        let vector_id = ids::vector_id(&metadata.doc_id, section_id, content);
        let record = VectorRecord {
            vector_id: vector_id.clone(),
            section_id: section_id.to_string(),
            content_chars: content.chars().count(),
            metadata: metadata.clone(),
        };
        let bytes = serde_json::to_vec(&record)?;
        let key = format!("{}\0{section_id}", metadata.doc_id);

        let txn = self.db.begin_write()?;
        {
            let mut sections = txn.open_table(SECTION_VECTORS)?;
            let previous = sections
                .insert(key.as_str(), vector_id.as_str())?
                .map(|v| v.value().to_string());

            let mut vectors = txn.open_table(VECTORS)?;
            if let Some(previous) = previous
                && previous != vector_id
            {
                vectors.remove(previous.as_str())?;
            }
            vectors.insert(vector_id.as_str(), bytes.as_slice())?;
        }
        txn.commit()?;

        tracing::debug!(section_id, vector_id = %vector_id, "registered section");
        Ok(vector_id)
    }

    fn remove_section(&self, doc_id: &str, section_id: &str) -> Result<bool> {
        let key = format!("{doc_id}\0{section_id}");
        let txn = self.db.begin_write()?;
        let removed = {
            let mut sections = txn.open_table(SECTION_VECTORS)?;
            let vector_id =
                sections.remove(key.as_str())?.map(|v| v.value().to_string());
            if let Some(vector_id) = &vector_id {
                txn.open_table(VECTORS)?.remove(vector_id.as_str())?;
            }
            vector_id.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    fn search_similar_chunks(
        &self,
        query: &str,
        candidates: &[DocumentChunk],
        limit: usize,
    ) -> Result<Vec<ChunkHit>> {
        ChunkIndex::build(candidates)?.search(query, limit)
    }
}

impl std::fmt::Debug for LocalVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalVectorStore").finish_non_exhaustive()
    }
}
