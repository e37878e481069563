use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    error::{Error, Result},
    ids::SectionId,
    material::{Material, MaterialStatus, TocAnalysis},
};

const MATERIALS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("materials");
const TOC_ANALYSES: TableDefinition<&str, &[u8]> =
    TableDefinition::new("toc_analyses");
/// Keyed by `doc_id \0 section_id`.
const SECTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("sections");
/// Keyed by `doc_id \0 chunk_id`; chunk ids start with their section id.
const CHUNKS: TableDefinition<&str, &[u8]> = TableDefinition::new("chunks");
const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");

/// A persisted section part with the owning material's attributes
/// denormalized onto it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSection {
    pub doc_id: String,
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
    /// 1-based position in the part chain.
    pub part_index: usize,
    pub part_count: usize,
    pub subject_id: String,
    pub faculty_id: Option<String>,
    pub department_id: Option<String>,
    pub year: Option<u32>,
    pub vector_id: Option<String>,
}

/// A persisted chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentChunk {
    pub doc_id: String,
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

/// Durable storage for materials, TOC analyses, sections, chunks and
/// settings. Every write is an upsert keyed by the record's identity, so
/// retried ingestion runs overwrite instead of duplicating.
pub struct SectionDb {
    db: Database,
}

impl SectionDb {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        // Ensure all tables exist by opening them in a write transaction.
        let txn = db.begin_write()?;
        txn.open_table(MATERIALS)?;
        txn.open_table(TOC_ANALYSES)?;
        txn.open_table(SECTIONS)?;
        txn.open_table(CHUNKS)?;
        txn.open_table(SETTINGS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    // -- Materials --

    pub fn put_material(&self, material: &Material) -> Result<()> {
        self.put_json(MATERIALS, &material.doc_id, material)
    }

    pub fn get_material(&self, doc_id: &str) -> Result<Option<Material>> {
        self.get_json(MATERIALS, doc_id)
    }

    pub fn list_materials(&self) -> Result<Vec<Material>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(MATERIALS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (_k, v) = entry?;
            result.push(serde_json::from_slice(v.value())?);
        }
        Ok(result)
    }

    pub fn set_material_status(
        &self,
        doc_id: &str,
        status: MaterialStatus,
    ) -> Result<()> {
        self.update_json(MATERIALS, "material", doc_id, |m: &mut Material| {
            m.status = status;
        })
    }

    /// Remove a material with its TOC analysis, sections and chunks.
    pub fn remove_material(&self, doc_id: &str) -> Result<bool> {
        let prefix = format!("{doc_id}\0");
        let txn = self.db.begin_write()?;
        let removed = {
            let mut materials = txn.open_table(MATERIALS)?;
            let removed = materials.remove(doc_id)?.is_some();
            txn.open_table(TOC_ANALYSES)?.remove(doc_id)?;
            remove_prefix(&mut txn.open_table(SECTIONS)?, &prefix)?;
            remove_prefix(&mut txn.open_table(CHUNKS)?, &prefix)?;
            removed
        };
        txn.commit()?;
        Ok(removed)
    }

    // -- TOC analyses --

    pub fn put_toc_analysis(&self, toc: &TocAnalysis) -> Result<()> {
        self.put_json(TOC_ANALYSES, &toc.doc_id, toc)
    }

    pub fn get_toc_analysis(&self, doc_id: &str) -> Result<Option<TocAnalysis>> {
        self.get_json(TOC_ANALYSES, doc_id)
    }

    /// Flag one TOC section as processed and bump the processed counter,
    /// in a single transaction. Returns `false` when it was already set.
    pub fn mark_toc_section_processed(
        &self,
        doc_id: &str,
        index: usize,
    ) -> Result<bool> {
        let mut changed = false;
        let mark = |toc: &mut TocAnalysis| {
            if let Some(section) = toc.sections.get_mut(index)
                && !section.processed
            {
                section.processed = true;
                toc.processed_sections += 1;
                changed = true;
            }
        };
        self.update_json(TOC_ANALYSES, "toc analysis", doc_id, mark)?;
        Ok(changed)
    }

    // -- Sections --

    pub fn upsert_section(&self, section: &DocumentSection) -> Result<()> {
        let key = record_key(&section.doc_id, &section.section_id);
        self.put_json(SECTIONS, &key, section)
    }

    pub fn get_section(
        &self,
        doc_id: &str,
        section_id: &str,
    ) -> Result<Option<DocumentSection>> {
        self.get_json(SECTIONS, &record_key(doc_id, section_id))
    }

    /// Attach the vector store's identifier to a saved section.
    pub fn set_section_vector_id(
        &self,
        doc_id: &str,
        section_id: &str,
        vector_id: &str,
    ) -> Result<()> {
        let key = record_key(doc_id, section_id);
        self.update_json(SECTIONS, "section", &key, |s: &mut DocumentSection| {
            s.vector_id = Some(vector_id.to_string());
        })
    }

    /// All sections of a material in document order.
    pub fn list_sections(&self, doc_id: &str) -> Result<Vec<DocumentSection>> {
        let mut sections: Vec<DocumentSection> =
            self.scan_json(SECTIONS, &format!("{doc_id}\0"))?;
        sections.sort_by_key(|s| section_order(&s.section_id));
        Ok(sections)
    }

    /// Ids of every saved section of a material, in document order.
    pub fn list_section_ids(&self, doc_id: &str) -> Result<Vec<String>> {
        let prefix = format!("{doc_id}\0");
        let end = prefix_end(&prefix);
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SECTIONS)?;
        let mut ids = Vec::new();
        for entry in table.range::<&str>(prefix.as_str()..end.as_str())? {
            let (k, _) = entry?;
            if let Some(id) = k.value().strip_prefix(prefix.as_str()) {
                ids.push(id.to_string());
            }
        }
        ids.sort_by_key(|id| section_order(id));
        Ok(ids)
    }

    /// Remove one section part and its chunks in a single transaction.
    pub fn remove_section(
        &self,
        doc_id: &str,
        section_id: &str,
    ) -> Result<bool> {
        let key = record_key(doc_id, section_id);
        let chunk_prefix = format!("{key}_c");
        let txn = self.db.begin_write()?;
        let removed = {
            let mut sections = txn.open_table(SECTIONS)?;
            let removed = sections.remove(key.as_str())?.is_some();
            remove_prefix(&mut txn.open_table(CHUNKS)?, &chunk_prefix)?;
            removed
        };
        txn.commit()?;
        Ok(removed)
    }

    /// Remove every section and chunk of a material, keeping the material
    /// and its TOC analysis. Returns the removed section ids.
    pub fn clear_sections(&self, doc_id: &str) -> Result<Vec<String>> {
        let ids = self.list_section_ids(doc_id)?;
        let prefix = format!("{doc_id}\0");
        let txn = self.db.begin_write()?;
        remove_prefix(&mut txn.open_table(SECTIONS)?, &prefix)?;
        remove_prefix(&mut txn.open_table(CHUNKS)?, &prefix)?;
        txn.commit()?;
        Ok(ids)
    }

    // -- Chunks --

    /// Replace every chunk of one section part in a single transaction.
    pub fn replace_section_chunks(
        &self,
        doc_id: &str,
        section_id: &str,
        chunks: &[DocumentChunk],
    ) -> Result<()> {
        let prefix = format!("{doc_id}\0{section_id}_c");
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(CHUNKS)?;
            remove_prefix(&mut table, &prefix)?;
            for chunk in chunks {
                let key = record_key(&chunk.doc_id, &chunk.chunk_id);
                let bytes = serde_json::to_vec(chunk)?;
                table.insert(key.as_str(), bytes.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// All chunks of a material in document order.
    pub fn list_chunks(&self, doc_id: &str) -> Result<Vec<DocumentChunk>> {
        let mut chunks: Vec<DocumentChunk> =
            self.scan_json(CHUNKS, &format!("{doc_id}\0"))?;
        chunks.sort_by(|a, b| {
            section_order(&a.section_id)
                .cmp(&section_order(&b.section_id))
                .then(a.paragraph_idx.cmp(&b.paragraph_idx))
        });
        Ok(chunks)
    }

    // -- Settings --

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SETTINGS)?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }

    /// Get a setting, returning the default if not set.
    pub fn get_setting_or(&self, key: &str, default: &str) -> Result<String> {
        Ok(self
            .get_setting(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    pub fn remove_setting(&self, key: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(SETTINGS)?;
            table.remove(key)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    pub fn list_settings(&self) -> Result<Vec<(String, String)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            result.push((k.value().to_string(), v.value().to_string()));
        }
        Ok(result)
    }

    // -- JSON helpers --

    fn put_json<T: Serialize>(
        &self,
        def: TableDefinition<&str, &[u8]>,
        key: &str,
        value: &T,
    ) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(def)?;
            table.insert(key, bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        def: TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> Result<Option<T>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(def)?;
        match table.get(key)? {
            Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
            None => Ok(None),
        }
    }

    /// Read-modify-write of one record inside a write transaction.
    fn update_json<T, F>(
        &self,
        def: TableDefinition<&str, &[u8]>,
        kind: &'static str,
        key: &str,
        update: F,
    ) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut T),
    {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(def)?;
            let mut value: T = match table.get(key)? {
                Some(v) => serde_json::from_slice(v.value())?,
                None => {
                    return Err(Error::NotFound {
                        kind,
                        name: key.replace('\0', "/"),
                    });
                }
            };
            update(&mut value);
            let bytes = serde_json::to_vec(&value)?;
            table.insert(key, bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    fn scan_json<T: DeserializeOwned>(
        &self,
        def: TableDefinition<&str, &[u8]>,
        prefix: &str,
    ) -> Result<Vec<T>> {
        let end = prefix_end(prefix);
        let txn = self.db.begin_read()?;
        let table = txn.open_table(def)?;
        let mut result = Vec::new();
        for entry in table.range::<&str>(prefix..end.as_str())? {
            let (_k, v) = entry?;
            result.push(serde_json::from_slice(v.value())?);
        }
        Ok(result)
    }
}

impl std::fmt::Debug for SectionDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectionDb").finish_non_exhaustive()
    }
}

fn record_key(doc_id: &str, id: &str) -> String {
    format!("{doc_id}\0{id}")
}

/// Smallest string greater than every string starting with `prefix`.
/// Prefixes always end in an ASCII char.
fn prefix_end(prefix: &str) -> String {
    let mut end = prefix.to_string();
    if let Some(last) = end.pop() {
        end.push(char::from_u32(last as u32 + 1).unwrap_or(char::MAX));
    }
    end
}

/// Document order of section ids; malformed ids sort last.
fn section_order(section_id: &str) -> (usize, usize, String) {
    match SectionId::parse(section_id) {
        Some(id) => (id.toc_index(), id.part().unwrap_or(0), String::new()),
        None => (usize::MAX, 0, section_id.to_string()),
    }
}

fn remove_prefix(
    table: &mut redb::Table<'_, &'static str, &'static [u8]>,
    prefix: &str,
) -> Result<()> {
    let end = prefix_end(prefix);
    let keys: Vec<String> = table
        .range::<&str>(prefix..end.as_str())?
        .map(|entry| entry.map(|(k, _)| k.value().to_string()))
        .collect::<std::result::Result<_, _>>()?;
    for key in keys {
        table.remove(key.as_str())?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::material::TocSection;

    pub(crate) fn test_db() -> (tempfile::TempDir, SectionDb) {
        let tmp = tempfile::tempdir().unwrap();
        let db = SectionDb::open(&tmp.path().join("sections.redb")).unwrap();
        (tmp, db)
    }

    pub(crate) fn material(doc_id: &str, subject_id: &str) -> Material {
        Material {
            doc_id: doc_id.to_string(),
            name: format!("Material {doc_id}"),
            subject_id: subject_id.to_string(),
            faculty_id: Some("etf".to_string()),
            department_id: Some("rti".to_string()),
            year: Some(2),
            abstract_text: None,
            status: MaterialStatus::Pending,
        }
    }

    fn section(doc_id: &str, section_id: &str) -> DocumentSection {
        DocumentSection {
            doc_id: doc_id.to_string(),
            section_id: section_id.to_string(),
            title: "1 Uvod".to_string(),
            clean_title: "Uvod".to_string(),
            path: "1".to_string(),
            level: 1,
            page_start: 1,
            page_end: 2,
            char_start: 0,
            char_end: 4,
            content: "Uvod".to_string(),
            parent_section_id: None,
            semantic_type: "chapter".to_string(),
            part_index: 1,
            part_count: 1,
            subject_id: "s1".to_string(),
            faculty_id: None,
            department_id: None,
            year: None,
            vector_id: None,
        }
    }

    fn chunk(doc_id: &str, section_id: &str, idx: usize) -> DocumentChunk {
        DocumentChunk {
            doc_id: doc_id.to_string(),
            chunk_id: SectionId::parse(section_id).unwrap().chunk_id(idx),
            section_id: section_id.to_string(),
            title: "Uvod".to_string(),
            path: "1".to_string(),
            page: 1,
            paragraph_idx: idx,
            char_start: 0,
            char_end: 1,
            content: format!("chunk {idx}"),
        }
    }

    #[test]
    fn materials_crud() {
        let (_tmp, db) = test_db();
        assert!(db.get_material("m1").unwrap().is_none());

        db.put_material(&material("m1", "s1")).unwrap();
        db.set_material_status("m1", MaterialStatus::Ready).unwrap();

        let m = db.get_material("m1").unwrap().unwrap();
        assert_eq!(m.status, MaterialStatus::Ready);
        assert_eq!(db.list_materials().unwrap().len(), 1);
    }

    #[test]
    fn status_update_on_missing_material_fails() {
        let (_tmp, db) = test_db();
        let err = db
            .set_material_status("ghost", MaterialStatus::Ready)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "material", .. }));
    }

    #[test]
    fn mark_processed_is_targeted_and_idempotent() {
        let (_tmp, db) = test_db();
        let toc = TocAnalysis::new(
            "m1",
            vec![TocSection::new("1 A", 1, 2), TocSection::new("2 B", 3, 4)],
        );
        db.put_toc_analysis(&toc).unwrap();

        assert!(db.mark_toc_section_processed("m1", 1).unwrap());
        assert!(!db.mark_toc_section_processed("m1", 1).unwrap());
        assert!(!db.mark_toc_section_processed("m1", 9).unwrap());

        let toc = db.get_toc_analysis("m1").unwrap().unwrap();
        assert!(!toc.sections[0].processed);
        assert!(toc.sections[1].processed);
        assert_eq!(toc.processed_sections, 1);
    }

    #[test]
    fn sections_upsert_not_duplicate() {
        let (_tmp, db) = test_db();
        db.upsert_section(&section("m1", "sec_000")).unwrap();
        let mut updated = section("m1", "sec_000");
        updated.content = "Novi uvod".to_string();
        db.upsert_section(&updated).unwrap();

        let sections = db.list_sections("m1").unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].content, "Novi uvod");
    }

    #[test]
    fn sections_listed_in_document_order() {
        let (_tmp, db) = test_db();
        for id in [
            "sec_1000",
            "sec_002_embedpart10",
            "sec_002_embedpart2",
            "sec_999",
            "sec_002_embedpart1",
        ] {
            db.upsert_section(&section("m1", id)).unwrap();
        }
        db.upsert_section(&section("m2", "sec_000")).unwrap();

        let ids: Vec<_> = db
            .list_sections("m1")
            .unwrap()
            .into_iter()
            .map(|s| s.section_id)
            .collect();
        assert_eq!(
            ids,
            [
                "sec_002_embedpart1",
                "sec_002_embedpart2",
                "sec_002_embedpart10",
                "sec_999",
                "sec_1000"
            ]
        );
    }

    #[test]
    fn remove_section_takes_its_chunks() {
        let (_tmp, db) = test_db();
        db.upsert_section(&section("m1", "sec_001")).unwrap();
        db.upsert_section(&section("m1", "sec_001_embedpart1")).unwrap();
        db.replace_section_chunks("m1", "sec_001", &[chunk("m1", "sec_001", 0)])
            .unwrap();
        db.replace_section_chunks(
            "m1",
            "sec_001_embedpart1",
            &[chunk("m1", "sec_001_embedpart1", 0)],
        )
        .unwrap();

        assert!(db.remove_section("m1", "sec_001").unwrap());
        assert!(!db.remove_section("m1", "sec_001").unwrap());

        assert_eq!(db.list_section_ids("m1").unwrap(), ["sec_001_embedpart1"]);
        let chunks = db.list_chunks("m1").unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].section_id, "sec_001_embedpart1");
    }

    #[test]
    fn clear_sections_keeps_material_and_other_documents() {
        let (_tmp, db) = test_db();
        db.put_material(&material("m1", "s1")).unwrap();
        for id in ["sec_000", "sec_001"] {
            db.upsert_section(&section("m1", id)).unwrap();
            db.replace_section_chunks("m1", id, &[chunk("m1", id, 0)])
                .unwrap();
        }
        db.upsert_section(&section("m10", "sec_000")).unwrap();

        let removed = db.clear_sections("m1").unwrap();

        assert_eq!(removed, ["sec_000", "sec_001"]);
        assert!(db.list_sections("m1").unwrap().is_empty());
        assert!(db.list_chunks("m1").unwrap().is_empty());
        assert!(db.get_material("m1").unwrap().is_some());
        assert_eq!(db.list_section_ids("m10").unwrap(), ["sec_000"]);
    }

    #[test]
    fn vector_id_attached() {
        let (_tmp, db) = test_db();
        db.upsert_section(&section("m1", "sec_000")).unwrap();
        db.set_section_vector_id("m1", "sec_000", "vec_1").unwrap();

        let s = db.get_section("m1", "sec_000").unwrap().unwrap();
        assert_eq!(s.vector_id.as_deref(), Some("vec_1"));
        assert!(db.set_section_vector_id("m1", "sec_404", "vec_2").is_err());
    }

    #[test]
    fn replace_chunks_drops_stale_entries() {
        let (_tmp, db) = test_db();
        let three: Vec<_> = (0..3).map(|i| chunk("m1", "sec_000", i)).collect();
        db.replace_section_chunks("m1", "sec_000", &three).unwrap();
        let other = vec![chunk("m1", "sec_000_embedpart1", 0)];
        db.replace_section_chunks("m1", "sec_000_embedpart1", &other)
            .unwrap();

        let one = vec![chunk("m1", "sec_000", 0)];
        db.replace_section_chunks("m1", "sec_000", &one).unwrap();

        let chunks = db.list_chunks("m1").unwrap();
        let ids: Vec<_> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, ["sec_000_c0000", "sec_000_embedpart1_c0000"]);
    }

    #[test]
    fn remove_material_cascades() {
        let (_tmp, db) = test_db();
        db.put_material(&material("m1", "s1")).unwrap();
        db.put_toc_analysis(&TocAnalysis::new("m1", vec![])).unwrap();
        db.upsert_section(&section("m1", "sec_000")).unwrap();
        db.replace_section_chunks("m1", "sec_000", &[chunk("m1", "sec_000", 0)])
            .unwrap();
        db.upsert_section(&section("m10", "sec_000")).unwrap();

        assert!(db.remove_material("m1").unwrap());
        assert!(db.get_material("m1").unwrap().is_none());
        assert!(db.get_toc_analysis("m1").unwrap().is_none());
        assert!(db.list_sections("m1").unwrap().is_empty());
        assert!(db.list_chunks("m1").unwrap().is_empty());
        assert_eq!(db.list_sections("m10").unwrap().len(), 1);
        assert!(!db.remove_material("m1").unwrap());
    }

    #[test]
    fn settings_crud() {
        let (_tmp, db) = test_db();

        assert_eq!(db.get_setting("chunk_size").unwrap(), None);
        assert_eq!(db.get_setting_or("chunk_size", "2000").unwrap(), "2000");

        db.set_setting("chunk_size", "1500").unwrap();
        assert_eq!(db.get_setting_or("chunk_size", "2000").unwrap(), "1500");
        assert_eq!(db.list_settings().unwrap().len(), 1);

        assert!(db.remove_setting("chunk_size").unwrap());
        assert!(!db.remove_setting("chunk_size").unwrap());
    }

    #[test]
    fn reopen_preserves_data() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sections.redb");

        {
            let db = SectionDb::open(&path).unwrap();
            db.put_material(&material("m1", "s1")).unwrap();
            db.set_setting("top_k", "3").unwrap();
        }

        {
            let db = SectionDb::open(&path).unwrap();
            assert!(db.get_material("m1").unwrap().is_some());
            assert_eq!(db.get_setting("top_k").unwrap().as_deref(), Some("3"));
        }
    }
}
