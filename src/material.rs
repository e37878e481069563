//! Upstream records consumed by ingestion: the material itself, its
//! extracted page texts and the TOC analysis computed for it.

use serde::{Deserialize, Serialize};

/// Processing state of a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialStatus {
    Pending,
    Processing,
    Ready,
    Failed,
}

/// An uploaded document. Read-only for ingestion apart from `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub doc_id: String,
    pub name: String,
    pub subject_id: String,
    #[serde(default)]
    pub faculty_id: Option<String>,
    #[serde(default)]
    pub department_id: Option<String>,
    #[serde(default)]
    pub year: Option<u32>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default = "default_status")]
    pub status: MaterialStatus,
}

fn default_status() -> MaterialStatus {
    MaterialStatus::Pending
}

/// Text of one physical page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageText {
    pub page_number: u32,
    pub text: String,
}

impl PageText {
    pub fn new(page_number: u32, text: impl Into<String>) -> Self {
        Self {
            page_number,
            text: text.into(),
        }
    }
}

/// A TOC entry with its declared page range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TocSection {
    pub title: String,
    #[serde(default)]
    pub clean_title: String,
    #[serde(default = "default_level")]
    pub level: u32,
    pub page_start: u32,
    pub page_end: u32,
    #[serde(default)]
    pub parent_section_id: Option<String>,
    #[serde(default = "default_semantic_type")]
    pub semantic_type: String,
    #[serde(default)]
    pub processed: bool,
}

fn default_level() -> u32 {
    1
}

fn default_semantic_type() -> String {
    "chapter".to_string()
}

impl TocSection {
    pub fn new(title: impl Into<String>, page_start: u32, page_end: u32) -> Self {
        let title = title.into();
        Self {
            clean_title: crate::title_match::normalize_title(&title),
            title,
            level: default_level(),
            page_start,
            page_end,
            parent_section_id: None,
            semantic_type: default_semantic_type(),
            processed: false,
        }
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    /// The title used for boundary search. Falls back to normalizing the
    /// raw title when the upstream analysis left `cleanTitle` empty.
    pub fn search_title(&self) -> String {
        if self.clean_title.trim().is_empty() {
            crate::title_match::normalize_title(&self.title)
        } else {
            crate::title_match::normalize_title(&self.clean_title)
        }
    }
}

/// The TOC analysis of one material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TocAnalysis {
    pub doc_id: String,
    pub sections: Vec<TocSection>,
    #[serde(default)]
    pub total_sections: usize,
    #[serde(default)]
    pub processed_sections: usize,
}

impl TocAnalysis {
    pub fn new(doc_id: impl Into<String>, sections: Vec<TocSection>) -> Self {
        let total_sections = sections.len();
        Self {
            doc_id: doc_id.into(),
            sections,
            total_sections,
            processed_sections: 0,
        }
    }
}

/// Input file accepted by `docsect ingest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestInput {
    pub material: Material,
    pub toc: TocAnalysis,
    pub pages: Vec<PageText>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toc_section_new_fills_clean_title() {
        let toc = TocSection::new("5.1 Hardver", 10, 15);
        assert_eq!(toc.clean_title, "Hardver");
        assert_eq!(toc.level, 1);
        assert!(!toc.processed);
    }

    #[test]
    fn search_title_falls_back_to_raw_title() {
        let mut toc = TocSection::new("2.3. Operativni sistemi", 1, 2);
        toc.clean_title.clear();
        assert_eq!(toc.search_title(), "Operativni sistemi");
    }

    #[test]
    fn ingest_input_from_camel_case_json() {
        let json = r#"{
            "material": {
                "docId": "m1",
                "name": "Racunari",
                "subjectId": "s1",
                "year": 2,
                "abstract": "Uvod"
            },
            "toc": {
                "docId": "m1",
                "sections": [
                    {"title": "1 Uvod", "pageStart": 1, "pageEnd": 2}
                ]
            },
            "pages": [{"pageNumber": 1, "text": "Uvod"}]
        }"#;

        let input: IngestInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.material.status, MaterialStatus::Pending);
        assert_eq!(input.material.abstract_text.as_deref(), Some("Uvod"));
        assert_eq!(input.toc.sections[0].level, 1);
        assert_eq!(input.toc.sections[0].semantic_type, "chapter");
        assert_eq!(input.pages[0].page_number, 1);
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&MaterialStatus::Ready).unwrap();
        assert_eq!(json, "\"ready\"");
    }
}
