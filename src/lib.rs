//! docsect - TOC-guided section extraction, chunking and retrieval for long
//! academic documents.
//!
//! A material arrives as page texts plus a table-of-contents analysis. Each
//! TOC section is cut out of its declared page range, its boundaries are
//! tightened around the section title, oversized content is split into
//! embedding-sized parts, and every part is chunked by paragraph and saved
//! together with a vector-store registration. Retrieval merges chunk hits
//! with TOC title matches into ranked sections; subject search ranks whole
//! materials lexically.
//!
//! # Quick start
//!
//! ```no_run
//! use docsect::{DataDir, LocalVectorStore, SectionDb};
//! use docsect::{chunking::ChunkingConfig, pipeline, retrieval};
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let db = SectionDb::open(&data_dir.sections_db()).unwrap();
//! let vectors = LocalVectorStore::open(&data_dir.vectors_db()).unwrap();
//!
//! let json = std::fs::read_to_string("material.json").unwrap();
//! let input = serde_json::from_str(&json).unwrap();
//! let report =
//!     pipeline::ingest_input(&db, &vectors, input, &ChunkingConfig::default())
//!         .unwrap();
//!
//! let candidates = retrieval::retrieve(
//!     &db,
//!     &vectors,
//!     &report.doc_id,
//!     "keš memorija",
//!     &retrieval::ScoringConfig::default(),
//! )
//! .unwrap();
//! for c in &candidates {
//!     println!("{} {} ({:.2})", c.path, c.section_title, c.relevance_score);
//! }
//! ```

pub mod chunk_index;
pub mod chunking;
pub mod config;
pub mod data_dir;
pub mod error;
pub mod extract;
pub mod ids;
pub mod material;
pub mod persist;
pub mod pipeline;
pub mod refine;
pub mod retrieval;
pub mod section;
pub mod store;
pub mod subject_search;
pub mod text_util;
pub mod title_match;
pub mod vector_store;

pub use data_dir::DataDir;
pub use error::{Error, Result};
pub use material::{IngestInput, Material, PageText, TocAnalysis, TocSection};
pub use store::SectionDb;
pub use vector_store::{LocalVectorStore, VectorStore};
