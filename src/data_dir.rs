use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const DATA_DIR_ENV_VAR: &str = "DOCSECT_DATA_DIR";

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path (from --data-dir)
    /// 2. The DOCSECT_DATA_DIR environment variable
    /// 3. The XDG data directory (~/.local/share/docsect/)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = if let Some(path) = explicit {
            path.to_path_buf()
        } else if let Ok(val) = std::env::var(DATA_DIR_ENV_VAR) {
            PathBuf::from(val)
        } else {
            xdg::BaseDirectories::with_prefix("docsect")
                .get_data_home()
                .ok_or_else(|| {
                    Error::Config(
                        "could not determine XDG data home directory".into(),
                    )
                })?
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sections, chunks, TOC analyses, materials and settings.
    pub fn sections_db(&self) -> PathBuf {
        self.root.join("sections.redb")
    }

    /// Vector registrations made by the local vector store.
    pub fn vectors_db(&self) -> PathBuf {
        self.root.join("vectors.redb")
    }
}
