use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

/// Prefix of every section identifier.
const SECTION_PREFIX: &str = "sec_";

/// Infix marking an embedding-safe part of an oversized section.
const PART_INFIX: &str = "_embedpart";

/// Stable identifier of a section (or one of its embedding-safe parts)
/// within a material.
///
/// Shape: `sec_NNN` where `NNN` is the zero-padded TOC index (at least
/// three digits), optionally followed by `_embedpartN` with a 1-based
/// part number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SectionId {
    toc_index: usize,
    part: Option<usize>,
}

impl SectionId {
    pub fn new(toc_index: usize) -> Self {
        Self {
            toc_index,
            part: None,
        }
    }

    /// The identifier of the `part`-th (1-based) embedding-safe part.
    pub fn with_part(&self, part: usize) -> Self {
        Self {
            toc_index: self.toc_index,
            part: Some(part),
        }
    }

    pub fn toc_index(&self) -> usize {
        self.toc_index
    }

    pub fn part(&self) -> Option<usize> {
        self.part
    }

    /// Parse an identifier, returning `None` when it does not have the
    /// expected shape.
    pub fn parse(s: &str) -> Option<Self> {
        let rest = s.strip_prefix(SECTION_PREFIX)?;
        let (index, part) = match rest.split_once(PART_INFIX) {
            Some((index, part)) => (index, Some(part)),
            None => (rest, None),
        };

        if index.len() < 3 || !is_ascii_digits(index) {
            return None;
        }
        let toc_index = index.parse().ok()?;

        let part = match part {
            Some(p) if is_ascii_digits(p) && !p.starts_with('0') => {
                Some(p.parse().ok()?)
            }
            Some(_) => return None,
            None => None,
        };

        Some(Self { toc_index, part })
    }

    /// Identifier of the chunk with sequence number `paragraph_idx`.
    pub fn chunk_id(&self, paragraph_idx: usize) -> String {
        format!("{self}_c{paragraph_idx:04}")
    }
}

impl std::fmt::Display for SectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{SECTION_PREFIX}{:03}", self.toc_index)?;
        if let Some(part) = self.part {
            write!(f, "{PART_INFIX}{part}")?;
        }
        Ok(())
    }
}

fn is_ascii_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Derive a stable vector identifier for a section registration.
///
/// The same (material, section, content) triple always maps to the same
/// identifier, so re-registering after a retry overwrites instead of
/// duplicating.
pub fn vector_id(doc_id: &str, section_id: &str, content: &str) -> String {
    let mut hasher = DefaultHasher::new();
    doc_id.hash(&mut hasher);
    section_id.hash(&mut hasher);
    content.hash(&mut hasher);
    format!("vec_{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_pads_index() {
        assert_eq!(SectionId::new(4).to_string(), "sec_004");
        assert_eq!(SectionId::new(1234).to_string(), "sec_1234");
    }

    #[test]
    fn part_suffix() {
        let id = SectionId::new(7).with_part(3);
        assert_eq!(id.to_string(), "sec_007_embedpart3");
        assert_eq!(id.toc_index(), 7);
        assert_eq!(id.part(), Some(3));
    }

    #[test]
    fn parse_accepts_display_output() {
        for id in [
            SectionId::new(0),
            SectionId::new(42),
            SectionId::new(5).with_part(1),
            SectionId::new(999).with_part(12),
        ] {
            assert_eq!(SectionId::parse(&id.to_string()), Some(id));
        }
    }

    #[test]
    fn parse_rejects_malformed() {
        for bad in [
            "",
            "sec_",
            "sec_1",
            "sec_12",
            "sec_abc",
            "section_001",
            "sec_001_embedpart",
            "sec_001_embedpart0",
            "sec_001_embedpartx",
            "507f1f77bcf86cd799439011",
        ] {
            assert_eq!(SectionId::parse(bad), None, "{bad:?} should fail");
        }
    }

    #[test]
    fn chunk_id_format() {
        let id = SectionId::new(3).with_part(2);
        assert_eq!(id.chunk_id(17), "sec_003_embedpart2_c0017");
    }

    #[test]
    fn vector_id_deterministic() {
        let a = vector_id("doc", "sec_001", "content");
        let b = vector_id("doc", "sec_001", "content");
        assert_eq!(a, b);
        assert_ne!(a, vector_id("doc", "sec_002", "content"));
        assert!(a.starts_with("vec_"));
        assert_eq!(a.len(), 4 + 16);
    }
}
