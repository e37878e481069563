//! Tunables persisted in the `settings` table.
//!
//! Every key has a compiled-in default; a stored value overrides it. Values
//! are validated both when set and when read back.

use std::str::FromStr;

use crate::{
    chunking::ChunkingConfig,
    error::{Error, Result},
    retrieval::ScoringConfig,
    store::SectionDb,
};

pub const EMBED_CEILING: &str = "embed_ceiling";
pub const CHUNK_SIZE: &str = "chunk_size";
pub const MAX_PARTS: &str = "max_parts";
pub const MIN_SECTION_CHARS: &str = "min_section_chars";
pub const SCORE_CHUNK_WITH_VECTOR: &str = "score.chunk_with_vector";
pub const SCORE_CHUNK_WITHOUT_VECTOR: &str = "score.chunk_without_vector";
pub const SCORE_TOC_ONLY: &str = "score.toc_only";
pub const SCORE_TOC_BONUS: &str = "score.toc_bonus";
pub const SCORE_TOP_K: &str = "score.top_k";

/// Every recognised setting key.
pub const KNOWN_KEYS: [&str; 9] = [
    EMBED_CEILING,
    CHUNK_SIZE,
    MAX_PARTS,
    MIN_SECTION_CHARS,
    SCORE_CHUNK_WITH_VECTOR,
    SCORE_CHUNK_WITHOUT_VECTOR,
    SCORE_TOC_ONLY,
    SCORE_TOC_BONUS,
    SCORE_TOP_K,
];

enum Kind {
    /// A count that must be at least 1.
    Count,
    /// A count that may be 0.
    Size,
    /// A relevance value in `[0, 1]`.
    Score,
}

fn kind_of(key: &str) -> Option<Kind> {
    match key {
        EMBED_CEILING | CHUNK_SIZE | MAX_PARTS | SCORE_TOP_K => {
            Some(Kind::Count)
        }
        MIN_SECTION_CHARS => Some(Kind::Size),
        SCORE_CHUNK_WITH_VECTOR
        | SCORE_CHUNK_WITHOUT_VECTOR
        | SCORE_TOC_ONLY
        | SCORE_TOC_BONUS => Some(Kind::Score),
        _ => None,
    }
}

/// Check that `key` is known and `value` parses for it.
pub fn validate(key: &str, value: &str) -> Result<()> {
    let kind = kind_of(key).ok_or_else(|| {
        Error::Config(format!(
            "unknown setting '{key}' (known: {})",
            KNOWN_KEYS.join(", ")
        ))
    })?;

    let ok = match kind {
        Kind::Count => value.parse::<usize>().is_ok_and(|n| n >= 1),
        Kind::Size => value.parse::<usize>().is_ok(),
        Kind::Score => value
            .parse::<f64>()
            .is_ok_and(|v| (0.0..=1.0).contains(&v)),
    };
    if ok {
        Ok(())
    } else {
        let expected = match kind {
            Kind::Count => "a positive integer",
            Kind::Size => "a non-negative integer",
            Kind::Score => "a number between 0 and 1",
        };
        Err(Error::Config(format!(
            "invalid value '{value}' for '{key}': expected {expected}"
        )))
    }
}

/// The default value of a setting, as it would be stored.
pub fn default_value(key: &str) -> Option<String> {
    let chunking = ChunkingConfig::default();
    let scoring = ScoringConfig::default();
    let value = match key {
        EMBED_CEILING => chunking.embed_ceiling.to_string(),
        CHUNK_SIZE => chunking.chunk_size.to_string(),
        MAX_PARTS => chunking.max_parts.to_string(),
        MIN_SECTION_CHARS => chunking.min_section_chars.to_string(),
        SCORE_CHUNK_WITH_VECTOR => scoring.chunk_with_vector.to_string(),
        SCORE_CHUNK_WITHOUT_VECTOR => scoring.chunk_without_vector.to_string(),
        SCORE_TOC_ONLY => scoring.toc_only.to_string(),
        SCORE_TOC_BONUS => scoring.toc_bonus.to_string(),
        SCORE_TOP_K => scoring.top_k.to_string(),
        _ => return None,
    };
    Some(value)
}

/// Chunking parameters with stored overrides applied.
pub fn chunking_config(db: &SectionDb) -> Result<ChunkingConfig> {
    let defaults = ChunkingConfig::default();
    Ok(ChunkingConfig {
        embed_ceiling: setting(db, EMBED_CEILING, defaults.embed_ceiling)?,
        chunk_size: setting(db, CHUNK_SIZE, defaults.chunk_size)?,
        max_parts: setting(db, MAX_PARTS, defaults.max_parts)?,
        min_section_chars: setting(
            db,
            MIN_SECTION_CHARS,
            defaults.min_section_chars,
        )?,
        cut_window: defaults.cut_window,
    })
}

/// Retrieval scoring parameters with stored overrides applied.
pub fn scoring_config(db: &SectionDb) -> Result<ScoringConfig> {
    let defaults = ScoringConfig::default();
    Ok(ScoringConfig {
        chunk_with_vector: setting(
            db,
            SCORE_CHUNK_WITH_VECTOR,
            defaults.chunk_with_vector,
        )?,
        chunk_without_vector: setting(
            db,
            SCORE_CHUNK_WITHOUT_VECTOR,
            defaults.chunk_without_vector,
        )?,
        toc_only: setting(db, SCORE_TOC_ONLY, defaults.toc_only)?,
        toc_bonus: setting(db, SCORE_TOC_BONUS, defaults.toc_bonus)?,
        top_k: setting(db, SCORE_TOP_K, defaults.top_k)?,
    })
}

fn setting<T: FromStr>(db: &SectionDb, key: &str, default: T) -> Result<T> {
    match db.get_setting(key)? {
        Some(raw) => {
            validate(key, &raw)?;
            raw.parse().map_err(|_| {
                Error::Config(format!("invalid value '{raw}' for '{key}'"))
            })
        }
        None => Ok(default),
    }
}
