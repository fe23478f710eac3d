//! Error types for diaflux

use thiserror::Error;

/// Errors surfaced by the export engine.
///
/// All of these are fatal to the single day (or range) being computed; the
/// engine never returns partial results. Malformed individual records are not
/// errors at all, they are dropped during parsing.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Invalid date: {0}; expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Invalid time zone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid date range: {0}")]
    InvalidRange(String),

    #[error("No usable profile store found")]
    NoProfileStore,

    #[error("Baseline schedule is empty for {0}; cannot compute basal")]
    EmptyBaseline(String),

    #[error("No segments were produced for {0}")]
    NoSegmentsProduced(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Diary service error: {0}")]
    Service(String),
}
