//! Unified error handling for the trail-planner library.
//!
//! Errors are deliberately rare here: missing or insufficient data (no
//! elevation, no POI within radius, an empty stage table) is modeled as
//! `Option`/empty collections and flows through the planner as ordinary
//! values. `PlannerError` covers the cases where an operation genuinely
//! cannot proceed: unreadable input files and collaborator client setup.

use thiserror::Error;

/// Unified error type for trail-planner operations.
#[derive(Debug, Error)]
pub enum PlannerError {
    /// The GPX source could not be read or parsed at all.
    ///
    /// Individual malformed points inside an otherwise readable file are
    /// skipped during parsing and never surface as this error.
    #[error("Failed to read GPX source: {0}")]
    GpxRead(String),

    /// The GPX output could not be written.
    #[error("Failed to write GPX output: {0}")]
    GpxWrite(String),

    /// A collaborator HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Result type alias for trail-planner operations.
pub type Result<T> = std::result::Result<T, PlannerError>;
