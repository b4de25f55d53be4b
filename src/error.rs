// ⚠️ Error taxonomy
// Structural failures abort a pass; row and segment failures are values the caller absorbs

use thiserror::Error;

// ============================================================================
// FATAL ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ExtractError {
    /// A required column is absent from the whole input table
    #[error("Required column missing from input table: {column}")]
    MissingColumn { column: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ExtractError>;

// ============================================================================
// SKIPPABLE OUTCOMES
// ============================================================================

/// Why a row was dropped from every output table
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("no digit run in identifier cell {0:?}")]
    NoIdentifier(String),

    #[error("identifier {0:?} does not fit in a u64")]
    IdentifierOverflow(String),
}

/// Why a single segment of a multi-value cell was dropped
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SegmentError {
    #[error("segment {0:?} has no \" : \" separator")]
    MissingCodeSeparator(String),

    #[error("segment {0:?} has no \" - \" separator")]
    MissingNameSeparator(String),

    #[error("segment {0:?} has an empty code")]
    EmptyCode(String),
}
