//! Error types for the import engine.
//!
//! Only defects and infrastructure failures are errors here. Expected
//! conditions (malformed CSV, a header missing required columns, rows that
//! fail validation) are folded into a [`crate::report::Report`] instead.
//!
//! - [`CsvError`] - malformed input, carried by `invalid_csv` reports
//! - [`ConfigError`] - column declarations, identifiers, job definitions
//! - [`ModelError`] - model adapter infrastructure (store files, commits)
//! - [`ImportError`] - top-level error returned by the importer
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use serde::Serialize;
use thiserror::Error;

// =============================================================================
// CSV Parsing Errors
// =============================================================================

/// Malformed CSV input.
///
/// `line` is the 1-based physical line the defect was found on. The message
/// already names the line so it can be shown to users as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{message}")]
pub struct CsvError {
    pub line: usize,
    pub message: String,
}

impl CsvError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }

    pub fn unclosed_quote(line: usize) -> Self {
        Self::new(line, format!("Unclosed quoted field on line {}.", line))
    }

    pub fn illegal_quoting(line: usize) -> Self {
        Self::new(line, format!("Illegal quoting on line {}.", line))
    }

    pub fn value_after_quote(line: usize) -> Self {
        Self::new(
            line,
            format!("Any value after quoted field isn't allowed on line {}.", line),
        )
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Invalid import configuration. These are programmer errors and are never
/// turned into a report.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Two column declarations share a key.
    #[error("Column '{0}' is declared more than once")]
    DuplicateColumn(String),

    /// The identifier does not name a declared column.
    #[error("Identifier '{0}' is not a declared column")]
    UnknownIdentifier(String),

    /// A header or format pattern failed to compile.
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A job column sets both `to` and `timestamp`.
    #[error("Column '{0}' sets both 'to' and 'timestamp'")]
    ConflictingTransform(String),

    /// A delimiter that is not a single ASCII character.
    #[error("Invalid delimiter '{0}': expected a single ASCII character")]
    InvalidDelimiter(String),

    /// No `content`, `file` or `path` was given.
    #[error("No input source given: set one of content, file or path")]
    MissingSource,

    /// More than one of `content`, `file` and `path` was given.
    #[error("Input sources are mutually exclusive, got: {0}")]
    ConflictingSources(String),

    /// Job definition could not be read.
    #[error("Invalid job definition: {0}")]
    Job(#[from] serde_json::Error),

    /// Job definition file could not be opened.
    #[error("Cannot read job definition: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Model Adapter Errors
// =============================================================================

/// Failures of the persistence layer itself, as opposed to records that
/// fail validation.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Store file could not be read or written.
    #[error("Store IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Store file is not valid JSON.
    #[error("Store JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The adapter refused to commit a transaction.
    #[error("Transaction failed: {0}")]
    Transaction(String),
}

// =============================================================================
// Import Errors (top-level)
// =============================================================================

/// Top-level error returned by [`crate::importer::Importer`].
#[derive(Debug, Error)]
pub enum ImportError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Model adapter error.
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Input could not be read.
    #[error("Cannot read input: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed CSV, only surfaced by inspection helpers; runs report it.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for model adapter operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Result type for import runs.
pub type ImportResult<T> = Result<T, ImportError>;
