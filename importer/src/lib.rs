//! # csv-importer - header-matching CSV imports with find-or-create persistence
//!
//! Maps loosely named CSV columns onto the attributes of an external model,
//! finds or builds one record per row, saves it, and summarizes the run in a
//! single [`Report`].
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  CSV input  │────▶│   Parser    │────▶│   Header    │────▶│  Row + Bind │────▶ Report
//! │ (str/io/fs) │     │ (encodings) │     │  resolver   │     │ (adapter)   │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use csv_importer::{ColumnSpec, DocumentStore, ImportConfig, Importer, Document};
//! use serde_json::Value;
//!
//! let config: ImportConfig<Document> = ImportConfig::new()
//!     .column(ColumnSpec::new("email").required().to(|raw| Value::from(raw.map(str::to_lowercase))))
//!     .column(ColumnSpec::new("first_name"))
//!     .identifier("email");
//!
//! let mut store = DocumentStore::in_memory();
//! let report = Importer::new(&config)
//!     .content("Email,First name\nBOB@example.com,bob\n")
//!     .run(&mut store)
//!     .unwrap();
//!
//! assert!(report.success());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types
//! - [`parser`] - Input sources, decoding and quoting checks
//! - [`columns`] - Column declarations and header resolution
//! - [`transform`] - Row extraction, identity resolution, operation chains
//! - [`models`] - Model adapter contract and the JSON document store
//! - [`importer`] - Configuration, runs and job definitions
//! - [`report`] - Run reports and their serializable summary

// Core modules
pub mod error;
pub mod models;

// Parsing
pub mod parser;
pub mod columns;

// Transformation
pub mod transform;

// Runs
pub mod importer;
pub mod report;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, ConfigResult, CsvError, CsvResult, ImportError, ImportResult, ModelError,
    ModelResult,
};

// =============================================================================
// Re-exports - Columns
// =============================================================================

pub use columns::{normalize, ColumnSpec, Header, Matcher, Pattern, Transform};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::document::{Document, DocumentStore, ValidationRule};
pub use models::{Model, ModelAdapter, ModelErrors};

// =============================================================================
// Re-exports - Transformation
// =============================================================================

pub use transform::{operations_description, Operation, Row, RowStatus};

// =============================================================================
// Re-exports - Runs
// =============================================================================

pub use importer::job::JobDefinition;
pub use importer::{ImportConfig, Importer, InvalidPolicy};
pub use report::{ImportStatus, Report, ReportSummary};
