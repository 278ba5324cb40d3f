//! Transformation module.
//!
//! Turns parsed records into bound, persisted models:
//! - Row: cell extraction, transform application, error attribution
//! - Binder: identity resolution and save/validate classification
//! - Operations: declarative transform chains for job definitions

pub mod binder;
pub mod operations;
pub mod row;

pub use binder::{classify, resolve_identity, Binding};
pub use operations::{operations_description, Operation};
pub use row::{CellValues, Row, RowStatus};
