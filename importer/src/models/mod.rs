//! The persistence model contract.
//!
//! The import engine never stores anything itself. It talks to an externally
//! owned model through two traits:
//!
//! - [`Model`] - one record: attribute access, validation errors, persisted state
//! - [`ModelAdapter`] - the store: lookup, construction, validation, saving,
//!   and an optional transactional scope around a whole run
//!
//! [`document::DocumentStore`] is a ready-made adapter for schemaless JSON
//! documents, used by the CLI and the test-suite.

pub mod document;

use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::ModelResult;

/// Validation errors by attribute name.
pub type ModelErrors = BTreeMap<String, Vec<String>>;

/// One record of the persistence model.
pub trait Model {
    /// Read an attribute.
    fn get(&self, attribute: &str) -> Option<Value>;

    /// Assign an attribute.
    fn set(&mut self, attribute: &str, value: Value);

    /// Errors recorded by the last validation or save.
    fn errors(&self) -> &ModelErrors;

    /// Whether the record exists in the store.
    fn is_persisted(&self) -> bool;
}

/// The store a run imports into.
pub trait ModelAdapter {
    type Model: Model;

    /// First record whose `attribute` equals `value`.
    fn find_by(&self, attribute: &str, value: &Value) -> Option<Self::Model>;

    /// A new, unsaved record.
    fn build(&self) -> Self::Model;

    /// Check `model`, recording errors on it. Returns true when valid.
    fn validate(&self, model: &mut Self::Model) -> bool;

    /// Validate and persist `model`. Returns true on success; on failure the
    /// reasons are left in `model.errors()`.
    fn save(&mut self, model: &mut Self::Model) -> bool;

    /// Run a whole import inside the adapter's transactional scope.
    ///
    /// The adapter decides what that scope means; the default simply runs
    /// the block.
    fn transaction<R, F>(&mut self, run: F) -> ModelResult<R>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> R,
    {
        Ok(run(self))
    }
}
