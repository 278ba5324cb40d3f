//! Model binding: identity resolution, then validation or persistence.

use serde_json::Value;

use super::row::{CellValues, RowStatus};
use crate::columns::{ColumnSpec, Transform};
use crate::models::{Model, ModelAdapter};

/// A model bound to a row, remembering whether it already existed.
#[derive(Debug, Clone)]
pub struct Binding<M> {
    pub model: M,
    pub existing: bool,
}

/// The identifier's value as it will be stored, i.e. after its transform.
///
/// Binary transforms assign through a model, so they run against a scratch
/// instance and the target attribute is read back.
pub fn identifier_value<A: ModelAdapter>(
    adapter: &A,
    spec: &ColumnSpec<A::Model>,
    raw: Option<&str>,
) -> Option<Value> {
    match spec.transformation() {
        Transform::Binary(f) => {
            let mut scratch = adapter.build();
            f(raw, &mut scratch);
            scratch.get(spec.target_attribute())
        }
        transform => transform.value(raw),
    }
}

/// Find the record a row refers to, or build a new one.
///
/// Must run before the row's values are applied: later transforms may
/// overwrite the identifier attribute. Rows without an identifier column or
/// with a null identifier always build a new record.
pub fn resolve_identity<A: ModelAdapter>(
    adapter: &A,
    identifier: Option<&ColumnSpec<A::Model>>,
    values: &CellValues,
) -> Binding<A::Model> {
    let found = identifier.and_then(|spec| {
        let raw = values.get(spec.key())?;
        let value = identifier_value(adapter, spec, raw.as_deref())?;
        adapter.find_by(spec.target_attribute(), &value)
    });

    match found {
        Some(model) => Binding {
            model,
            existing: true,
        },
        None => Binding {
            model: adapter.build(),
            existing: false,
        },
    }
}

/// Outcome of a save attempt.
pub fn classify(existing: bool, saved: bool) -> RowStatus {
    match (existing, saved) {
        (false, true) => RowStatus::Created,
        (false, false) => RowStatus::FailedToCreate,
        (true, true) => RowStatus::Updated,
        (true, false) => RowStatus::FailedToUpdate,
    }
}

/// Save the bound model and classify the result.
pub fn persist<A: ModelAdapter>(adapter: &mut A, binding: &mut Binding<A::Model>) -> RowStatus {
    let saved = adapter.save(&mut binding.model);
    classify(binding.existing, saved)
}

/// Validate without saving. Passing rows keep their candidate outcome.
pub fn check<A: ModelAdapter>(adapter: &A, binding: &mut Binding<A::Model>) -> RowStatus {
    if !adapter.validate(&mut binding.model) {
        RowStatus::Invalid
    } else if binding.existing {
        RowStatus::Updated
    } else {
        RowStatus::Created
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::document::{Document, DocumentStore, ValidationRule};
    use serde_json::{json, Map};

    fn store_with_mark() -> DocumentStore {
        let mut store = DocumentStore::in_memory().rule(ValidationRule::new("email").presence());
        let mut attrs = Map::new();
        attrs.insert("email".into(), json!("mark@example.com"));
        store.insert(attrs).unwrap();
        store
    }

    fn values(email: Option<&str>) -> CellValues {
        let mut values = CellValues::new();
        values.insert("email".into(), email.map(str::to_string));
        values
    }

    #[test]
    fn test_lookup_uses_transformed_value() {
        let store = store_with_mark();
        let spec: ColumnSpec<Document> =
            ColumnSpec::new("email").to(|raw| Value::from(raw.map(str::to_lowercase)));

        let binding = resolve_identity(&store, Some(&spec), &values(Some("MARK@EXAMPLE.COM")));
        assert!(binding.existing);
        assert!(binding.model.is_persisted());

        let plain: ColumnSpec<Document> = ColumnSpec::new("email");
        let binding = resolve_identity(&store, Some(&plain), &values(Some("MARK@EXAMPLE.COM")));
        assert!(!binding.existing);
    }

    #[test]
    fn test_binary_identifier_reads_target() {
        let store = store_with_mark();
        let spec: ColumnSpec<Document> = ColumnSpec::new("login").target("email").to_model(|raw, doc: &mut Document| {
            doc.set("email", Value::from(raw.map(|s| format!("{}@example.com", s))));
        });

        let mut cells = CellValues::new();
        cells.insert("login".into(), Some("mark".into()));
        assert!(resolve_identity(&store, Some(&spec), &cells).existing);
    }

    #[test]
    fn test_without_identifier_builds_new() {
        let store = store_with_mark();
        let spec: ColumnSpec<Document> = ColumnSpec::new("email");

        assert!(!resolve_identity(&store, None, &values(Some("mark@example.com"))).existing);
        assert!(!resolve_identity(&store, Some(&spec), &values(None)).existing);
        assert!(!resolve_identity(&store, Some(&spec), &CellValues::new()).existing);
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(false, true), RowStatus::Created);
        assert_eq!(classify(false, false), RowStatus::FailedToCreate);
        assert_eq!(classify(true, true), RowStatus::Updated);
        assert_eq!(classify(true, false), RowStatus::FailedToUpdate);
    }

    #[test]
    fn test_persist_and_check() {
        let mut store = store_with_mark();

        let mut binding = resolve_identity(&store, None, &CellValues::new());
        assert_eq!(check(&store, &mut binding), RowStatus::Invalid);
        assert_eq!(persist(&mut store, &mut binding), RowStatus::FailedToCreate);

        binding.model.set("email", json!("bob@example.com"));
        assert_eq!(check(&store, &mut binding), RowStatus::Created);
        assert_eq!(persist(&mut store, &mut binding), RowStatus::Created);
        assert_eq!(store.len(), 2);
    }
}
