//! Row transformation: raw cells in, attribute assignments out.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::columns::{ColumnSpec, Header, Transform};
use crate::models::{Model, ModelErrors};
use crate::parser::CsvRecord;

/// Trimmed cell values by declared column key, for matched columns only.
/// Empty cells are `None`.
pub type CellValues = BTreeMap<String, Option<String>>;

/// Outcome of one data row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    Created,
    Updated,
    /// Failed validation in a dry run
    Invalid,
    FailedToCreate,
    FailedToUpdate,
}

impl RowStatus {
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            RowStatus::Invalid | RowStatus::FailedToCreate | RowStatus::FailedToUpdate
        )
    }

    /// Wording used in report messages.
    pub fn label(self) -> &'static str {
        match self {
            RowStatus::Created => "created",
            RowStatus::Updated => "updated",
            RowStatus::Invalid => "invalid",
            RowStatus::FailedToCreate => "failed to create",
            RowStatus::FailedToUpdate => "failed to update",
        }
    }
}

/// One processed data line.
#[derive(Debug, Clone)]
pub struct Row<M> {
    /// Line the record starts on
    pub line: usize,
    /// Matched header text -> trimmed cell
    pub csv_attributes: BTreeMap<String, Option<String>>,
    /// The bound model, found or built
    pub model: M,
    /// Validation errors keyed by the CSV header feeding the attribute
    pub errors: BTreeMap<String, Vec<String>>,
    pub status: RowStatus,
}

impl<M> Row<M> {
    pub fn is_valid(&self) -> bool {
        !self.status.is_failure()
    }
}

/// Trim a cell; blank cells become `None`.
pub fn clean_cell(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Cell values of one record, keyed by declared column.
pub fn extract(record: &CsvRecord, header: &Header) -> CellValues {
    header
        .columns()
        .iter()
        .filter_map(|column| {
            column
                .index
                .map(|i| (column.key.clone(), clean_cell(record.cell(i))))
        })
        .collect()
}

/// Cell values of one record, keyed by the header text they came from.
pub fn csv_attributes(record: &CsvRecord, header: &Header) -> BTreeMap<String, Option<String>> {
    header
        .columns()
        .iter()
        .filter_map(|column| {
            column.index.map(|i| {
                (
                    header.raw_columns()[i].clone(),
                    clean_cell(record.cell(i)),
                )
            })
        })
        .collect()
}

/// Assign extracted values onto the model.
///
/// Columns absent from the input are skipped, leaving the attribute
/// untouched. Binary transforms assign through the model themselves.
pub fn apply<M: Model>(model: &mut M, values: &CellValues, specs: &[ColumnSpec<M>]) {
    for spec in specs {
        let Some(raw) = values.get(spec.key()) else {
            continue;
        };
        match spec.transformation() {
            Transform::Binary(f) => f(raw.as_deref(), model),
            transform => {
                if let Some(value) = transform.value(raw.as_deref()) {
                    model.set(spec.target_attribute(), value);
                }
            }
        }
    }
}

/// Re-key model errors by the CSV header that feeds each attribute,
/// falling back to the attribute name.
pub fn header_errors(errors: &ModelErrors, header: &Header) -> BTreeMap<String, Vec<String>> {
    let mut mapped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (attribute, messages) in errors {
        let name = header.header_for_attribute(attribute).unwrap_or(attribute);
        mapped
            .entry(name.to_string())
            .or_default()
            .extend(messages.iter().cloned());
    }
    mapped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::document::Document;
    use serde_json::{json, Value};

    fn specs() -> Vec<ColumnSpec<Document>> {
        vec![
            ColumnSpec::new("email")
                .required()
                .to(|raw| Value::from(raw.map(str::to_lowercase))),
            ColumnSpec::new("confirmed").to_model(|raw, doc: &mut Document| {
                let confirmed = raw == Some("true");
                doc.set("confirmed_at", json!(if confirmed { "now" } else { "never" }));
            }),
            ColumnSpec::new("first_name"),
            ColumnSpec::new("last_name"),
            ColumnSpec::new("nickname"),
        ]
    }

    fn resolved(cells: &[&str]) -> Header {
        let raw: Vec<String> = cells.iter().map(|c| c.to_string()).collect();
        Header::resolve(&raw, &specs())
    }

    fn record(cells: &[&str]) -> CsvRecord {
        CsvRecord {
            line: 2,
            cells: cells.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn test_clean_cell() {
        assert_eq!(clean_cell(Some("  bob ")), Some("bob".to_string()));
        assert_eq!(clean_cell(Some("   ")), None);
        assert_eq!(clean_cell(None), None);
    }

    #[test]
    fn test_extract_keys_by_declared_column() {
        let header = resolved(&["Email", "confirmed", "First name", "last_name"]);
        let values = extract(&record(&["BOB@example.com ", "true", "bob"]), &header);

        assert_eq!(values["email"], Some("BOB@example.com".to_string()));
        assert_eq!(values["first_name"], Some("bob".to_string()));
        assert_eq!(values["last_name"], None);
        assert!(!values.contains_key("nickname"));

        let by_header = csv_attributes(&record(&["BOB@example.com", "true", "bob", ""]), &header);
        assert_eq!(by_header["First name"], Some("bob".to_string()));
    }

    #[test]
    fn test_apply_transforms() {
        let header = resolved(&["email", "confirmed", "first_name", "last_name"]);
        let values = extract(&record(&["BOB@example.com", "true", "bob", ""]), &header);

        let mut doc = Document::default();
        doc.set("nickname", json!("bobby"));
        apply(&mut doc, &values, &specs());

        assert_eq!(doc.get("email"), Some(json!("bob@example.com")));
        assert_eq!(doc.get("confirmed_at"), Some(json!("now")));
        assert_eq!(doc.get("confirmed"), None);
        assert_eq!(doc.get("first_name"), Some(json!("bob")));
        assert_eq!(doc.get("last_name"), Some(Value::Null));
        // Not in the file: left alone
        assert_eq!(doc.get("nickname"), Some(json!("bobby")));
    }

    #[test]
    fn test_header_errors_use_source_vocabulary() {
        let specs: Vec<ColumnSpec<Document>> = vec![ColumnSpec::new("mail").alias("Courriel").target("email")];
        let header = Header::resolve(&["Courriel".to_string()], &specs);

        let mut errors = ModelErrors::new();
        errors.insert("email".into(), vec!["is invalid".into()]);
        errors.insert("base".into(), vec!["could not be saved".into()]);

        let mapped = header_errors(&errors, &header);
        assert_eq!(mapped["Courriel"], vec!["is invalid"]);
        assert_eq!(mapped["base"], vec!["could not be saved"]);
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(RowStatus::FailedToCreate.label(), "failed to create");
        assert!(RowStatus::Invalid.is_failure());
        assert!(!RowStatus::Updated.is_failure());
    }
}
