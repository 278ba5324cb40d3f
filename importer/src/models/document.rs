//! Document Store - schemaless JSON records with declarative validation
//!
//! Keeps documents in memory and, when opened on a path, mirrors them to a
//! pretty-printed JSON array on disk after every save (or once per
//! transaction).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::{Model, ModelAdapter, ModelErrors};
use crate::columns::Pattern;
use crate::error::{ModelError, ModelResult};

/// Error key for failures not tied to one attribute.
pub const BASE: &str = "base";

/// A stored record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Set once the document has been saved.
    #[serde(default)]
    pub id: Option<Uuid>,
    /// Attribute values
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(skip)]
    errors: ModelErrors,
}

impl Document {
    pub fn new(attributes: Map<String, Value>) -> Self {
        Self {
            attributes,
            ..Self::default()
        }
    }

    fn add_error(&mut self, attribute: &str, message: impl Into<String>) {
        self.errors
            .entry(attribute.to_string())
            .or_default()
            .push(message.into());
    }
}

impl Model for Document {
    fn get(&self, attribute: &str) -> Option<Value> {
        self.attributes.get(attribute).cloned()
    }

    fn set(&mut self, attribute: &str, value: Value) {
        self.attributes.insert(attribute.to_string(), value);
    }

    fn errors(&self) -> &ModelErrors {
        &self.errors
    }

    fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}

// =============================================================================
// Validation Rules
// =============================================================================

/// Checks applied to one attribute before a document is saved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationRule {
    pub attribute: String,
    /// Reject null, empty or whitespace-only values
    #[serde(default)]
    pub presence: bool,
    /// String values must match
    #[serde(default)]
    pub format: Option<Pattern>,
    /// No other document may hold the same value
    #[serde(default)]
    pub uniqueness: bool,
    /// Allowed values
    #[serde(default)]
    pub inclusion: Option<Vec<String>>,
}

impl ValidationRule {
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            ..Self::default()
        }
    }

    pub fn presence(mut self) -> Self {
        self.presence = true;
        self
    }

    pub fn format(mut self, pattern: Pattern) -> Self {
        self.format = Some(pattern);
        self
    }

    pub fn uniqueness(mut self) -> Self {
        self.uniqueness = true;
        self
    }

    pub fn inclusion<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inclusion = Some(values.into_iter().map(Into::into).collect());
        self
    }

    fn check(&self, document: &Document, others: &[Document]) -> Vec<&'static str> {
        let value = document
            .attributes
            .get(&self.attribute)
            .unwrap_or(&Value::Null);
        let mut messages = Vec::new();

        if is_blank(value) {
            if self.presence {
                messages.push("can't be blank");
            }
            return messages;
        }

        if let (Some(pattern), Value::String(s)) = (&self.format, value) {
            if !pattern.regex().is_match(s) {
                messages.push("is invalid");
            }
        }

        if let Some(allowed) = &self.inclusion {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if !allowed.contains(&text) {
                messages.push("is not included in the list");
            }
        }

        if self.uniqueness {
            let taken = others.iter().any(|other| {
                (document.id.is_none() || other.id != document.id)
                    && other.attributes.get(&self.attribute) == Some(value)
            });
            if taken {
                messages.push("has already been taken");
            }
        }

        messages
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

// =============================================================================
// Store
// =============================================================================

/// Adapter over a list of [`Document`]s.
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: Vec<Document>,
    rules: Vec<ValidationRule>,
    /// Backing file, if any
    path: Option<PathBuf>,
    /// Inside a transaction: saves only mark the store dirty
    deferred: bool,
    dirty: bool,
}

impl DocumentStore {
    /// A store with no backing file.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a store backed by a JSON file, loading it if it exists.
    pub fn open(path: impl AsRef<Path>) -> ModelResult<Self> {
        let path = path.as_ref().to_path_buf();
        let documents = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            Vec::new()
        };

        log::debug!("Opened store {} ({} documents)", path.display(), documents.len());

        Ok(Self {
            documents,
            path: Some(path),
            ..Self::default()
        })
    }

    pub fn with_rules(mut self, rules: Vec<ValidationRule>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn rule(mut self, rule: ValidationRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Store a document without validation, e.g. to seed fixtures.
    pub fn insert(&mut self, attributes: Map<String, Value>) -> ModelResult<Uuid> {
        let id = Uuid::new_v4();
        self.documents.push(Document {
            id: Some(id),
            ..Document::new(attributes)
        });
        self.write()?;
        Ok(id)
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Write every document to the backing file.
    pub fn flush(&mut self) -> ModelResult<()> {
        if let Some(path) = &self.path {
            let content = serde_json::to_string_pretty(&self.documents)?;
            fs::write(path, content)?;
        }
        self.dirty = false;
        Ok(())
    }

    fn write(&mut self) -> ModelResult<()> {
        if self.deferred {
            self.dirty = true;
            Ok(())
        } else {
            self.flush()
        }
    }

    /// Insert or replace by id, returning the replaced version.
    fn upsert(&mut self, document: Document) -> Option<Document> {
        match self.documents.iter_mut().find(|d| d.id == document.id) {
            Some(existing) => Some(std::mem::replace(existing, document)),
            None => {
                self.documents.push(document);
                None
            }
        }
    }

    fn restore(&mut self, id: Option<Uuid>, previous: Option<Document>) {
        match previous {
            Some(previous) => {
                self.upsert(previous);
            }
            None => self.documents.retain(|d| d.id != id),
        }
    }
}

impl ModelAdapter for DocumentStore {
    type Model = Document;

    fn find_by(&self, attribute: &str, value: &Value) -> Option<Document> {
        if value.is_null() {
            return None;
        }
        self.documents
            .iter()
            .find(|d| d.attributes.get(attribute) == Some(value))
            .cloned()
    }

    fn build(&self) -> Document {
        Document::default()
    }

    fn validate(&self, document: &mut Document) -> bool {
        document.errors.clear();
        for rule in &self.rules {
            for message in rule.check(document, &self.documents) {
                document.add_error(&rule.attribute, message);
            }
        }
        document.errors.is_empty()
    }

    fn save(&mut self, document: &mut Document) -> bool {
        if !self.validate(document) {
            return false;
        }

        let mut stored = document.clone();
        if stored.id.is_none() {
            stored.id = Some(Uuid::new_v4());
        }
        let id = stored.id;
        let previous = self.upsert(stored);

        if let Err(e) = self.write() {
            log::error!("Failed to write store: {}", e);
            self.restore(id, previous);
            document.add_error(BASE, format!("could not be saved: {}", e));
            return false;
        }

        document.id = id;
        true
    }

    fn transaction<R, F>(&mut self, run: F) -> ModelResult<R>
    where
        F: FnOnce(&mut Self) -> R,
    {
        let outer = self.deferred;
        self.deferred = true;
        let result = run(self);
        self.deferred = outer;

        if !outer && self.dirty {
            self.flush()
                .map_err(|e| ModelError::Transaction(e.to_string()))?;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn attrs(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn user_store() -> DocumentStore {
        DocumentStore::in_memory()
            .rule(
                ValidationRule::new("email")
                    .presence()
                    .format(Pattern::new(r"^[^@\s]+@[^@\s]+$").unwrap())
                    .uniqueness(),
            )
            .rule(ValidationRule::new("role").inclusion(["admin", "member"]))
    }

    #[test]
    fn test_save_assigns_id() {
        let mut store = user_store();
        let mut doc = Document::new(attrs(json!({ "email": "bob@example.com" })));

        assert!(!doc.is_persisted());
        assert!(store.save(&mut doc));
        assert!(doc.is_persisted());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_validation_messages() {
        let store = user_store();

        let mut blank = Document::new(attrs(json!({ "email": "  " })));
        assert!(!store.validate(&mut blank));
        assert_eq!(blank.errors()["email"], vec!["can't be blank"]);

        let mut invalid = Document::new(attrs(json!({ "email": "not_an_email", "role": "owner" })));
        assert!(!store.validate(&mut invalid));
        assert_eq!(invalid.errors()["email"], vec!["is invalid"]);
        assert_eq!(invalid.errors()["role"], vec!["is not included in the list"]);
    }

    #[test]
    fn test_uniqueness_ignores_self() {
        let mut store = user_store();
        let mut first = Document::new(attrs(json!({ "email": "bob@example.com" })));
        assert!(store.save(&mut first));

        // Saving the same record again is not a conflict
        first.set("role", json!("admin"));
        assert!(store.save(&mut first));
        assert_eq!(store.len(), 1);

        let mut second = Document::new(attrs(json!({ "email": "bob@example.com" })));
        assert!(!store.save(&mut second));
        assert_eq!(second.errors()["email"], vec!["has already been taken"]);
    }

    #[test]
    fn test_find_by() {
        let mut store = DocumentStore::in_memory();
        store.insert(attrs(json!({ "email": "mark@example.com" }))).unwrap();

        let found = store.find_by("email", &json!("mark@example.com")).unwrap();
        assert!(found.is_persisted());
        assert!(store.find_by("email", &json!("MARK@EXAMPLE.COM")).is_none());
        assert!(store.find_by("phone", &Value::Null).is_none());
    }

    #[test]
    fn test_open_and_flush() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.json");

        let mut store = DocumentStore::open(&path).unwrap();
        assert!(store.is_empty());
        let mut doc = Document::new(attrs(json!({ "email": "bob@example.com" })));
        assert!(store.save(&mut doc));

        let reopened = DocumentStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.documents()[0].id, doc.id);
    }

    #[test]
    fn test_transaction_writes_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.json");
        let mut store = DocumentStore::open(&path).unwrap();

        let saved = store
            .transaction(|s| {
                let mut doc = Document::new(attrs(json!({ "email": "bob@example.com" })));
                let ok = s.save(&mut doc);
                assert!(!path.exists());
                ok
            })
            .unwrap();

        assert!(saved);
        assert!(path.exists());
        assert_eq!(DocumentStore::open(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_failed_write_is_a_save_failure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("users.json");
        let mut store = DocumentStore::open(&path).unwrap();

        let mut doc = Document::new(attrs(json!({ "email": "bob@example.com" })));
        assert!(!store.save(&mut doc));
        assert!(!doc.is_persisted());
        assert!(doc.errors().contains_key(BASE));
        assert!(store.is_empty());
    }
}
