//! Job definitions: import configurations described in JSON.
//!
//! ```json
//! {
//!   "name": "users",
//!   "identifier": "email",
//!   "when_invalid": "skip",
//!   "columns": [
//!     {"key": "email", "as": ["Courriel", {"pattern": "^e-?mail"}], "required": true,
//!      "to": [{"type": "trim"}, {"type": "lowercase"}]},
//!     {"key": "confirmed", "timestamp": "confirmed_at"},
//!     {"key": "first_name"},
//!     {"key": "surname", "to": "last_name"}
//!   ],
//!   "validations": [
//!     {"attribute": "email", "presence": true, "format": "^[^@\\s]+@[^@\\s]+$", "uniqueness": true}
//!   ]
//! }
//! ```

use chrono::Utc;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;

use super::{ImportConfig, InvalidPolicy};
use crate::columns::ColumnSpec;
use crate::error::{ConfigError, ConfigResult};
use crate::models::document::{Document, ValidationRule};
use crate::models::Model;
use crate::transform::operations::{self, default_true_values, Operation};

static TRUE_VALUES: Lazy<Vec<String>> = Lazy::new(default_true_values);

/// A complete import job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    #[serde(default)]
    pub name: Option<String>,
    pub columns: Vec<ColumnDefinition>,
    /// Column used to find existing records
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub when_invalid: InvalidPolicy,
    /// Single ASCII character, `,` when absent
    #[serde(default)]
    pub delimiter: Option<String>,
    /// Encoding label for byte inputs, sniffed when absent
    #[serde(default)]
    pub encoding: Option<String>,
    /// Rules for the document store
    #[serde(default)]
    pub validations: Vec<ValidationRule>,
}

/// One declared column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub key: String,
    /// Alternate header names and patterns; patterns ignore case
    #[serde(default, rename = "as")]
    pub matchers: Vec<HeaderMatch>,
    #[serde(default)]
    pub required: bool,
    /// Target attribute, or an operation chain
    #[serde(default)]
    pub to: Option<Target>,
    /// Set this attribute to the current time when the cell is truthy
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderMatch {
    Name(String),
    Pattern { pattern: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Target {
    Attribute(String),
    Operations(Vec<Operation>),
}

impl JobDefinition {
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Build the import configuration for the document store.
    pub fn to_config(&self) -> ConfigResult<ImportConfig<Document>> {
        let mut config = ImportConfig::new().when_invalid(self.when_invalid);

        for column in &self.columns {
            config = config.column(column.to_spec()?);
        }
        if let Some(identifier) = &self.identifier {
            config = config.identifier(identifier);
        }
        if let Some(delimiter) = &self.delimiter {
            config = config.delimiter(parse_delimiter(delimiter)?);
        }
        if let Some(encoding) = &self.encoding {
            config = config.encoding(encoding);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validation rules to install on the document store.
    pub fn store_rules(&self) -> Vec<ValidationRule> {
        self.validations.clone()
    }
}

impl ColumnDefinition {
    pub fn to_spec(&self) -> ConfigResult<ColumnSpec<Document>> {
        let mut spec = ColumnSpec::new(&self.key);

        for matcher in &self.matchers {
            spec = match matcher {
                HeaderMatch::Name(name) => spec.alias(name),
                HeaderMatch::Pattern { pattern } => spec.pattern_str(pattern)?,
            };
        }
        if self.required {
            spec = spec.required();
        }

        let spec = match (&self.timestamp, &self.to) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingTransform(self.key.clone())),
            (Some(attribute), None) => timestamp(spec.target(attribute), attribute.clone()),
            (None, Some(Target::Attribute(attribute))) => spec.target(attribute),
            (None, Some(Target::Operations(chain))) => {
                spec.transform(operations::chain(chain.clone()))
            }
            (None, None) => spec,
        };
        Ok(spec)
    }
}

fn timestamp(spec: ColumnSpec<Document>, attribute: String) -> ColumnSpec<Document> {
    spec.to_model(move |raw, document: &mut Document| {
        let value = if is_truthy(raw) {
            Value::String(Utc::now().to_rfc3339())
        } else {
            Value::Null
        };
        document.set(&attribute, value);
    })
}

fn is_truthy(raw: Option<&str>) -> bool {
    raw.is_some_and(|s| TRUE_VALUES.iter().any(|t| t.eq_ignore_ascii_case(s.trim())))
}

fn parse_delimiter(delimiter: &str) -> ConfigResult<u8> {
    let mut chars = delimiter.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() => Ok(c as u8),
        _ => Err(ConfigError::InvalidDelimiter(delimiter.to_string())),
    }
}
