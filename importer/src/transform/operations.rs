//! Declarative cell operations
//!
//! Job definitions describe unary transforms as an ordered chain of
//! operations instead of code. A chain compiles into a [`Transform::Unary`].

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::columns::{Pattern, Transform};

/// All available cell operations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    /// Remove leading and trailing whitespace
    Trim,

    /// Convert to lowercase
    Lowercase,

    /// Convert to uppercase
    Uppercase,

    /// Replace using regex pattern
    Replace {
        pattern: Pattern,
        #[serde(default)]
        value: String,
    },

    /// Map values using a lookup table
    Map {
        mapping: HashMap<String, String>,
        #[serde(default)]
        case_insensitive: bool,
        /// Value to use when nothing matches (otherwise null)
        #[serde(default)]
        default_unmapped: Option<String>,
    },

    /// Convert to boolean
    ToBoolean {
        #[serde(default = "default_true_values")]
        true_values: Vec<String>,
    },

    /// Convert to a number
    ToNumber,

    /// Remove all non-digit characters
    DigitsOnly,

    /// Remove all non-alphanumeric characters
    Alphanumeric,

    /// Ensure string starts with given prefix
    EnsurePrefix { value: String },

    /// Split string into array
    Split {
        #[serde(default = "default_split_separator")]
        separator: String,
    },

    /// Take characters from `start`, optionally `length` of them
    Substring {
        start: usize,
        #[serde(default)]
        length: Option<usize>,
    },

    /// Pad string at start to reach target length
    PadStart {
        length: usize,
        #[serde(default = "default_pad_char")]
        char: String,
    },
}

fn default_pad_char() -> String {
    "0".to_string()
}

fn default_split_separator() -> String {
    ",".to_string()
}

/// Cell values read as `true` by `to_boolean` unless overridden.
pub fn default_true_values() -> Vec<String> {
    ["true", "1", "yes", "y", "x", "oui"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Operation {
    /// Apply this operation to a value
    pub fn apply(&self, value: Value) -> Value {
        match self {
            Operation::ToBoolean { true_values } => to_boolean(&value, true_values),
            Operation::Map {
                mapping,
                case_insensitive,
                default_unmapped,
            } => map(&value, mapping, *case_insensitive, default_unmapped.as_deref()),
            _ => match as_string(&value) {
                Some(s) => self.apply_str(s),
                None => value,
            },
        }
    }

    fn apply_str(&self, s: String) -> Value {
        match self {
            Operation::Trim => Value::String(s.trim().to_string()),
            Operation::Lowercase => Value::String(s.to_lowercase()),
            Operation::Uppercase => Value::String(s.to_uppercase()),
            Operation::Replace { pattern, value } => {
                Value::String(pattern.regex().replace_all(&s, value.as_str()).into_owned())
            }
            Operation::ToNumber => to_number(&s),
            Operation::DigitsOnly => Value::String(s.chars().filter(char::is_ascii_digit).collect()),
            Operation::Alphanumeric => {
                Value::String(s.chars().filter(|c| c.is_alphanumeric()).collect())
            }
            Operation::EnsurePrefix { value } if s.starts_with(value.as_str()) => Value::String(s),
            Operation::EnsurePrefix { value } => Value::String(format!("{}{}", value, s)),
            Operation::Split { separator } => Value::Array(
                s.split(separator.as_str())
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(|part| Value::String(part.to_string()))
                    .collect(),
            ),
            Operation::Substring { start, length } => {
                let chars = s.chars().skip(*start);
                Value::String(match length {
                    Some(n) => chars.take(*n).collect(),
                    None => chars.collect(),
                })
            }
            Operation::PadStart { length, char } => {
                let count = s.chars().count();
                if count >= *length {
                    Value::String(s)
                } else {
                    let pad = char.chars().next().unwrap_or('0');
                    let padding: String = std::iter::repeat(pad).take(length - count).collect();
                    Value::String(format!("{}{}", padding, s))
                }
            }
            Operation::ToBoolean { .. } | Operation::Map { .. } => Value::String(s),
        }
    }
}

fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn to_boolean(value: &Value, true_values: &[String]) -> Value {
    match value {
        Value::Bool(b) => Value::Bool(*b),
        other => {
            let truthy = as_string(other).is_some_and(|s| {
                let s = s.trim().to_lowercase();
                true_values.iter().any(|tv| tv.to_lowercase() == s)
            });
            Value::Bool(truthy)
        }
    }
}

fn map(
    value: &Value,
    mapping: &HashMap<String, String>,
    case_insensitive: bool,
    default_unmapped: Option<&str>,
) -> Value {
    let found = as_string(value).and_then(|s| {
        if case_insensitive {
            let key = s.to_lowercase();
            mapping
                .iter()
                .find(|(k, _)| k.to_lowercase() == key)
                .map(|(_, v)| v.clone())
        } else {
            mapping.get(&s).cloned()
        }
    });

    match (found, default_unmapped) {
        (Some(v), _) => Value::String(v),
        (None, Some(d)) => Value::String(d.to_string()),
        (None, None) => Value::Null,
    }
}

fn to_number(s: &str) -> Value {
    let cleaned: String = s
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',' && *c != '_')
        .collect();

    if let Ok(n) = cleaned.parse::<i64>() {
        return Value::Number(n.into());
    }
    cleaned
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map_or(Value::Null, Value::Number)
}

/// Run a cell through a chain of operations.
///
/// The cell starts as a string, or null when absent.
pub fn apply_all(operations: &[Operation], raw: Option<&str>) -> Value {
    let start = raw.map_or(Value::Null, |s| Value::String(s.to_string()));
    operations.iter().fold(start, |value, op| op.apply(value))
}

/// Compile a chain into a unary transform.
pub fn chain<M>(operations: Vec<Operation>) -> Transform<M> {
    if operations.is_empty() {
        return Transform::Identity;
    }
    Transform::Unary(Arc::new(move |raw: Option<&str>| apply_all(&operations, raw)))
}

/// Get a description of all available operations
pub fn operations_description() -> String {
    r#"Available cell operations:

| Operation | Description | Parameters |
|-----------|-------------|------------|
| trim | Remove leading/trailing whitespace | - |
| lowercase | Convert to lowercase | - |
| uppercase | Convert to uppercase | - |
| replace | Regex pattern replacement | pattern: regex, value: replacement |
| map | Map values using lookup table | mapping: {source: target}, case_insensitive: bool, default_unmapped: string |
| to_boolean | Convert to boolean | true_values: list of truthy strings |
| to_number | Convert to number | - |
| digits_only | Keep only digits | - |
| alphanumeric | Keep only alphanumeric chars | - |
| ensure_prefix | Add prefix if not present | value: prefix string |
| split | Split into array | separator: split string (default ",") |
| substring | Extract substring | start: start index, length: optional length |
| pad_start | Pad string at start | length: target length, char: pad character (default "0") |

Empty cells reach the chain as null and stay null, except for to_boolean
(false) and map with a default_unmapped value.

Example column in a job definition:
{
  "key": "email",
  "required": true,
  "to": [{"type": "trim"}, {"type": "lowercase"}]
}"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }

    #[test]
    fn test_lowercase_chain() {
        let ops = vec![Operation::Trim, Operation::Lowercase];
        assert_eq!(apply_all(&ops, Some(" BOB@Example.com ")), s("bob@example.com"));
        assert_eq!(apply_all(&ops, None), Value::Null);
    }

    #[test]
    fn test_map() {
        let mut mapping = HashMap::new();
        mapping.insert("A".to_string(), "admin".to_string());
        mapping.insert("M".to_string(), "member".to_string());

        let op = Operation::Map {
            mapping: mapping.clone(),
            case_insensitive: true,
            default_unmapped: None,
        };
        assert_eq!(op.apply(s("a")), s("admin"));
        assert_eq!(op.apply(s("x")), Value::Null);

        let op = Operation::Map {
            mapping,
            case_insensitive: false,
            default_unmapped: Some("member".to_string()),
        };
        assert_eq!(op.apply(s("a")), s("member"));
        assert_eq!(op.apply(Value::Null), s("member"));
    }

    #[test]
    fn test_to_boolean() {
        let op = Operation::ToBoolean {
            true_values: default_true_values(),
        };
        assert_eq!(op.apply(s("TRUE")), Value::Bool(true));
        assert_eq!(op.apply(s("no")), Value::Bool(false));
        assert_eq!(op.apply(Value::Null), Value::Bool(false));
    }

    #[test]
    fn test_to_number() {
        let op = Operation::ToNumber;
        assert_eq!(op.apply(s("1,234")), Value::Number(1234.into()));
        assert_eq!(op.apply(s("-42")), Value::Number((-42).into()));
        assert_eq!(op.apply(s("2.5")), serde_json::json!(2.5));
        assert_eq!(op.apply(s("n/a")), Value::Null);
    }

    #[test]
    fn test_string_operations() {
        let replace = Operation::Replace {
            pattern: Pattern::new("[-. ]").unwrap(),
            value: String::new(),
        };
        assert_eq!(replace.apply(s("06-12.34 56")), s("06123456"));

        let prefix = Operation::EnsurePrefix { value: "+33".to_string() };
        assert_eq!(prefix.apply(s("612")), s("+33612"));
        assert_eq!(prefix.apply(s("+33612")), s("+33612"));

        let pad = Operation::PadStart { length: 5, char: "0".to_string() };
        assert_eq!(pad.apply(s("42")), s("00042"));

        let split = Operation::Split { separator: ";".to_string() };
        assert_eq!(split.apply(s("a; b;;c")), serde_json::json!(["a", "b", "c"]));

        let sub = Operation::Substring { start: 1, length: Some(2) };
        assert_eq!(sub.apply(s("éabc")), s("ab"));
    }

    #[test]
    fn test_deserialize_chain() {
        let json = r#"[
            {"type": "trim"},
            {"type": "replace", "pattern": "\\s+", "value": " "},
            {"type": "to_boolean"}
        ]"#;
        let ops: Vec<Operation> = serde_json::from_str(json).unwrap();
        assert_eq!(ops.len(), 3);
        assert_eq!(apply_all(&ops, Some(" yes ")), Value::Bool(true));
    }

    #[test]
    fn test_chain_compiles_to_unary() {
        let transform: Transform<()> = chain(vec![Operation::Uppercase]);
        assert_eq!(transform.value(Some("fr")), Some(s("FR")));

        let empty: Transform<()> = chain(Vec::new());
        assert!(matches!(empty, Transform::Identity));
    }
}
