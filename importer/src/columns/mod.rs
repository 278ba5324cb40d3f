//! Column declarations.
//!
//! A [`ColumnSpec`] names one logical column, says how to recognise it among
//! the source headers and how its cells reach the model:
//!
//! ```text
//! header text ──(Matcher)──▶ ColumnSpec ──(Transform)──▶ model attribute
//! ```
//!
//! Specs are built once, at configuration time, and never change afterwards.

pub mod header;

pub use header::Header;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::{ConfigError, ConfigResult};

/// Lowercase, trim, and collapse runs of whitespace and underscores into a
/// single `_`, so `"First  name"`, `"first_name"` and `" FIRST NAME "` agree.
pub fn normalize(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

// =============================================================================
// Patterns
// =============================================================================

/// A compiled regular expression that (de)serializes as its source text.
#[derive(Debug, Clone)]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(pattern: &str) -> ConfigResult<Self> {
        Self::build(&RegexBuilder::new(pattern), pattern)
    }

    /// Compile `pattern` ignoring letter case, as header patterns are.
    pub fn case_insensitive(pattern: &str) -> ConfigResult<Self> {
        Self::build(RegexBuilder::new(pattern).case_insensitive(true), pattern)
    }

    fn build(builder: &RegexBuilder, pattern: &str) -> ConfigResult<Self> {
        builder
            .build()
            .map(Pattern)
            .map_err(|source| ConfigError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    pub fn regex(&self) -> &Regex {
        &self.0
    }

    pub fn into_regex(self) -> Regex {
        self.0
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Regex::new(&source)
            .map(Pattern)
            .map_err(serde::de::Error::custom)
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.as_str())
    }
}

// =============================================================================
// Matchers
// =============================================================================

/// A rule recognising a source header.
///
/// Evaluated in a fixed order: patterns, then aliases, then the declared name.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Regular expression tested against the trimmed, lowercased header.
    Pattern(Regex),
    /// Alternate name, compared like the declared name.
    Alias(String),
    /// The declared key itself.
    Name(String),
}

impl Matcher {
    fn priority(&self) -> u8 {
        match self {
            Matcher::Pattern(_) => 0,
            Matcher::Alias(_) => 1,
            Matcher::Name(_) => 2,
        }
    }

    /// Whether this rule accepts the raw header text.
    pub fn matches(&self, raw: &str) -> bool {
        match self {
            Matcher::Pattern(re) => re.is_match(&raw.trim().to_lowercase()),
            Matcher::Alias(name) | Matcher::Name(name) => normalize(name) == normalize(raw),
        }
    }
}

// =============================================================================
// Transforms
// =============================================================================

/// `raw -> value` transform.
pub type UnaryFn = dyn Fn(Option<&str>) -> Value + Send + Sync;

/// `raw, model -> ()` transform that mutates the model itself.
pub type BinaryFn<M> = dyn Fn(Option<&str>, &mut M) + Send + Sync;

/// How a cell reaches the model.
pub enum Transform<M> {
    /// Assign the trimmed cell (or null) as a string.
    Identity,
    /// Compute a value and assign it to the column's target attribute.
    Unary(Arc<UnaryFn>),
    /// Hand the cell and the model to a callback; nothing else is assigned.
    Binary(Arc<BinaryFn<M>>),
}

impl<M> Transform<M> {
    /// The value assigned to the target attribute, or `None` for binary
    /// transforms, which assign through the model instead.
    pub fn value(&self, raw: Option<&str>) -> Option<Value> {
        match self {
            Transform::Identity => Some(raw.map_or(Value::Null, |s| Value::String(s.to_string()))),
            Transform::Unary(f) => Some(f(raw)),
            Transform::Binary(_) => None,
        }
    }
}

impl<M> Clone for Transform<M> {
    fn clone(&self) -> Self {
        match self {
            Transform::Identity => Transform::Identity,
            Transform::Unary(f) => Transform::Unary(Arc::clone(f)),
            Transform::Binary(f) => Transform::Binary(Arc::clone(f)),
        }
    }
}

impl<M> fmt::Debug for Transform<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transform::Identity => "Identity",
            Transform::Unary(_) => "Unary(..)",
            Transform::Binary(_) => "Binary(..)",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Column Specification
// =============================================================================

/// One declared logical column.
///
/// # Example
/// ```
/// use csv_importer::columns::ColumnSpec;
/// use csv_importer::models::document::Document;
/// use serde_json::Value;
///
/// let email: ColumnSpec<Document> = ColumnSpec::new("email")
///     .alias("Courriel")
///     .required()
///     .to(|raw| raw.map_or(Value::Null, |s| Value::String(s.to_lowercase())));
///
/// assert!(email.matches(" EMAIL "));
/// assert!(email.matches("courriel"));
/// ```
pub struct ColumnSpec<M> {
    key: String,
    matchers: Vec<Matcher>,
    required: bool,
    target: String,
    transform: Transform<M>,
}

impl<M> ColumnSpec<M> {
    /// Declare a column matched by its own name and assigned as-is to the
    /// attribute of the same name.
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            matchers: vec![Matcher::Name(key.clone())],
            target: key.clone(),
            key,
            required: false,
            transform: Transform::Identity,
        }
    }

    /// Also accept an alternate header name.
    pub fn alias(self, name: impl Into<String>) -> Self {
        self.matcher(Matcher::Alias(name.into()))
    }

    /// Also accept headers matching a pattern.
    ///
    /// The regex is tested against the trimmed, lowercased header, so
    /// uppercase literals only match when it was built with `(?i)` or
    /// through [`ColumnSpec::pattern_str`].
    pub fn pattern(self, pattern: Regex) -> Self {
        self.matcher(Matcher::Pattern(pattern))
    }

    /// Compile `pattern` case-insensitively and accept headers matching it.
    pub fn pattern_str(self, pattern: &str) -> ConfigResult<Self> {
        Ok(self.pattern(Pattern::case_insensitive(pattern)?.into_regex()))
    }

    fn matcher(mut self, matcher: Matcher) -> Self {
        self.matchers.push(matcher);
        self.matchers.sort_by_key(Matcher::priority);
        self
    }

    /// The header is invalid when this column cannot be found.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Assign to a differently named attribute.
    pub fn target(mut self, attribute: impl Into<String>) -> Self {
        self.target = attribute.into();
        self
    }

    /// Transform the cell before assigning it.
    pub fn to<F>(self, f: F) -> Self
    where
        F: Fn(Option<&str>) -> Value + Send + Sync + 'static,
    {
        self.transform(Transform::Unary(Arc::new(f)))
    }

    /// Let a callback apply the cell to the model directly.
    pub fn to_model<F>(self, f: F) -> Self
    where
        F: Fn(Option<&str>, &mut M) + Send + Sync + 'static,
    {
        self.transform(Transform::Binary(Arc::new(f)))
    }

    pub fn transform(mut self, transform: Transform<M>) -> Self {
        self.transform = transform;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn target_attribute(&self) -> &str {
        &self.target
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    pub fn transformation(&self) -> &Transform<M> {
        &self.transform
    }

    /// Whether any matcher accepts the raw header text.
    pub fn matches(&self, raw: &str) -> bool {
        self.matchers.iter().any(|m| m.matches(raw))
    }
}

impl<M> Clone for ColumnSpec<M> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            matchers: self.matchers.clone(),
            required: self.required,
            target: self.target.clone(),
            transform: self.transform.clone(),
        }
    }
}

impl<M> fmt::Debug for ColumnSpec<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnSpec")
            .field("key", &self.key)
            .field("matchers", &self.matchers)
            .field("required", &self.required)
            .field("target", &self.target)
            .field("transform", &self.transform)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Spec = ColumnSpec<Vec<String>>;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  First   Name "), "first_name");
        assert_eq!(normalize("first__name"), "first_name");
        assert_eq!(normalize("EMAIL"), "email");
    }

    #[test]
    fn test_name_match_is_case_and_separator_insensitive() {
        let spec = Spec::new("first_name");
        assert!(spec.matches("First name"));
        assert!(spec.matches("FIRST_NAME"));
        assert!(!spec.matches("firstname"));
    }

    #[test]
    fn test_alias_and_pattern() {
        let spec = Spec::new("email")
            .alias("Courriel")
            .pattern_str(r"^e-?mail address$")
            .unwrap();

        assert!(spec.matches("courriel"));
        assert!(spec.matches("E-Mail Address"));
        assert!(spec.matches("Email"));
        assert!(!spec.matches("mail"));
    }

    #[test]
    fn test_matchers_ordered_by_priority() {
        let spec = Spec::new("email")
            .alias("Courriel")
            .pattern_str("mail")
            .unwrap();

        let kinds: Vec<u8> = spec.matchers().iter().map(Matcher::priority).collect();
        assert_eq!(kinds, vec![0, 1, 2]);
    }

    #[test]
    fn test_pattern_ignores_case() {
        let spec = Spec::new("contact").pattern_str("^E-?mail$").unwrap();
        assert!(spec.matches("email"));
        assert!(spec.matches(" E-MAIL "));
        assert!(!spec.matches("Emails"));

        let spec = Spec::new("contact").pattern(Regex::new("^E-?mail$").unwrap());
        assert!(!spec.matches("Email"));
        let spec = Spec::new("contact").pattern(Regex::new("(?i)^E-?mail$").unwrap());
        assert!(spec.matches("Email"));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = Spec::new("email").pattern_str("(unclosed").unwrap_err();
        assert!(err.to_string().contains("(unclosed"));
    }

    #[test]
    fn test_pattern_deserializes_from_source() {
        let pattern: Pattern = serde_json::from_str(r#""^e-?mail$""#).unwrap();
        assert!(pattern.regex().is_match("e-mail"));
        assert_eq!(serde_json::to_string(&pattern).unwrap(), r#""^e-?mail$""#);

        assert!(serde_json::from_str::<Pattern>(r#""[a-""#).is_err());
    }

    #[test]
    fn test_transform_values() {
        let identity: Transform<Vec<String>> = Transform::Identity;
        assert_eq!(identity.value(Some("Bob")), Some(Value::String("Bob".into())));
        assert_eq!(identity.value(None), Some(Value::Null));

        let spec = Spec::new("email").to(|raw| Value::from(raw.map(str::to_lowercase)));
        assert_eq!(
            spec.transformation().value(Some("BOB@X.COM")),
            Some(Value::String("bob@x.com".into()))
        );

        let binary = Spec::new("tags").to_model(|raw, tags: &mut Vec<String>| {
            tags.extend(raw.map(str::to_string));
        });
        assert_eq!(binary.transformation().value(Some("x")), None);
    }

    #[test]
    fn test_target_defaults_to_key() {
        assert_eq!(Spec::new("email").target_attribute(), "email");
        assert_eq!(Spec::new("mail").target("email").target_attribute(), "email");
    }
}
