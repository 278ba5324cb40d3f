//! Header resolution: which source column feeds which declared column.

use std::collections::BTreeMap;

use super::ColumnSpec;

/// A declared column after resolution against one input's header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumn {
    pub key: String,
    pub target: String,
    pub required: bool,
    /// Position of the matched source column, if any.
    pub index: Option<usize>,
}

/// The resolved header of one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    raw_columns: Vec<String>,
    columns: Vec<ResolvedColumn>,
    /// Target attribute -> header text that feeds it.
    attribution: BTreeMap<String, String>,
}

impl Header {
    /// Match raw header cells against the declared columns.
    ///
    /// Source columns are visited in order; each one goes to the first
    /// declared column that accepts it and has not been matched yet, so a
    /// source column feeds at most one declared column and vice versa.
    pub fn resolve<M>(raw_header: &[String], specs: &[ColumnSpec<M>]) -> Self {
        let mut columns: Vec<ResolvedColumn> = specs
            .iter()
            .map(|spec| ResolvedColumn {
                key: spec.key().to_string(),
                target: spec.target_attribute().to_string(),
                required: spec.is_required(),
                index: None,
            })
            .collect();

        for (index, raw) in raw_header.iter().enumerate() {
            if raw.trim().is_empty() {
                continue;
            }
            let hit = specs
                .iter()
                .zip(columns.iter_mut())
                .find(|(spec, column)| column.index.is_none() && spec.matches(raw));
            if let Some((_, column)) = hit {
                column.index = Some(index);
            }
        }

        let mut attribution = BTreeMap::new();
        for column in &columns {
            if let Some(index) = column.index {
                attribution
                    .entry(column.target.clone())
                    .or_insert_with(|| raw_header[index].clone());
            }
        }

        Self {
            raw_columns: raw_header.to_vec(),
            columns,
            attribution,
        }
    }

    pub fn raw_columns(&self) -> &[String] {
        &self.raw_columns
    }

    pub fn columns(&self) -> &[ResolvedColumn] {
        &self.columns
    }

    /// Position of the source column matched to `key`.
    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.columns
            .iter()
            .find(|c| c.key == key)
            .and_then(|c| c.index)
    }

    /// Header text matched to `key`.
    pub fn column_for(&self, key: &str) -> Option<&str> {
        self.index_of(key).map(|i| self.raw_columns[i].as_str())
    }

    /// Declared key -> matched header text, for matched columns only.
    pub fn mapping(&self) -> BTreeMap<&str, &str> {
        self.columns
            .iter()
            .filter_map(|c| c.index.map(|i| (c.key.as_str(), self.raw_columns[i].as_str())))
            .collect()
    }

    /// Header text feeding a model attribute, used to report validation
    /// errors in the vocabulary of the source file.
    pub fn header_for_attribute(&self, attribute: &str) -> Option<&str> {
        self.attribution.get(attribute).map(String::as_str)
    }

    pub fn missing_required_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.required && c.index.is_none())
            .map(|c| c.key.as_str())
            .collect()
    }

    pub fn missing_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.index.is_none())
            .map(|c| c.key.as_str())
            .collect()
    }

    /// Source columns no declared column asked for.
    pub fn extra_columns(&self) -> Vec<&str> {
        self.raw_columns
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.columns.iter().any(|c| c.index == Some(*i)))
            .map(|(_, raw)| raw.as_str())
            .collect()
    }

    pub fn is_valid(&self) -> bool {
        self.missing_required_columns().is_empty()
    }
}
