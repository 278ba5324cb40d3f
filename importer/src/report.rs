//! Run reports.
//!
//! A [`Report`] is the single result of a run. Every data row lands in
//! exactly one status bucket, and [`Report::message`] renders the canonical
//! one-line summary shown to users.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::columns::Header;
use crate::error::CsvError;
use crate::transform::row::{Row, RowStatus};

/// Buckets in message order.
const MESSAGE_ORDER: [RowStatus; 5] = [
    RowStatus::Created,
    RowStatus::Updated,
    RowStatus::FailedToCreate,
    RowStatus::FailedToUpdate,
    RowStatus::Invalid,
];

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    /// The input could not be parsed; no rows were processed
    InvalidCsv,
    /// Required columns are missing; no rows were processed
    InvalidHeader,
    /// A row failed under the `abort` policy; earlier results were discarded
    Aborted,
    /// Every row was processed
    Completed,
}

/// Result of one run.
#[derive(Debug, Clone)]
pub struct Report<M> {
    pub status: ImportStatus,
    /// Processed rows in file order. Empty unless completed.
    pub rows: Vec<Row<M>>,
    /// Missing required columns, for `invalid_header` only.
    pub missing_columns: Vec<String>,
    /// Source columns no declared column asked for.
    pub extra_columns: Vec<String>,
    /// Parser failure, for `invalid_csv` only.
    pub parser_error: Option<CsvError>,
    /// The row that triggered an abort. Not counted in any bucket.
    pub failed_row: Option<Row<M>>,
    /// Rows were validated but not saved.
    pub dry_run: bool,
}

impl<M> Report<M> {
    fn empty(status: ImportStatus) -> Self {
        Self {
            status,
            rows: Vec::new(),
            missing_columns: Vec::new(),
            extra_columns: Vec::new(),
            parser_error: None,
            failed_row: None,
            dry_run: false,
        }
    }

    pub fn invalid_csv(error: CsvError) -> Self {
        Self {
            parser_error: Some(error),
            ..Self::empty(ImportStatus::InvalidCsv)
        }
    }

    pub fn invalid_header(header: &Header) -> Self {
        Self {
            missing_columns: owned(header.missing_required_columns()),
            extra_columns: owned(header.extra_columns()),
            ..Self::empty(ImportStatus::InvalidHeader)
        }
    }

    pub fn aborted(header: &Header, failed_row: Row<M>) -> Self {
        Self {
            extra_columns: owned(header.extra_columns()),
            failed_row: Some(failed_row),
            ..Self::empty(ImportStatus::Aborted)
        }
    }

    pub fn completed(header: &Header, rows: Vec<Row<M>>) -> Self {
        Self {
            rows,
            extra_columns: owned(header.extra_columns()),
            ..Self::empty(ImportStatus::Completed)
        }
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Completed with no failing row.
    pub fn success(&self) -> bool {
        self.status == ImportStatus::Completed && self.rows.iter().all(Row::is_valid)
    }

    pub fn valid_header(&self) -> bool {
        !matches!(self.status, ImportStatus::InvalidCsv | ImportStatus::InvalidHeader)
    }

    pub fn count(&self, status: RowStatus) -> usize {
        self.rows.iter().filter(|r| r.status == status).count()
    }

    pub fn rows_with(&self, status: RowStatus) -> Vec<&Row<M>> {
        self.rows.iter().filter(|r| r.status == status).collect()
    }

    pub fn created_rows(&self) -> Vec<&Row<M>> {
        self.rows_with(RowStatus::Created)
    }

    pub fn updated_rows(&self) -> Vec<&Row<M>> {
        self.rows_with(RowStatus::Updated)
    }

    pub fn failed_to_create_rows(&self) -> Vec<&Row<M>> {
        self.rows_with(RowStatus::FailedToCreate)
    }

    pub fn failed_to_update_rows(&self) -> Vec<&Row<M>> {
        self.rows_with(RowStatus::FailedToUpdate)
    }

    /// Rows that failed validation in a dry run.
    pub fn invalid_rows(&self) -> Vec<&Row<M>> {
        self.rows_with(RowStatus::Invalid)
    }

    /// Created or updated rows.
    pub fn valid_rows(&self) -> Vec<&Row<M>> {
        self.rows.iter().filter(|r| r.is_valid()).collect()
    }

    /// Rows in any failure bucket.
    pub fn failed_rows(&self) -> Vec<&Row<M>> {
        self.rows.iter().filter(|r| !r.is_valid()).collect()
    }

    pub fn message(&self) -> String {
        match self.status {
            ImportStatus::InvalidCsv => self
                .parser_error
                .as_ref()
                .map_or_else(|| "Invalid CSV".to_string(), |e| e.message.clone()),
            ImportStatus::InvalidHeader => format!(
                "The following columns are required: {}",
                self.missing_columns.join(", ")
            ),
            ImportStatus::Aborted => "Import aborted".to_string(),
            ImportStatus::Completed => {
                let clauses: Vec<String> = MESSAGE_ORDER
                    .iter()
                    .map(|&status| (self.count(status), status))
                    .filter(|(n, _)| *n > 0)
                    .map(|(n, status)| format!("{} {}", n, status.label()))
                    .collect();
                if clauses.is_empty() {
                    "Import completed".to_string()
                } else {
                    format!("Import completed: {}", clauses.join(", "))
                }
            }
        }
    }

    /// Serializable view, without the models.
    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            status: self.status,
            success: self.success(),
            message: self.message(),
            dry_run: self.dry_run,
            counts: Counts {
                created: self.count(RowStatus::Created),
                updated: self.count(RowStatus::Updated),
                failed_to_create: self.count(RowStatus::FailedToCreate),
                failed_to_update: self.count(RowStatus::FailedToUpdate),
                invalid: self.count(RowStatus::Invalid),
            },
            missing_columns: self.missing_columns.clone(),
            extra_columns: self.extra_columns.clone(),
            parser_error: self.parser_error.clone(),
            rows: self.rows.iter().map(RowSummary::from_row).collect(),
            failed_row: self.failed_row.as_ref().map(RowSummary::from_row),
        }
    }
}

fn owned(items: Vec<&str>) -> Vec<String> {
    items.into_iter().map(str::to_string).collect()
}

// =============================================================================
// Serializable summary
// =============================================================================

/// Report as sent to the CLI or any JSON consumer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub status: ImportStatus,
    pub success: bool,
    pub message: String,
    pub dry_run: bool,
    pub counts: Counts,
    pub missing_columns: Vec<String>,
    pub extra_columns: Vec<String>,
    pub parser_error: Option<CsvError>,
    pub rows: Vec<RowSummary>,
    pub failed_row: Option<RowSummary>,
}

/// Row counts per bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Counts {
    pub created: usize,
    pub updated: usize,
    pub failed_to_create: usize,
    pub failed_to_update: usize,
    pub invalid: usize,
}

/// Outcome of one row
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowSummary {
    pub line: usize,
    pub status: RowStatus,
    pub errors: BTreeMap<String, Vec<String>>,
}

impl RowSummary {
    fn from_row<M>(row: &Row<M>) -> Self {
        Self {
            line: row.line,
            status: row.status,
            errors: row.errors.clone(),
        }
    }
}
