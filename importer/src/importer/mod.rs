//! Import configuration and the run orchestrator.
//!
//! An [`ImportConfig`] is built once per kind of import and reused across
//! runs. Each run is an [`Importer`] pointed at exactly one input:
//!
//! ```text
//! Source ──▶ parse ──▶ Header ──▶ rows: bind ─▶ apply ─▶ hooks ─▶ save ──▶ Report
//!              │          │                                   │
//!              ▼          ▼                                   ▼
//!         invalid_csv  invalid_header                 aborted (policy)
//! ```
//!
//! # Example
//!
//! ```
//! use csv_importer::columns::ColumnSpec;
//! use csv_importer::importer::{ImportConfig, Importer};
//! use csv_importer::models::document::{Document, DocumentStore};
//! use serde_json::Value;
//!
//! let config: ImportConfig<Document> = ImportConfig::new()
//!     .column(
//!         ColumnSpec::new("email")
//!             .required()
//!             .to(|raw| Value::from(raw.map(str::to_lowercase))),
//!     )
//!     .identifier("email");
//!
//! let mut store = DocumentStore::in_memory();
//! let report = Importer::new(&config)
//!     .content("Email\nBOB@example.com\n")
//!     .run(&mut store)
//!     .unwrap();
//!
//! assert_eq!(report.message(), "Import completed: 1 created");
//! ```

pub mod job;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::io::Read;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::columns::{ColumnSpec, Header};
use crate::error::{ConfigError, ConfigResult, CsvResult, ImportResult};
use crate::models::{Model, ModelAdapter};
use crate::parser::{parse_table, CsvRecord, CsvTable, Source, DEFAULT_DELIMITER};
use crate::report::Report;
use crate::transform::binder::{self, Binding};
use crate::transform::row::{self, Row, RowStatus};

/// Callback run on a bound model before it is validated or saved.
pub type AfterBuild<M> = Arc<dyn Fn(&mut M) + Send + Sync>;

/// Callback run on a model after each save attempt.
pub type AfterSave<M> = Arc<dyn Fn(&M) + Send + Sync>;

// =============================================================================
// Configuration
// =============================================================================

/// What to do when a row fails to save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidPolicy {
    /// Record the failure and move on
    #[default]
    Skip,
    /// Stop at the first failure and report nothing but the abort
    Abort,
}

impl FromStr for InvalidPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skip" => Ok(InvalidPolicy::Skip),
            "abort" => Ok(InvalidPolicy::Abort),
            other => Err(format!("unknown policy '{}', expected skip or abort", other)),
        }
    }
}

impl fmt::Display for InvalidPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InvalidPolicy::Skip => "skip",
            InvalidPolicy::Abort => "abort",
        })
    }
}

/// Declarations shared by every run of one kind of import.
pub struct ImportConfig<M> {
    columns: Vec<ColumnSpec<M>>,
    identifier: Option<String>,
    when_invalid: InvalidPolicy,
    after_build: Vec<AfterBuild<M>>,
    after_save: Vec<AfterSave<M>>,
    delimiter: u8,
    encoding: Option<String>,
}

impl<M> Default for ImportConfig<M> {
    fn default() -> Self {
        Self {
            columns: Vec::new(),
            identifier: None,
            when_invalid: InvalidPolicy::default(),
            after_build: Vec::new(),
            after_save: Vec::new(),
            delimiter: DEFAULT_DELIMITER,
            encoding: None,
        }
    }
}

impl<M> ImportConfig<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a column. Order matters: when several columns accept the
    /// same header, the first declared one gets it.
    pub fn column(mut self, spec: ColumnSpec<M>) -> Self {
        self.columns.push(spec);
        self
    }

    pub fn columns(mut self, specs: impl IntoIterator<Item = ColumnSpec<M>>) -> Self {
        self.columns.extend(specs);
        self
    }

    /// Column used to find existing records.
    pub fn identifier(mut self, key: impl Into<String>) -> Self {
        self.identifier = Some(key.into());
        self
    }

    pub fn when_invalid(mut self, policy: InvalidPolicy) -> Self {
        self.when_invalid = policy;
        self
    }

    pub fn after_build<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut M) + Send + Sync + 'static,
    {
        self.after_build.push(Arc::new(hook));
        self
    }

    pub fn after_save<F>(mut self, hook: F) -> Self
    where
        F: Fn(&M) + Send + Sync + 'static,
    {
        self.after_save.push(Arc::new(hook));
        self
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Decode byte inputs with this label instead of sniffing.
    pub fn encoding(mut self, label: impl Into<String>) -> Self {
        self.encoding = Some(label.into());
        self
    }

    pub fn column_specs(&self) -> &[ColumnSpec<M>] {
        &self.columns
    }

    pub fn spec(&self, key: &str) -> Option<&ColumnSpec<M>> {
        self.columns.iter().find(|c| c.key() == key)
    }

    pub fn identifier_key(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub fn policy(&self) -> InvalidPolicy {
        self.when_invalid
    }

    /// Check the declarations: keys are unique and the identifier, if any,
    /// names a declared column.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut seen = HashSet::new();
        for spec in &self.columns {
            if !seen.insert(spec.key()) {
                return Err(ConfigError::DuplicateColumn(spec.key().to_string()));
            }
        }
        if let Some(key) = &self.identifier {
            if self.spec(key).is_none() {
                return Err(ConfigError::UnknownIdentifier(key.clone()));
            }
        }
        Ok(())
    }
}

impl<M> fmt::Debug for ImportConfig<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportConfig")
            .field("columns", &self.columns)
            .field("identifier", &self.identifier)
            .field("when_invalid", &self.when_invalid)
            .field("after_build", &self.after_build.len())
            .field("after_save", &self.after_save.len())
            .field("delimiter", &char::from(self.delimiter))
            .field("encoding", &self.encoding)
            .finish()
    }
}

// =============================================================================
// Runs
// =============================================================================

/// One run of an import over one input.
pub struct Importer<'c, M> {
    config: &'c ImportConfig<M>,
    sources: Vec<Source>,
    identifier: Option<String>,
}

impl<'c, M: Model> Importer<'c, M> {
    pub fn new(config: &'c ImportConfig<M>) -> Self {
        Self {
            config,
            sources: Vec::new(),
            identifier: None,
        }
    }

    /// Read CSV text from memory.
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.sources.push(Source::Content(content.into()));
        self
    }

    /// Read CSV bytes from a stream.
    pub fn file(mut self, reader: impl Read + 'static) -> Self {
        self.sources.push(Source::File(Box::new(reader)));
        self
    }

    /// Read CSV bytes from a file on disk.
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(Source::Path(path.into()));
        self
    }

    /// Override the configured identifier for this run.
    pub fn identifier(mut self, key: impl Into<String>) -> Self {
        self.identifier = Some(key.into());
        self
    }

    /// Resolve the input's header without touching any model.
    ///
    /// Unlike [`Importer::run`], malformed CSV is returned as an error.
    pub fn header(self) -> ImportResult<Header> {
        let prepared = self.prepare()?;
        let table = prepared.table?;
        Ok(Header::resolve(&table.header, prepared.config.column_specs()))
    }

    /// Import every row, saving through `adapter` inside its transaction.
    ///
    /// Malformed input, missing required columns and failing rows all end up
    /// in the report. Errors are reserved for bad configuration, unreadable
    /// input and adapter infrastructure failures.
    pub fn run<A>(self, adapter: &mut A) -> ImportResult<Report<M>>
    where
        A: ModelAdapter<Model = M>,
    {
        let (run, records) = match self.start()? {
            Stage::Rows(run, records) => (run, records),
            Stage::Done(report) => return Ok(report),
        };

        let outcome = adapter.transaction(|adapter| run.process(&records, adapter))?;

        let report = match outcome {
            Outcome::Completed(rows) => Report::completed(&run.header, rows),
            Outcome::Aborted(row) => {
                log::warn!("Import aborted on line {} ({})", row.line, row.status.label());
                Report::aborted(&run.header, row)
            }
        };
        log::info!("{}", report.message());
        Ok(report)
    }

    /// Dry run: bind and validate every row without saving anything.
    ///
    /// Failing rows are marked `invalid` and never abort the run; passing
    /// rows report what a real run would have done with them.
    pub fn preview<A>(self, adapter: &A) -> ImportResult<Report<M>>
    where
        A: ModelAdapter<Model = M>,
    {
        let (run, records) = match self.start()? {
            Stage::Rows(run, records) => (run, records),
            Stage::Done(report) => return Ok(report.dry_run()),
        };

        let rows = records
            .iter()
            .map(|record| {
                let mut binding = run.bind(record, adapter);
                let status = binder::check(adapter, &mut binding);
                run.row(record, binding.model, status)
            })
            .collect();

        let report = Report::completed(&run.header, rows).dry_run();
        log::info!("Dry run: {}", report.message());
        Ok(report)
    }

    /// Validate the configuration, pick the identifier and read the input.
    fn prepare(self) -> ImportResult<Prepared<'c, M>> {
        let Importer {
            config,
            mut sources,
            identifier,
        } = self;

        config.validate()?;

        let identifier = match identifier.as_deref().or(config.identifier_key()) {
            Some(key) => Some(
                config
                    .spec(key)
                    .ok_or_else(|| ConfigError::UnknownIdentifier(key.to_string()))?,
            ),
            None => None,
        };

        if sources.len() > 1 {
            let kinds: Vec<&str> = sources.iter().map(Source::kind).collect();
            return Err(ConfigError::ConflictingSources(kinds.join(", ")).into());
        }
        let source = sources.pop().ok_or(ConfigError::MissingSource)?;

        log::info!(
            "Starting import from {} (identifier: {}, when invalid: {})",
            source.kind(),
            identifier.map_or("none", |spec| spec.key()),
            config.policy()
        );

        let (content, encoding) = source.read_to_string(config.encoding.as_deref())?;
        log::debug!("Read {} bytes as {}", content.len(), encoding);

        Ok(Prepared {
            config,
            identifier,
            table: parse_table(&content, config.delimiter),
        })
    }

    /// Everything up to the first data row.
    fn start(self) -> ImportResult<Stage<'c, M>> {
        let Prepared {
            config,
            identifier,
            table,
        } = self.prepare()?;

        let table = match table {
            Ok(table) => table,
            Err(e) => {
                log::warn!("Invalid CSV: {}", e);
                return Ok(Stage::Done(Report::invalid_csv(e)));
            }
        };

        let header = Header::resolve(&table.header, config.column_specs());
        log::info!(
            "Matched columns: {:?}, extra columns: {:?}",
            header.mapping(),
            header.extra_columns()
        );

        if !header.is_valid() {
            log::warn!(
                "Missing required columns: {}",
                header.missing_required_columns().join(", ")
            );
            return Ok(Stage::Done(Report::invalid_header(&header)));
        }

        log::info!("Processing {} rows", table.records.len());
        let CsvTable { records, .. } = table;
        Ok(Stage::Rows(
            Run {
                config,
                identifier,
                header,
            },
            records,
        ))
    }
}

struct Prepared<'c, M> {
    config: &'c ImportConfig<M>,
    identifier: Option<&'c ColumnSpec<M>>,
    table: CsvResult<CsvTable>,
}

enum Stage<'c, M> {
    Rows(Run<'c, M>, Vec<CsvRecord>),
    Done(Report<M>),
}

enum Outcome<M> {
    Completed(Vec<Row<M>>),
    Aborted(Row<M>),
}

/// Row processing state for a run whose header resolved.
struct Run<'c, M> {
    config: &'c ImportConfig<M>,
    identifier: Option<&'c ColumnSpec<M>>,
    header: Header,
}

impl<M: Model> Run<'_, M> {
    fn process<A>(&self, records: &[CsvRecord], adapter: &mut A) -> Outcome<M>
    where
        A: ModelAdapter<Model = M>,
    {
        let mut rows = Vec::with_capacity(records.len());

        for record in records {
            let mut binding = self.bind(record, adapter);
            let status = binder::persist(adapter, &mut binding);
            for hook in &self.config.after_save {
                hook(&binding.model);
            }

            let row = self.row(record, binding.model, status);
            if !row.is_valid() {
                log::debug!(
                    "Line {}: {} ({:?})",
                    row.line,
                    row.status.label(),
                    row.errors.keys().collect::<Vec<_>>()
                );
                if self.config.policy() == InvalidPolicy::Abort {
                    return Outcome::Aborted(row);
                }
            }
            rows.push(row);
        }

        Outcome::Completed(rows)
    }

    /// Find or build the row's model, then assign its values.
    fn bind<A>(&self, record: &CsvRecord, adapter: &A) -> Binding<M>
    where
        A: ModelAdapter<Model = M>,
    {
        let values = row::extract(record, &self.header);
        let mut binding = binder::resolve_identity(adapter, self.identifier, &values);
        row::apply(&mut binding.model, &values, self.config.column_specs());
        for hook in &self.config.after_build {
            hook(&mut binding.model);
        }
        binding
    }

    fn row(&self, record: &CsvRecord, model: M, status: RowStatus) -> Row<M> {
        let errors = if status.is_failure() {
            row::header_errors(model.errors(), &self.header)
        } else {
            BTreeMap::new()
        };
        Row {
            line: record.line,
            csv_attributes: row::csv_attributes(record, &self.header),
            model,
            errors,
            status,
        }
    }
}
