//! Per-query configuration snapshot and table resolution.
//!
//! [`QueryArgs`] is built once per query root and never mutated. Anything
//! that can only be known by asking the source, like the name behind a
//! worksheet index, is worked out by [`QueryArgs::resolve`] into a separate
//! [`ResolvedTable`].

use crate::driver::ConnectionSpec;
use crate::error::{QueryError, QueryResult};
use crate::mapping::ColumnMapper;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabula_config::QueryOptions;

/// Worksheet used when a query names neither a worksheet nor a named range
pub const DEFAULT_WORKSHEET: &str = "Sheet1";

const CSV_EXTENSION: &str = ".csv";

static CELL_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z]{1,3}[0-9]{1,7}$").expect("cell reference pattern is valid")
});

/// Worksheet chosen by name or by position
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorksheetRef {
    Name(String),
    Index(usize),
}

impl From<&str> for WorksheetRef {
    fn from(name: &str) -> Self {
        WorksheetRef::Name(name.to_string())
    }
}

impl From<String> for WorksheetRef {
    fn from(name: String) -> Self {
        WorksheetRef::Name(name)
    }
}

impl From<usize> for WorksheetRef {
    fn from(index: usize) -> Self {
        WorksheetRef::Index(index)
    }
}

/// Which part of the source a query reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableIdentity {
    Worksheet(Option<WorksheetRef>),
    Range {
        worksheet: Option<WorksheetRef>,
        start: String,
        end: String,
    },
    NamedRange {
        worksheet: Option<WorksheetRef>,
        name: String,
    },
}

impl TableIdentity {
    fn worksheet(&self) -> Option<&WorksheetRef> {
        match self {
            TableIdentity::Worksheet(ws) => ws.as_ref(),
            TableIdentity::Range { worksheet, .. } | TableIdentity::NamedRange { worksheet, .. } => {
                worksheet.as_ref()
            }
        }
    }
}

/// Immutable configuration of one query
#[derive(Debug, Clone)]
pub struct QueryArgs {
    file_name: PathBuf,
    table: TableIdentity,
    has_header: bool,
    mapper: Arc<ColumnMapper>,
    options: QueryOptions,
}

impl QueryArgs {
    /// Validate and build. Fails on a missing file name, a malformed range
    /// endpoint, or a headerless range over a CSV file.
    pub fn new(
        file_name: impl Into<PathBuf>,
        table: TableIdentity,
        has_header: bool,
        mapper: Arc<ColumnMapper>,
        options: QueryOptions,
    ) -> QueryResult<Self> {
        let file_name = file_name.into();
        if file_name.as_os_str().is_empty() {
            return Err(QueryError::Configuration("file name is not set".to_string()));
        }

        if let TableIdentity::Range { start, end, .. } = &table {
            validate_cell_reference("StartRange", start)?;
            validate_cell_reference("EndRange", end)?;
            if !has_header && is_csv_path(&file_name) {
                return Err(QueryError::Configuration(
                    "Cannot use WorksheetRangeNoHeader on csv files".to_string(),
                ));
            }
        }

        if let Some(WorksheetRef::Name(name)) = table.worksheet() {
            if name.is_empty() {
                return Err(QueryError::Configuration("worksheet name is empty".to_string()));
            }
        }

        Ok(Self {
            file_name,
            table,
            has_header,
            mapper,
            options,
        })
    }

    pub fn file_name(&self) -> &Path {
        &self.file_name
    }

    pub fn table(&self) -> &TableIdentity {
        &self.table
    }

    pub fn has_header(&self) -> bool {
        self.has_header
    }

    pub fn mapper(&self) -> &ColumnMapper {
        &self.mapper
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn is_csv(&self) -> bool {
        is_csv_path(&self.file_name)
    }

    pub fn connection_spec(&self) -> ConnectionSpec {
        ConnectionSpec {
            path: self.file_name.clone(),
            has_header: self.has_header,
            read_only: self.options.read_only,
        }
    }

    /// Work out the concrete table reference.
    ///
    /// `worksheet_names` is only called for worksheet indexes.
    pub fn resolve<F>(&self, worksheet_names: F) -> QueryResult<ResolvedTable>
    where
        F: FnOnce() -> QueryResult<Vec<String>>,
    {
        let named_range = match &self.table {
            TableIdentity::NamedRange { name, .. } => Some(name.clone()),
            _ => None,
        };
        let range = match &self.table {
            TableIdentity::Range { start, end, .. } => Some((start.clone(), end.clone())),
            _ => None,
        };

        let worksheet = if self.is_csv() {
            Some(
                self.file_name
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            )
        } else {
            match self.table.worksheet() {
                Some(WorksheetRef::Name(name)) => Some(name.clone()),
                Some(WorksheetRef::Index(index)) => {
                    let names = worksheet_names()?;
                    let name = names.get(*index).cloned().ok_or_else(|| {
                        QueryError::Configuration("Worksheet Index Out of Range".to_string())
                    })?;
                    Some(name)
                }
                None if named_range.is_some() => None,
                None => Some(DEFAULT_WORKSHEET.to_string()),
            }
        };

        Ok(ResolvedTable {
            worksheet,
            named_range,
            range,
        })
    }
}

impl fmt::Display for QueryArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FileName: '{}'; Table: {:?}; NoHeader: {}; ColumnMappings: {}; Transformations: {}, {}",
            self.file_name.display(),
            self.table,
            !self.has_header,
            self.mapper,
            self.mapper.transformed_properties().join(", "),
            self.options
        )
    }
}

/// Fully specified table reference produced by [`QueryArgs::resolve`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTable {
    pub worksheet: Option<String>,
    pub named_range: Option<String>,
    pub range: Option<(String, String)>,
}

impl ResolvedTable {
    /// Name reported in diagnostics
    pub fn display_name(&self) -> &str {
        self.worksheet
            .as_deref()
            .or(self.named_range.as_deref())
            .unwrap_or_default()
    }

    /// Table clause: `[Sheet$]`, `[Sheet$A1:D10]`, `[Sheet$Range]` or `[Range]`
    pub fn table_clause(&self) -> String {
        let worksheet = self.worksheet.as_deref().unwrap_or_default();
        let clause = match (&self.range, &self.named_range) {
            (Some((start, end)), _) => format!("[{}${}:{}]", worksheet, start, end),
            (None, Some(range)) if self.worksheet.is_none() => format!("[{}]", range),
            (None, range) => format!("[{}${}]", worksheet, range.as_deref().unwrap_or_default()),
        };

        if worksheet.to_lowercase().ends_with(CSV_EXTENSION) {
            clause.replace("$]", "]")
        } else {
            clause
        }
    }
}

impl fmt::Display for ResolvedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.table_clause())
    }
}

fn validate_cell_reference(argument: &'static str, value: &str) -> QueryResult<()> {
    if CELL_REFERENCE.is_match(value) {
        Ok(())
    } else {
        Err(QueryError::MalformedRangeReference {
            argument,
            value: value.to_string(),
        })
    }
}

fn is_csv_path(path: &Path) -> bool {
    path.to_string_lossy().to_lowercase().ends_with(CSV_EXTENSION)
}
