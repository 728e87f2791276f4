//! The narrow contract tabula needs from a tabular backend.
//!
//! A [`Driver`] opens [`Connection`]s; a connection executes statements and
//! lists the tables of its source. Everything else (column discovery,
//! worksheet listing) is built on top of those two calls.

use crate::value::Value;
use std::path::PathBuf;
use thiserror::Error;

/// Column name drivers report for a computed scalar like `COUNT(*)`
pub const SCALAR_COLUMN: &str = "Expr1000";

/// Error raised by a driver. Its message is inspected to recognise bad
/// table references.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct DriverError {
    message: String,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// How to open a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSpec {
    pub path: PathBuf,
    /// First row holds column names
    pub has_header: bool,
    pub read_only: bool,
}

pub trait Driver: Send + Sync {
    fn name(&self) -> &str;

    fn open(&self, spec: &ConnectionSpec) -> Result<Box<dyn Connection>, DriverError>;

    /// Column name marking a single synthetic scalar result
    fn scalar_column(&self) -> &str {
        SCALAR_COLUMN
    }
}

/// An open session against one source. Dropping it releases it.
pub trait Connection: Send {
    /// Execute `sql`, binding `params` to its `?` placeholders in order
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<Box<dyn RowCursor + '_>, DriverError>;

    /// Raw table names of the source, e.g. `Sheet1$`, `'My Sheet$'`,
    /// `Sheet1$Totals` or `Totals`
    fn table_names(&mut self) -> Result<Vec<String>, DriverError>;

    /// Release the connection. Dropping without calling this also releases
    /// it, but loses any error.
    fn close(self: Box<Self>) -> Result<(), DriverError> {
        Ok(())
    }
}

/// Forward-only cursor over a statement's rows
pub trait RowCursor {
    fn columns(&self) -> &[String];

    fn next_row(&mut self) -> Result<Option<Vec<Value>>, DriverError>;
}

/// Cursor over rows already in memory
#[derive(Debug, Clone, Default)]
pub struct VecCursor {
    columns: Vec<String>,
    rows: std::vec::IntoIter<Vec<Value>>,
}

impl VecCursor {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows: rows.into_iter(),
        }
    }
}

impl RowCursor for VecCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Vec<Value>>, DriverError> {
        Ok(self.rows.next())
    }
}
