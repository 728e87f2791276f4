//! Error types for query compilation and execution

use crate::driver::DriverError;
use thiserror::Error;

/// Query error type
#[derive(Error, Debug)]
pub enum QueryError {
    /// A query operator the compiler refuses to translate
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// An expression shape the translator has no rule for
    #[error("Unsupported expression: {0}")]
    UnsupportedExpression(String),

    /// A range endpoint that is not a cell reference like `B3`
    #[error("{argument} argument '{value}' is invalid format for cell name")]
    MalformedRangeReference { argument: &'static str, value: String },

    /// The driver rejected the table the query was aimed at
    #[error(
        "'{table}' is not a valid worksheet name in file {file}. Valid worksheet names are: '{}'. Error received: {message}",
        .valid.join("', '")
    )]
    InvalidTableReference {
        table: String,
        file: String,
        valid: Vec<String>,
        message: String,
    },

    /// A filter or ordering named a column the source does not have
    #[error("'{column}' is not a valid column name. Valid column names are: '{}'", .valid.join("', '"))]
    InvalidColumnReference { column: String, valid: Vec<String> },

    /// A field or column without a counterpart under strict mapping
    #[error("Strict mapping violation: {0}")]
    StrictMappingViolation(String),

    /// Invalid session or query configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A value could not be converted to the declared type
    #[error("Cannot convert {value} to {target}{}", .field.as_ref().map(|f| format!(" for field '{}'", f)).unwrap_or_default())]
    Conversion {
        value: String,
        target: &'static str,
        field: Option<String>,
    },

    /// A record schema descriptor is invalid
    #[error("Invalid record schema for {record}: {message}")]
    Schema { record: &'static str, message: String },

    /// First() on a query with no results
    #[error("Sequence contains no elements")]
    EmptySequence,

    /// Error raised by the driver that matched no known pattern
    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl QueryError {
    pub(crate) fn conversion(value: impl ToString, target: &'static str) -> Self {
        Self::Conversion {
            value: value.to_string(),
            target,
            field: None,
        }
    }

    /// Attach the field being populated to a conversion error
    pub(crate) fn for_field(self, name: &str) -> Self {
        match self {
            Self::Conversion { value, target, .. } => Self::Conversion {
                value,
                target,
                field: Some(name.to_string()),
            },
            other => other,
        }
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
