//! Query compilation and result materialization for spreadsheet-like
//! tabular sources
//!
//! Queries are composed against a worksheet, a cell range or a named range,
//! compiled into a parameterized statement for a [`Driver`], and the
//! returned rows are materialized as generic [`Row`]s, positional
//! [`HeaderlessRow`]s or typed [`Record`]s.
//!
//! ## Features
//!
//! - **Column mapping**: properties read from differently named columns,
//!   declared per session or per record type
//! - **Predicate translation**: comparisons, null checks, string matching and
//!   boolean logic become `WHERE` text with `?` placeholders
//! - **Fail fast**: joins, grouping, set operations and other unsupported
//!   operators are rejected before a connection is opened
//! - **Strict mapping**: optional validation that every field or every column
//!   has a counterpart
//! - **Connection reuse**: one retained connection per session when enabled
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use tabula_query::{member, MemoryDriver, QuerySession, Record, SchemaBuilder};
//!
//! #[derive(Debug, Default)]
//! struct Company {
//!     name: String,
//!     ceo: String,
//! }
//!
//! impl Record for Company {
//!     const NAME: &'static str = "Company";
//!
//!     fn describe(schema: &mut SchemaBuilder<Self>) {
//!         schema
//!             .field("Name", |c| &c.name, |c, v| c.name = v)
//!             .column("Company Title");
//!         schema.field("CEO", |c| &c.ceo, |c, v| c.ceo = v);
//!     }
//! }
//!
//! let driver = MemoryDriver::new().with_sheet(
//!     "Sheet1",
//!     &["Company Title", "Boss"],
//!     vec![vec!["ACME".into(), "Wile E. Coyote".into()]],
//! );
//!
//! let mut session = QuerySession::new("companies.xls", Arc::new(driver));
//! session.add_mapping("CEO", "Boss")?;
//!
//! let query = session
//!     .default_worksheet::<Company>()?
//!     .filter(member("Name").eq("ACME"));
//! assert_eq!(
//!     query.compiled()?.predicate.as_deref(),
//!     Some("([Company Title] = ?)")
//! );
//!
//! let company = query.first()?;
//! assert_eq!(company.ceo, "Wile E. Coyote");
//! # Ok::<(), tabula_query::QueryError>(())
//! ```

pub mod args;
pub mod catalog;
pub mod compile;
pub mod domain;
pub mod driver;
pub mod error;
mod executor;
pub mod expr;
pub mod mapping;
pub mod materialize;
pub mod memory;
pub mod model;
pub mod project;
pub mod query;
pub mod schema;
pub mod session;
pub mod value;

// Re-exports
pub use args::{QueryArgs, ResolvedTable, TableIdentity, WorksheetRef, DEFAULT_WORKSHEET};
pub use compile::{CompiledStatement, PredicateTranslator, QueryCompiler, RenderedStatement, TranslatedPredicate};
pub use domain::{Cell, ColumnIndex, HeaderlessRow, Row};
pub use driver::{Connection, ConnectionSpec, Driver, DriverError, RowCursor, VecCursor, SCALAR_COLUMN};
pub use error::{QueryError, QueryResult};
pub use expr::{
    col, col_at, is_null_or_empty, item, lit, member, null, record, BinaryOp, ColumnRef, Expr, ScalarFn, SourceId,
    StringMethod,
};
pub use mapping::{ColumnMapper, Transformation};
pub use materialize::{Materialized, QueryItem, ResultMaterializer};
pub use memory::{ExecutedStatement, MemoryDriver};
pub use model::{BodyClause, ItemShape, JoinClause, OrderDirection, Ordering, QueryModel, ResultOperator};
pub use project::{Bindable, Bindings, ProjectionCompiler, Projector};
pub use query::{Query, Selection};
pub use schema::{schema_of, FieldDescriptor, Record, Schema, SchemaBuilder};
pub use session::QuerySession;
pub use value::{convert, FieldKind, FieldValue, Value};

pub use tabula_config::{QueryOptions, SessionConfig, StrictMapping, TrimSpaces};
