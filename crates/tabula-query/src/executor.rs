//! Statement execution against an open connection.
//!
//! Resolves the table, renders and runs the statement, and turns driver
//! failures that point at a bad table or column into precise errors.

use crate::args::{QueryArgs, ResolvedTable};
use crate::catalog;
use crate::compile::{CompiledStatement, RenderedStatement};
use crate::driver::{Connection, DriverError};
use crate::error::{QueryError, QueryResult};
use crate::value::Value;
use tracing::debug;

/// Raw result of one statement
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Fetched {
    pub table: ResolvedTable,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Resolve the table for `args`, then run `clauses` against it
pub(crate) fn execute(
    connection: &mut dyn Connection,
    args: &QueryArgs,
    clauses: CompiledStatement,
) -> QueryResult<Fetched> {
    let table = args.resolve(|| catalog::list_worksheets(&mut *connection).map_err(QueryError::from))?;
    let statement = clauses.for_table(&table);
    let rendered = statement.render();
    debug!(statement = %rendered, "Executing query");

    let (columns, rows) = match read_all(connection, &rendered) {
        Ok(result) => result,
        Err(err) => return Err(diagnose(connection, args, &table, &statement, err)),
    };

    if statement.selects_all_columns() {
        if let Some(column) = first_unknown(&statement.columns_used, &columns) {
            return Err(QueryError::InvalidColumnReference {
                column: column.to_string(),
                valid: columns,
            });
        }
    }

    Ok(Fetched { table, columns, rows })
}

fn read_all(
    connection: &mut dyn Connection,
    rendered: &RenderedStatement,
) -> Result<(Vec<String>, Vec<Vec<Value>>), DriverError> {
    let mut cursor = connection.execute(&rendered.sql, &rendered.params)?;
    let columns = cursor.columns().to_vec();
    let mut rows = Vec::new();
    while let Some(row) = cursor.next_row()? {
        rows.push(row);
    }
    Ok((columns, rows))
}

/// Map a driver failure to a table or column error when it is one
fn diagnose(
    connection: &mut dyn Connection,
    args: &QueryArgs,
    table: &ResolvedTable,
    statement: &CompiledStatement,
    err: DriverError,
) -> QueryError {
    let name = table.display_name();
    if !name.is_empty() && err.message().contains(name) {
        let valid = catalog::list_worksheets(connection).unwrap_or_default();
        return QueryError::InvalidTableReference {
            table: name.to_string(),
            file: args.file_name().display().to_string(),
            valid,
            message: err.message().to_string(),
        };
    }

    match catalog::column_names(connection, table) {
        Ok(valid) => {
            if let Some(column) = first_unknown(&statement.columns_used, &valid) {
                return QueryError::InvalidColumnReference {
                    column: column.to_string(),
                    valid,
                };
            }
        }
        Err(lookup) => debug!(error = %lookup, "Could not read column names of {}", table),
    }

    QueryError::Driver(err)
}

fn first_unknown<'c>(used: &'c [String], known: &[String]) -> Option<&'c str> {
    used.iter()
        .find(|column| !known.contains(column))
        .map(String::as_str)
}
