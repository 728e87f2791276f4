//! Table listings and column discovery on top of a [`Connection`].
//!
//! Drivers report raw table names: `Sheet1$` and `'My Sheet$'` are
//! worksheets, `Sheet1$Totals` is a worksheet-scoped named range and a name
//! without `$` is a workbook-scoped one.

use crate::args::ResolvedTable;
use crate::driver::{Connection, DriverError};

const BUILTIN_MARKERS: &[&str] = &["FilterDatabase", "Print_Area"];

fn is_table(raw: &str) -> bool {
    raw.ends_with('$') || (raw.starts_with('\'') && raw.ends_with("$'"))
}

fn is_named_range(raw: &str) -> bool {
    !raw.contains('$') || (!raw.ends_with('$') && !raw.ends_with("$'"))
}

fn is_worksheet_scoped(raw: &str) -> bool {
    is_named_range(raw) && raw.contains('$')
}

fn is_builtin(name: &str) -> bool {
    BUILTIN_MARKERS.iter().any(|marker| name.contains(marker))
}

fn unquote(name: &str) -> String {
    let name = name.strip_prefix('\'').unwrap_or(name);
    let name = name.strip_suffix('\'').unwrap_or(name);
    name.replace("''", "'")
}

/// Worksheet names without `$` markers or quoting
pub fn worksheet_names(raw: &[String]) -> Vec<String> {
    raw.iter()
        .filter(|name| is_table(name))
        .map(|name| unquote(&name.replace('$', "")))
        .filter(|name| !is_builtin(name))
        .collect()
}

/// Named ranges scoped to `worksheet`, or workbook-scoped ones when `None`
pub fn named_ranges(raw: &[String], worksheet: Option<&str>) -> Vec<String> {
    raw.iter()
        .filter(|name| is_named_range(name))
        .filter(|name| match worksheet {
            Some(worksheet) => unquote(name).starts_with(worksheet) && is_worksheet_scoped(name),
            None => !is_worksheet_scoped(name),
        })
        .map(|name| unquote(name))
        .filter(|name| !is_builtin(name))
        .filter_map(|name| name.rsplit('$').next().map(str::to_string))
        .collect()
}

pub(crate) fn list_worksheets(connection: &mut dyn Connection) -> Result<Vec<String>, DriverError> {
    Ok(worksheet_names(&connection.table_names()?))
}

pub(crate) fn list_named_ranges(
    connection: &mut dyn Connection,
    worksheet: Option<&str>,
) -> Result<Vec<String>, DriverError> {
    Ok(named_ranges(&connection.table_names()?, worksheet))
}

/// Column names of `table`, read from the header of a one-row query
pub(crate) fn column_names(connection: &mut dyn Connection, table: &ResolvedTable) -> Result<Vec<String>, DriverError> {
    let sql = format!("SELECT TOP 1 * FROM {}", table.table_clause());
    let cursor = connection.execute(&sql, &[])?;
    Ok(cursor.columns().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> Vec<String> {
        [
            "Sheet1$",
            "'My Sheet$'",
            "'O''Brien$'",
            "Sheet1$Totals",
            "Sheet1$_FilterDatabase",
            "Regions",
            "Print_Area",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    #[test]
    fn test_worksheet_names() {
        assert_eq!(worksheet_names(&raw()), vec!["Sheet1", "My Sheet", "O'Brien"]);
    }

    #[test]
    fn test_named_ranges() {
        assert_eq!(named_ranges(&raw(), None), vec!["Regions"]);
        assert_eq!(named_ranges(&raw(), Some("Sheet1")), vec!["Totals"]);
        assert!(named_ranges(&raw(), Some("My Sheet")).is_empty());
    }
}
