use crate::domain::Cell;
use crate::error::{QueryError, QueryResult};
use std::collections::HashMap;
use std::ops::Index;
use std::sync::Arc;

/// Case-sensitive column name to position lookup shared by every row of a result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnIndex {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl ColumnIndex {
    /// Build from the returned column names; names must be unique
    pub fn new<I, S>(names: I) -> QueryResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let mut positions = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if positions.insert(name.clone(), i).is_some() {
                return Err(QueryError::Configuration(format!(
                    "column name '{}' appears more than once",
                    name
                )));
            }
        }
        Ok(Self { names, positions })
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A result row addressable by column name or position
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    cells: Vec<Cell>,
    columns: Arc<ColumnIndex>,
}

impl Row {
    pub fn new(cells: Vec<Cell>, columns: Arc<ColumnIndex>) -> Self {
        Self { cells, columns }
    }

    /// Cell for `column`, or an error listing the valid column names
    pub fn get(&self, column: &str) -> QueryResult<&Cell> {
        self.columns
            .position(column)
            .and_then(|i| self.cells.get(i))
            .ok_or_else(|| QueryError::InvalidColumnReference {
                column: column.to_string(),
                valid: self.columns.names().to_vec(),
            })
    }

    pub fn get_at(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    pub fn column_names(&self) -> &[String] {
        self.columns.names()
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl Index<usize> for Row {
    type Output = Cell;

    fn index(&self, index: usize) -> &Cell {
        &self.cells[index]
    }
}

/// A result row addressable by position only
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderlessRow {
    cells: Vec<Cell>,
}

impl HeaderlessRow {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    pub fn get(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl Index<usize> for HeaderlessRow {
    type Output = Cell;

    fn index(&self, index: usize) -> &Cell {
        &self.cells[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn company_row() -> Row {
        let columns = Arc::new(ColumnIndex::new(["Name", "CEO"]).unwrap());
        Row::new(vec![Cell::new("ACME"), Cell::new("Bugs")], columns)
    }

    #[test]
    fn test_lookup_by_name_and_position() {
        let row = company_row();
        assert_eq!(row.get("CEO").unwrap().to_string(), "Bugs");
        assert_eq!(row[0].to_string(), "ACME");
        assert_eq!(row.column_names(), ["Name", "CEO"]);
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let row = company_row();
        let err = row.get("ceo").unwrap_err();
        assert_eq!(
            err.to_string(),
            "'ceo' is not a valid column name. Valid column names are: 'Name', 'CEO'"
        );
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        assert!(ColumnIndex::new(["A", "B", "A"]).is_err());
    }

    #[test]
    fn test_headerless_positions() {
        let row = HeaderlessRow::new(vec![Cell::new(1), Cell::new("x")]);
        assert_eq!(row.len(), 2);
        assert_eq!(row[1].to_string(), "x");
        assert!(row.get(2).is_none());
    }
}
