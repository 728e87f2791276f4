//! Compiled statement parts and their rendered form.

use crate::args::ResolvedTable;
use crate::model::OrderDirection;
use crate::value::Value;
use std::fmt;

/// Aggregate clause used when no operator sets one
pub const SELECT_ALL: &str = "*";

/// Statement parts collected by the compiler.
///
/// Immutable once [`crate::QueryCompiler::compile`] returns it; rendered to
/// text and parameters at execution time.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    pub aggregate: String,
    pub table: String,
    pub predicate: Option<String>,
    pub order_by: Option<(String, OrderDirection)>,
    /// Values for the `?` placeholders, in order of appearance
    pub params: Vec<Value>,
    /// Resolved column names referenced by the predicate, ordering or
    /// aggregate, without duplicates
    pub columns_used: Vec<String>,
}

impl CompiledStatement {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            aggregate: SELECT_ALL.to_string(),
            table: table.into(),
            predicate: None,
            order_by: None,
            params: Vec::new(),
            columns_used: Vec::new(),
        }
    }

    /// Same statement aimed at `table`
    pub fn for_table(mut self, table: &ResolvedTable) -> Self {
        self.table = table.table_clause();
        self
    }

    pub(crate) fn use_column(&mut self, column: &str) {
        if !self.columns_used.iter().any(|c| c == column) {
            self.columns_used.push(column.to_string());
        }
    }

    /// True when every source column comes back (`*` or `TOP n *`)
    pub fn selects_all_columns(&self) -> bool {
        self.aggregate.ends_with(SELECT_ALL) && !self.aggregate.contains('(')
    }

    /// Render to statement text and its bound parameters
    pub fn render(&self) -> RenderedStatement {
        let mut sql = format!("SELECT {} FROM {}", self.aggregate, self.table);
        if let Some(predicate) = &self.predicate {
            sql.push_str(" WHERE ");
            sql.push_str(predicate);
        }
        if let Some((column, direction)) = &self.order_by {
            let direction = match direction {
                OrderDirection::Asc => "ASC",
                OrderDirection::Desc => "DESC",
            };
            sql.push_str(&format!(" ORDER BY [{}] {}", column, direction));
        }

        RenderedStatement {
            sql,
            params: self.params.clone(),
        }
    }
}

/// Output from rendering
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedStatement {
    /// The statement text with `?` placeholders
    pub sql: String,
    /// Parameters to bind, in placeholder order
    pub params: Vec<Value>,
}

/// `<sql>; p0 = 'text'; p1 = 5;`. Numeric-looking values are not quoted.
impl fmt::Display for RenderedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};", self.sql)?;
        for (i, param) in self.params.iter().enumerate() {
            if param.is_numeric_text() {
                write!(f, " p{} = {};", i, param)?;
            } else {
                write!(f, " p{} = '{}';", i, param)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_minimal() {
        let statement = CompiledStatement::new("[Sheet1$]");
        assert_eq!(statement.render().sql, "SELECT * FROM [Sheet1$]");
        assert!(statement.selects_all_columns());
    }

    #[test]
    fn test_render_full() {
        let mut statement = CompiledStatement::new("[Sheet1$]");
        statement.aggregate = "TOP 5 *".to_string();
        statement.predicate = Some("([Name] = ?)".to_string());
        statement.params.push(Value::from("ACME"));
        statement.order_by = Some(("Employees".to_string(), OrderDirection::Desc));

        let rendered = statement.render();
        assert_eq!(
            rendered.sql,
            "SELECT TOP 5 * FROM [Sheet1$] WHERE ([Name] = ?) ORDER BY [Employees] DESC"
        );
        assert_eq!(rendered.params, vec![Value::from("ACME")]);
        assert!(statement.selects_all_columns());
    }

    #[test]
    fn test_display_for_logging() {
        let rendered = RenderedStatement {
            sql: "SELECT * FROM [Sheet1$] WHERE (([Name] = ?) AND ([Count] > ?))".to_string(),
            params: vec![Value::from("ACME"), Value::Int(5)],
        };
        assert_eq!(
            rendered.to_string(),
            "SELECT * FROM [Sheet1$] WHERE (([Name] = ?) AND ([Count] > ?)); p0 = 'ACME'; p1 = 5;"
        );
    }

    #[test]
    fn test_display_without_params() {
        let rendered = CompiledStatement::new("[Sheet1$]").render();
        assert_eq!(rendered.to_string(), "SELECT * FROM [Sheet1$];");
    }

    #[test]
    fn test_aggregates_do_not_select_all() {
        let mut statement = CompiledStatement::new("[Sheet1$]");
        statement.aggregate = "COUNT(*)".to_string();
        assert!(!statement.selects_all_columns());
        statement.aggregate = "SUM([Employees])".to_string();
        assert!(!statement.selects_all_columns());
    }

    #[test]
    fn test_use_column_dedups() {
        let mut statement = CompiledStatement::new("[Sheet1$]");
        statement.use_column("Name");
        statement.use_column("Boss");
        statement.use_column("Name");
        assert_eq!(statement.columns_used, vec!["Name", "Boss"]);
    }
}
