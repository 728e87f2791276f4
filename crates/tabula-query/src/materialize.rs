//! Turning driver rows into query items.
//!
//! A returned row becomes a [`Row`], a [`HeaderlessRow`] or a typed
//! [`Record`]. Records are populated field by field through the session's
//! column mappings: transformation first, then the type-directed cast, then
//! the trim policy for textual fields.

use crate::args::{QueryArgs, ResolvedTable};
use crate::domain::{Cell, ColumnIndex, HeaderlessRow, Row};
use crate::error::{QueryError, QueryResult};
use crate::expr::{ColumnRef, Expr};
use crate::model::ItemShape;
use crate::project::{Bindable, ProjectionCompiler};
use crate::schema::{schema_of, FieldDescriptor, Record};
use crate::value::{convert, FieldKind, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Item type a query yields.
///
/// Implemented for [`Row`], [`HeaderlessRow`] and every [`Record`].
pub trait QueryItem: Bindable + Sized + Send + 'static {
    fn shape() -> ItemShape;

    /// (field, column) hints declared on the item type
    fn column_hints() -> QueryResult<Vec<(&'static str, &'static str)>> {
        Ok(Vec::new())
    }

    fn materialize(
        materializer: &ResultMaterializer<'_>,
        columns: &[String],
        rows: Vec<Vec<Value>>,
    ) -> QueryResult<Vec<Self>>;

    /// Values of a `DISTINCT` statement for `selector`, read the way a
    /// selected item would be
    fn distinct_values(
        materializer: &ResultMaterializer<'_>,
        _selector: &Expr,
        rows: Vec<Vec<Value>>,
    ) -> QueryResult<Vec<Value>> {
        Ok(materializer.column_values(rows))
    }
}

impl Bindable for Row {
    fn member(&self, name: &str) -> QueryResult<Value> {
        Ok(self.get(name)?.value().clone())
    }

    fn column(&self, column: &ColumnRef) -> QueryResult<Value> {
        match column {
            ColumnRef::Name(name) => Ok(self.get(name)?.value().clone()),
            ColumnRef::Index(index) => self
                .get_at(*index)
                .map(|cell| cell.value().clone())
                .ok_or_else(|| QueryError::UnsupportedExpression(format!("column index {} is out of range", index))),
        }
    }

    fn to_value(&self) -> Value {
        Value::Record(
            self.column_names()
                .iter()
                .cloned()
                .zip(self.cells().iter().map(|cell| cell.value().clone()))
                .collect(),
        )
    }
}

impl QueryItem for Row {
    fn shape() -> ItemShape {
        ItemShape::Row
    }

    fn materialize(
        materializer: &ResultMaterializer<'_>,
        columns: &[String],
        rows: Vec<Vec<Value>>,
    ) -> QueryResult<Vec<Self>> {
        materializer.rows(columns, rows)
    }
}

impl Bindable for HeaderlessRow {
    fn member(&self, name: &str) -> QueryResult<Value> {
        Err(QueryError::UnsupportedExpression(format!(
            "member '{}' on a row without a header, address columns by position",
            name
        )))
    }

    fn column(&self, column: &ColumnRef) -> QueryResult<Value> {
        match column {
            ColumnRef::Index(index) => self
                .get(*index)
                .map(|cell| cell.value().clone())
                .ok_or_else(|| QueryError::UnsupportedExpression(format!("column index {} is out of range", index))),
            ColumnRef::Name(name) => Err(QueryError::UnsupportedExpression(format!(
                "column '{}' on a row without a header, address columns by position",
                name
            ))),
        }
    }

    fn to_value(&self) -> Value {
        Value::Record(
            self.cells()
                .iter()
                .enumerate()
                .map(|(i, cell)| (format!("F{}", i + 1), cell.value().clone()))
                .collect(),
        )
    }
}

impl QueryItem for HeaderlessRow {
    fn shape() -> ItemShape {
        ItemShape::Headerless
    }

    fn materialize(
        materializer: &ResultMaterializer<'_>,
        _columns: &[String],
        rows: Vec<Vec<Value>>,
    ) -> QueryResult<Vec<Self>> {
        Ok(materializer.headerless_rows(rows))
    }
}

impl<R: Record> Bindable for R {
    fn member(&self, name: &str) -> QueryResult<Value> {
        let schema = schema_of::<R>()?;
        let field = schema.field(name).ok_or_else(|| {
            QueryError::UnsupportedExpression(format!("'{}' is not a field of {}", name, R::NAME))
        })?;
        Ok(field.get(self))
    }

    fn column(&self, column: &ColumnRef) -> QueryResult<Value> {
        Err(QueryError::UnsupportedExpression(format!(
            "column {} on {}, use a member instead",
            column,
            R::NAME
        )))
    }

    fn to_value(&self) -> Value {
        schema_of::<R>()
            .map(|schema| schema.to_value(self))
            .unwrap_or_default()
    }
}

impl<R: Record> QueryItem for R {
    fn shape() -> ItemShape {
        ItemShape::Record(R::NAME)
    }

    fn column_hints() -> QueryResult<Vec<(&'static str, &'static str)>> {
        Ok(schema_of::<R>()?.column_hints().collect())
    }

    fn materialize(
        materializer: &ResultMaterializer<'_>,
        columns: &[String],
        rows: Vec<Vec<Value>>,
    ) -> QueryResult<Vec<Self>> {
        materializer.records(columns, rows)
    }

    fn distinct_values(
        materializer: &ResultMaterializer<'_>,
        selector: &Expr,
        rows: Vec<Vec<Value>>,
    ) -> QueryResult<Vec<Value>> {
        let Expr::Member { name, .. } = selector.unwrap_convert() else {
            return Ok(materializer.column_values(rows));
        };
        let projector = ProjectionCompiler::compile(selector)?;
        materializer
            .field_records::<R>(name, rows)?
            .iter()
            .map(|record| projector.apply_to(record))
            .collect()
    }
}

/// Result of one executed statement
#[derive(Debug, Clone, PartialEq)]
pub enum Materialized<T> {
    Items(Vec<T>),
    /// The single value of a scalar aggregate
    Scalar(Value),
}

pub struct ResultMaterializer<'a> {
    args: &'a QueryArgs,
    table: &'a ResolvedTable,
    scalar_column: &'a str,
}

impl<'a> ResultMaterializer<'a> {
    pub fn new(args: &'a QueryArgs, table: &'a ResolvedTable, scalar_column: &'a str) -> Self {
        Self {
            args,
            table,
            scalar_column,
        }
    }

    /// Materialize `rows`. A lone synthetic scalar column yields its first
    /// value instead of items.
    pub fn materialize<T: QueryItem>(&self, columns: &[String], rows: Vec<Vec<Value>>) -> QueryResult<Materialized<T>> {
        if let [column] = columns {
            if column == self.scalar_column {
                let value = rows
                    .into_iter()
                    .next()
                    .and_then(|row| row.into_iter().next())
                    .unwrap_or_default();
                return Ok(Materialized::Scalar(value));
            }
        }

        let items = T::materialize(self, columns, rows)?;
        debug!(count = items.len(), table = %self.table, "Materialized query results");
        Ok(Materialized::Items(items))
    }

    /// Values of the first returned column, trimmed
    pub fn column_values(&self, rows: Vec<Vec<Value>>) -> Vec<Value> {
        rows.into_iter()
            .filter_map(|row| row.into_iter().next())
            .map(|value| self.trimmed(value))
            .collect()
    }

    pub fn rows(&self, columns: &[String], rows: Vec<Vec<Value>>) -> QueryResult<Vec<Row>> {
        let index = Arc::new(ColumnIndex::new(columns.iter().cloned())?);
        Ok(rows
            .into_iter()
            .map(|row| Row::new(self.cells(row), Arc::clone(&index)))
            .collect())
    }

    pub fn headerless_rows(&self, rows: Vec<Vec<Value>>) -> Vec<HeaderlessRow> {
        rows.into_iter()
            .map(|row| HeaderlessRow::new(self.cells(row)))
            .collect()
    }

    pub fn records<R: Record>(&self, columns: &[String], rows: Vec<Vec<Value>>) -> QueryResult<Vec<R>> {
        let schema = schema_of::<R>()?;
        let mapper = self.args.mapper();

        self.check_strict_mapping::<R>(columns)?;
        self.warn_unmatched_mappings(columns);

        let positions: Vec<Option<usize>> = schema
            .fields()
            .iter()
            .map(|field| {
                let column = mapper.map(field.name());
                columns.iter().position(|c| c == column)
            })
            .collect();

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let mut record = R::default();
            for (field, position) in schema.fields().iter().zip(&positions) {
                if let Some(raw) = position.and_then(|i| row.get(i)) {
                    self.populate(field, &mut record, raw)?;
                }
            }
            records.push(record);
        }
        Ok(records)
    }

    /// One record per row with only `property` set from the first column
    pub fn field_records<R: Record>(&self, property: &str, rows: Vec<Vec<Value>>) -> QueryResult<Vec<R>> {
        let schema = schema_of::<R>()?;
        let field = schema.field(property).ok_or_else(|| {
            QueryError::UnsupportedExpression(format!("'{}' is not a field of {}", property, R::NAME))
        })?;

        rows.into_iter()
            .filter_map(|row| row.into_iter().next())
            .map(|raw| {
                let mut record = R::default();
                self.populate(field, &mut record, &raw)?;
                Ok(record)
            })
            .collect()
    }

    /// Transformation, then the trim policy for text fields, then the cast
    /// into the field
    fn populate<R>(&self, field: &FieldDescriptor<R>, record: &mut R, raw: &Value) -> QueryResult<()> {
        let value = match self.args.mapper().transform(field.name()) {
            Some(transform) => transform(&raw.to_string()),
            None => raw.clone(),
        };
        let value = if field.kind() == FieldKind::Text {
            self.trimmed(convert(value, FieldKind::Text).map_err(|e| e.for_field(field.name()))?)
        } else {
            value
        };
        field.set(record, value)
    }

    fn check_strict_mapping<R: Record>(&self, columns: &[String]) -> QueryResult<()> {
        let mode = self.args.options().strict_mapping;
        let schema = schema_of::<R>()?;
        let mapper = self.args.mapper();

        if mode.checks_fields() {
            for field in schema.fields() {
                if !columns.iter().any(|c| c == field.name()) && !mapper.is_mapped(field.name()) {
                    return Err(QueryError::StrictMappingViolation(format!(
                        "'{}' property is not mapped to a column",
                        field.name()
                    )));
                }
            }
        }

        if mode.checks_columns() {
            for column in columns {
                if schema.field(column).is_none() && !mapper.is_column_mapped(column) {
                    return Err(QueryError::StrictMappingViolation(format!(
                        "'{}' column is not mapped to a property",
                        column
                    )));
                }
            }
        }
        Ok(())
    }

    fn warn_unmatched_mappings(&self, columns: &[String]) {
        for (property, column) in self.args.mapper().mappings() {
            if !columns.iter().any(|c| c == column) {
                warn!(
                    "'{}' column that is mapped to the '{}' property does not exist in the '{}' worksheet",
                    column,
                    property,
                    self.table.display_name()
                );
            }
        }
    }

    fn cells(&self, row: Vec<Value>) -> Vec<Cell> {
        row.into_iter().map(|value| Cell::new(self.trimmed(value))).collect()
    }

    fn trimmed(&self, value: Value) -> Value {
        match value {
            Value::Text(text) => {
                let trim = self.args.options().trim_spaces;
                Value::Text(trim.apply(&text).to_string())
            }
            other => other,
        }
    }
}
