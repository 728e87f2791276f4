use crate::error::QueryResult;
use crate::value::{FieldValue, Value};
use serde::Serialize;
use std::fmt;

/// A cell and its value in a result row
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Cell {
    value: Value,
}

impl Cell {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    /// Convert the value to `T`. Null cells give `T`'s zero value.
    pub fn cast<T: FieldValue>(&self) -> QueryResult<T> {
        T::from_value(self.value.clone())
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

impl From<Value> for Cell {
    fn from(value: Value) -> Self {
        Self { value }
    }
}

impl From<Cell> for String {
    fn from(cell: Cell) -> Self {
        cell.to_string()
    }
}
