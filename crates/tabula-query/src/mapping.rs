//! Property to column name mappings and per-property value transformations.

use crate::error::{QueryError, QueryResult};
use crate::value::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Converts a column's raw text into a field's logical value
pub type Transformation = Arc<dyn Fn(&str) -> Value + Send + Sync>;

/// Property name to column name lookup.
///
/// Unmapped properties resolve to their own name. Mappings overwrite on
/// re-registration of the same property; transformations are write-once.
#[derive(Clone, Default)]
pub struct ColumnMapper {
    columns: BTreeMap<String, String>,
    transforms: HashMap<String, Transformation>,
}

impl ColumnMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Column name for `property`
    pub fn map<'a>(&'a self, property: &'a str) -> &'a str {
        self.columns
            .get(property)
            .map(String::as_str)
            .unwrap_or(property)
    }

    /// Map `property` to `column`, replacing any earlier mapping of `property`.
    ///
    /// A column can be the explicit target of one property only.
    pub fn register(
        &mut self,
        property: impl Into<String>,
        column: impl Into<String>,
    ) -> QueryResult<()> {
        let property = property.into();
        let column = column.into();

        if let Some(owner) = self.property_for(&column) {
            if owner != property {
                return Err(QueryError::Configuration(format!(
                    "column '{}' is already mapped to the '{}' property",
                    column, owner
                )));
            }
        }

        debug!(%property, %column, "Registered column mapping");
        self.columns.insert(property, column);
        Ok(())
    }

    /// Attach a transformation to `property`. Fails if one already exists.
    pub fn register_transform<F>(&mut self, property: impl Into<String>, transform: F) -> QueryResult<()>
    where
        F: Fn(&str) -> Value + Send + Sync + 'static,
    {
        let property = property.into();
        if self.transforms.contains_key(&property) {
            return Err(QueryError::Configuration(format!(
                "a transformation for the '{}' property is already registered",
                property
            )));
        }
        self.transforms.insert(property, Arc::new(transform));
        Ok(())
    }

    /// Merge declared column hints. Existing mappings win, and a hint naming
    /// a column some other property already owns is skipped.
    pub fn merge_hints<'a, I>(&mut self, hints: I)
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (property, column) in hints {
            if self.columns.contains_key(property) {
                continue;
            }
            if let Some(owner) = self.property_for(column) {
                debug!(%property, %column, %owner, "Skipping column hint, column already mapped");
                continue;
            }
            self.columns.insert(property.to_string(), column.to_string());
        }
    }

    pub fn transform(&self, property: &str) -> Option<&Transformation> {
        self.transforms.get(property)
    }

    /// True when `property` has an explicit mapping
    pub fn is_mapped(&self, property: &str) -> bool {
        self.columns.contains_key(property)
    }

    /// True when some property is explicitly mapped to `column`
    pub fn is_column_mapped(&self, column: &str) -> bool {
        self.property_for(column).is_some()
    }

    fn property_for(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(_, c)| c.as_str() == column)
            .map(|(p, _)| p.as_str())
    }

    /// Explicit mappings as (property, column) pairs, ordered by property
    pub fn mappings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns.iter().map(|(p, c)| (p.as_str(), c.as_str()))
    }

    pub fn transformed_properties(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.transforms.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for ColumnMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnMapper")
            .field("columns", &self.columns)
            .field("transforms", &self.transformed_properties())
            .finish()
    }
}

impl fmt::Display for ColumnMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (property, column) in self.mappings() {
            write!(f, "[{} = '{}'] ", property, column)?;
        }
        Ok(())
    }
}
