//! Typed record schemas.
//!
//! A [`Record`] describes its fields once through a [`SchemaBuilder`]. The
//! resulting [`Schema`] is validated and cached per type, and materialization
//! is a loop over its field table.

use crate::error::{QueryError, QueryResult};
use crate::value::{FieldKind, FieldValue, Value};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A typed result record.
///
/// ```
/// use tabula_query::{Record, SchemaBuilder};
///
/// #[derive(Debug, Default)]
/// struct Company {
///     name: String,
///     ceo: String,
///     employees: i64,
/// }
///
/// impl Record for Company {
///     const NAME: &'static str = "Company";
///
///     fn describe(schema: &mut SchemaBuilder<Self>) {
///         schema
///             .field("Name", |c| &c.name, |c, v| c.name = v)
///             .column("Company Title");
///         schema.field("CEO", |c| &c.ceo, |c, v| c.ceo = v);
///         schema.field("Employees", |c| &c.employees, |c, v| c.employees = v);
///     }
/// }
/// ```
pub trait Record: Default + Send + 'static {
    /// Name used in diagnostics
    const NAME: &'static str;

    fn describe(schema: &mut SchemaBuilder<Self>);
}

type Getter<R> = Box<dyn Fn(&R) -> Value + Send + Sync>;
type Setter<R> = Box<dyn Fn(&mut R, Value) -> QueryResult<()> + Send + Sync>;

/// One declared field of a record
pub struct FieldDescriptor<R> {
    name: &'static str,
    kind: FieldKind,
    column_hint: Option<&'static str>,
    getter: Getter<R>,
    setter: Setter<R>,
}

impl<R> FieldDescriptor<R> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Column declared on the record type, if any
    pub fn column_hint(&self) -> Option<&'static str> {
        self.column_hint
    }

    pub fn get(&self, record: &R) -> Value {
        (self.getter)(record)
    }

    /// Convert `value` to the field's type and store it. Null stores the
    /// type's zero value.
    pub fn set(&self, record: &mut R, value: Value) -> QueryResult<()> {
        (self.setter)(record, value).map_err(|e| e.for_field(self.name))
    }
}

impl<R> fmt::Debug for FieldDescriptor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("column_hint", &self.column_hint)
            .finish()
    }
}

pub struct SchemaBuilder<R> {
    fields: Vec<FieldDescriptor<R>>,
}

impl<R: 'static> SchemaBuilder<R> {
    fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Declare a field. Its kind follows `T`.
    pub fn field<T>(&mut self, name: &'static str, get: fn(&R) -> &T, set: fn(&mut R, T)) -> &mut Self
    where
        T: FieldValue + 'static,
    {
        self.fields.push(FieldDescriptor {
            name,
            kind: T::KIND,
            column_hint: None,
            getter: Box::new(move |record| get(record).to_value()),
            setter: Box::new(move |record, value| {
                set(record, T::from_value(value)?);
                Ok(())
            }),
        });
        self
    }

    /// Column the most recently declared field reads from
    pub fn column(&mut self, column: &'static str) -> &mut Self {
        if let Some(field) = self.fields.last_mut() {
            field.column_hint = Some(column);
        }
        self
    }
}

/// Validated field table of a record type
#[derive(Debug)]
pub struct Schema<R> {
    record: &'static str,
    fields: Vec<FieldDescriptor<R>>,
}

impl<R: Record> Schema<R> {
    fn build() -> QueryResult<Self> {
        let mut builder = SchemaBuilder::new();
        R::describe(&mut builder);
        let schema = Self {
            record: R::NAME,
            fields: builder.fields,
        };
        schema.validate()?;
        Ok(schema)
    }

    fn validate(&self) -> QueryResult<()> {
        let invalid = |message: String| QueryError::Schema {
            record: self.record,
            message,
        };

        if self.fields.is_empty() {
            return Err(invalid("no fields declared".to_string()));
        }

        let mut names = HashSet::new();
        let mut hints = HashMap::new();
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(invalid("field with an empty name".to_string()));
            }
            if !names.insert(field.name) {
                return Err(invalid(format!("field '{}' is declared twice", field.name)));
            }
            if let Some(column) = field.column_hint {
                if column.is_empty() {
                    return Err(invalid(format!("field '{}' has an empty column", field.name)));
                }
                if let Some(other) = hints.insert(column, field.name) {
                    return Err(invalid(format!(
                        "fields '{}' and '{}' both read column '{}'",
                        other, field.name, column
                    )));
                }
            }
        }
        Ok(())
    }
}

impl<R> Schema<R> {
    pub fn record_name(&self) -> &'static str {
        self.record
    }

    pub fn fields(&self) -> &[FieldDescriptor<R>] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor<R>> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Declared (field, column) hints
    pub fn column_hints(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.fields
            .iter()
            .filter_map(|f| f.column_hint.map(|column| (f.name, column)))
    }

    /// All fields of `record` as a record value
    pub fn to_value(&self, record: &R) -> Value {
        Value::Record(
            self.fields
                .iter()
                .map(|f| (f.name.to_string(), f.get(record)))
                .collect(),
        )
    }
}

type Registry = RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>;

static REGISTRY: Lazy<Registry> = Lazy::new(|| RwLock::new(HashMap::new()));

/// Schema of `R`, built on first use and cached for the process
pub fn schema_of<R: Record>() -> QueryResult<Arc<Schema<R>>> {
    let id = TypeId::of::<R>();
    if let Some(cached) = REGISTRY.read().get(&id).cloned() {
        if let Ok(schema) = cached.downcast::<Schema<R>>() {
            return Ok(schema);
        }
    }

    let schema = Arc::new(Schema::<R>::build()?);
    debug!(record = R::NAME, fields = schema.fields.len(), "Registered record schema");
    REGISTRY.write().insert(id, schema.clone() as Arc<dyn Any + Send + Sync>);
    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[derive(Debug, Default, PartialEq)]
    struct Company {
        name: String,
        ceo: String,
        employees: i64,
        started: Option<NaiveDate>,
    }

    impl Record for Company {
        const NAME: &'static str = "Company";

        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema
                .field("Name", |c| &c.name, |c, v| c.name = v)
                .column("Company Title");
            schema.field("CEO", |c| &c.ceo, |c, v| c.ceo = v).column("Boss");
            schema.field("Employees", |c| &c.employees, |c, v| c.employees = v);
            schema.field("StartDate", |c| &c.started, |c, v| c.started = v);
        }
    }

    #[derive(Debug, Default)]
    struct Twice {
        a: String,
    }

    impl Record for Twice {
        const NAME: &'static str = "Twice";

        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema.field("A", |t| &t.a, |t, v| t.a = v);
            schema.field("A", |t| &t.a, |t, v| t.a = v);
        }
    }

    #[derive(Debug, Default)]
    struct SharedColumn {
        a: String,
        b: String,
    }

    impl Record for SharedColumn {
        const NAME: &'static str = "SharedColumn";

        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema.field("A", |t| &t.a, |t, v| t.a = v).column("X");
            schema.field("B", |t| &t.b, |t, v| t.b = v).column("X");
        }
    }

    #[test]
    fn test_schema_fields_and_hints() {
        let schema = schema_of::<Company>().unwrap();
        assert_eq!(schema.record_name(), "Company");
        assert_eq!(schema.fields().len(), 4);
        assert_eq!(schema.field("Employees").unwrap().kind(), FieldKind::Integer);
        assert_eq!(schema.field("StartDate").unwrap().kind(), FieldKind::DateTime);
        let hints: Vec<_> = schema.column_hints().collect();
        assert_eq!(hints, vec![("Name", "Company Title"), ("CEO", "Boss")]);
    }

    #[test]
    fn test_schema_is_cached() {
        let a = schema_of::<Company>().unwrap();
        let b = schema_of::<Company>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_set_and_get() {
        let schema = schema_of::<Company>().unwrap();
        let mut company = Company::default();
        schema.field("Employees").unwrap().set(&mut company, Value::from("400")).unwrap();
        schema.field("StartDate").unwrap().set(&mut company, Value::from("1988-07-26")).unwrap();
        schema.field("Name").unwrap().set(&mut company, Value::Null).unwrap();

        assert_eq!(company.employees, 400);
        assert_eq!(company.started, NaiveDate::from_ymd_opt(1988, 7, 26));
        assert_eq!(schema.field("Employees").unwrap().get(&company), Value::Int(400));
        assert_eq!(schema.to_value(&company).field("Name"), Some(&Value::from("")));
    }

    #[test]
    fn test_set_reports_field_on_conversion_failure() {
        let schema = schema_of::<Company>().unwrap();
        let mut company = Company::default();
        let err = schema
            .field("Employees")
            .unwrap()
            .set(&mut company, Value::from("many"))
            .unwrap_err();
        assert!(matches!(err, QueryError::Conversion { field: Some(ref f), .. } if f == "Employees"));
    }

    #[test]
    fn test_invalid_schemas() {
        let err = schema_of::<Twice>().unwrap_err();
        assert!(matches!(err, QueryError::Schema { record: "Twice", .. }));

        let err = schema_of::<SharedColumn>().unwrap_err();
        assert!(err.to_string().contains("both read column 'X'"));
    }
}
