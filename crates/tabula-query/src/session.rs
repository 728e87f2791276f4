//! Query sessions.
//!
//! A [`QuerySession`] binds a source file to a [`Driver`], holds the
//! session-wide column mappings, transformations and options, and creates
//! query roots. With a persistent connection it keeps one connection open
//! across queries until [`QuerySession::close`] or drop.

use crate::args::{QueryArgs, ResolvedTable, TableIdentity, WorksheetRef};
use crate::catalog;
use crate::driver::{Connection, ConnectionSpec, Driver};
use crate::error::{QueryError, QueryResult};
use crate::mapping::ColumnMapper;
use crate::materialize::QueryItem;
use crate::model::ItemShape;
use crate::query::Query;
use crate::value::Value;
use parking_lot::Mutex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabula_config::{QueryOptions, SessionConfig, StrictMapping, TrimSpaces};
use tracing::{debug, error, info};

struct Retained {
    spec: ConnectionSpec,
    connection: Box<dyn Connection>,
}

pub struct QuerySession {
    file_name: Option<PathBuf>,
    driver: Arc<dyn Driver>,
    mapper: ColumnMapper,
    options: QueryOptions,
    retained: Mutex<Option<Retained>>,
}

impl QuerySession {
    pub fn new(file_name: impl Into<PathBuf>, driver: Arc<dyn Driver>) -> Self {
        let mut session = Self::unbound(driver);
        session.file_name = Some(file_name.into());
        session
    }

    /// Session without a source file. Queries fail until
    /// [`QuerySession::set_file_name`] is called.
    pub fn unbound(driver: Arc<dyn Driver>) -> Self {
        Self {
            file_name: None,
            driver,
            mapper: ColumnMapper::new(),
            options: QueryOptions::default(),
            retained: Mutex::new(None),
        }
    }

    /// Session from a loaded configuration file
    pub fn from_config(config: &SessionConfig, driver: Arc<dyn Driver>) -> QueryResult<Self> {
        let mut session = Self::unbound(driver);
        session.file_name = config.file_name.clone();
        session.options = config.options;
        for (property, column) in &config.mappings {
            session.add_mapping(property.as_str(), column.as_str())?;
        }
        info!(
            driver = session.driver.name(),
            mappings = config.mappings.len(),
            "Created query session from config"
        );
        Ok(session)
    }

    pub fn file_name(&self) -> Option<&Path> {
        self.file_name.as_deref()
    }

    pub fn set_file_name(&mut self, file_name: impl Into<PathBuf>) {
        self.close();
        self.file_name = Some(file_name.into());
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn set_strict_mapping(&mut self, mode: StrictMapping) {
        self.options.strict_mapping = mode;
    }

    pub fn set_trim_spaces(&mut self, trim: TrimSpaces) {
        self.options.trim_spaces = trim;
    }

    /// Switching the policy off releases a retained connection
    pub fn set_persistent_connection(&mut self, enabled: bool) {
        self.options.persistent_connection = enabled;
        if !enabled {
            self.close();
        }
    }

    pub fn set_read_only(&mut self, enabled: bool) {
        self.options.read_only = enabled;
    }

    /// Read `property` from `column`
    pub fn add_mapping(&mut self, property: impl Into<String>, column: impl Into<String>) -> QueryResult<()> {
        self.mapper.register(property, column)
    }

    /// Read `property` from `column` through `transform`
    pub fn add_mapping_with_transform<F>(
        &mut self,
        property: impl Into<String>,
        column: impl Into<String>,
        transform: F,
    ) -> QueryResult<()>
    where
        F: Fn(&str) -> Value + Send + Sync + 'static,
    {
        let property = property.into();
        self.mapper.register(property.clone(), column)?;
        self.mapper.register_transform(property, transform)
    }

    /// Convert the text of `property`'s column with `transform`
    pub fn add_transformation<F>(&mut self, property: impl Into<String>, transform: F) -> QueryResult<()>
    where
        F: Fn(&str) -> Value + Send + Sync + 'static,
    {
        self.mapper.register_transform(property, transform)
    }

    pub fn mapper(&self) -> &ColumnMapper {
        &self.mapper
    }

    // ========================================================================
    // Query roots
    // ========================================================================

    /// Rows of the default worksheet, `Sheet1`
    pub fn default_worksheet<T: QueryItem>(&self) -> QueryResult<Query<'_, T>> {
        self.query(TableIdentity::Worksheet(None))
    }

    pub fn worksheet<T: QueryItem>(&self, name: impl Into<String>) -> QueryResult<Query<'_, T>> {
        self.query(TableIdentity::Worksheet(Some(WorksheetRef::Name(name.into()))))
    }

    /// Rows of the worksheet at zero-based `index`
    pub fn worksheet_at<T: QueryItem>(&self, index: usize) -> QueryResult<Query<'_, T>> {
        self.query(TableIdentity::Worksheet(Some(WorksheetRef::Index(index))))
    }

    /// Cells `start`..=`end` of the default worksheet, e.g. `B3` to `E8`
    pub fn worksheet_range<T: QueryItem>(
        &self,
        start: impl Into<String>,
        end: impl Into<String>,
    ) -> QueryResult<Query<'_, T>> {
        self.query(TableIdentity::Range {
            worksheet: None,
            start: start.into(),
            end: end.into(),
        })
    }

    /// Cells `start`..=`end` of a worksheet given by name or index
    pub fn worksheet_range_in<T: QueryItem>(
        &self,
        worksheet: impl Into<WorksheetRef>,
        start: impl Into<String>,
        end: impl Into<String>,
    ) -> QueryResult<Query<'_, T>> {
        self.query(TableIdentity::Range {
            worksheet: Some(worksheet.into()),
            start: start.into(),
            end: end.into(),
        })
    }

    /// Rows of a workbook-scoped named range
    pub fn named_range<T: QueryItem>(&self, name: impl Into<String>) -> QueryResult<Query<'_, T>> {
        self.query(TableIdentity::NamedRange {
            worksheet: None,
            name: name.into(),
        })
    }

    /// Rows of a named range scoped to a worksheet
    pub fn named_range_in<T: QueryItem>(
        &self,
        worksheet: impl Into<WorksheetRef>,
        name: impl Into<String>,
    ) -> QueryResult<Query<'_, T>> {
        self.query(TableIdentity::NamedRange {
            worksheet: Some(worksheet.into()),
            name: name.into(),
        })
    }

    fn query<T: QueryItem>(&self, table: TableIdentity) -> QueryResult<Query<'_, T>> {
        let file_name = self.require_file_name()?;
        let mut mapper = self.mapper.clone();
        mapper.merge_hints(T::column_hints()?);

        let has_header = T::shape() != ItemShape::Headerless;
        let args = QueryArgs::new(file_name, table, has_header, Arc::new(mapper), self.options)?;
        debug!(args = %args, "Created query");
        Ok(Query::new(self, args))
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Worksheet names of the source, without `$` markers or quoting
    pub fn worksheet_names(&self) -> QueryResult<Vec<String>> {
        let spec = self.catalog_spec()?;
        self.with_connection(&spec, |connection| Ok(catalog::list_worksheets(connection)?))
    }

    /// Column names of `worksheet`
    pub fn column_names(&self, worksheet: impl Into<String>) -> QueryResult<Vec<String>> {
        let table = ResolvedTable {
            worksheet: Some(worksheet.into()),
            named_range: None,
            range: None,
        };
        self.columns_of(table)
    }

    /// Column names of a named range, scoped to `worksheet` when given
    pub fn column_names_in_range(
        &self,
        worksheet: Option<&str>,
        named_range: impl Into<String>,
    ) -> QueryResult<Vec<String>> {
        let table = ResolvedTable {
            worksheet: worksheet.map(str::to_string),
            named_range: Some(named_range.into()),
            range: None,
        };
        self.columns_of(table)
    }

    /// Workbook-scoped named ranges
    pub fn named_ranges(&self) -> QueryResult<Vec<String>> {
        let spec = self.catalog_spec()?;
        self.with_connection(&spec, |connection| Ok(catalog::list_named_ranges(connection, None)?))
    }

    /// Named ranges scoped to `worksheet`
    pub fn named_ranges_in(&self, worksheet: &str) -> QueryResult<Vec<String>> {
        let spec = self.catalog_spec()?;
        self.with_connection(&spec, |connection| {
            Ok(catalog::list_named_ranges(connection, Some(worksheet))?)
        })
    }

    fn columns_of(&self, table: ResolvedTable) -> QueryResult<Vec<String>> {
        let spec = self.catalog_spec()?;
        self.with_connection(&spec, |connection| Ok(catalog::column_names(connection, &table)?))
    }

    fn catalog_spec(&self) -> QueryResult<ConnectionSpec> {
        Ok(ConnectionSpec {
            path: self.require_file_name()?,
            has_header: true,
            read_only: self.options.read_only,
        })
    }

    fn require_file_name(&self) -> QueryResult<PathBuf> {
        self.file_name
            .clone()
            .ok_or_else(|| QueryError::Configuration("file name is not set".to_string()))
    }

    // ========================================================================
    // Connections
    // ========================================================================

    /// Run `f` on a connection for `spec`.
    ///
    /// Without a persistent connection a fresh one is opened and released
    /// before returning, whatever `f` returns. With one, the retained
    /// connection is reused while `spec` stays the same.
    pub(crate) fn with_connection<F, R>(&self, spec: &ConnectionSpec, f: F) -> QueryResult<R>
    where
        F: FnOnce(&mut dyn Connection) -> QueryResult<R>,
    {
        if !self.options.persistent_connection {
            let mut connection = self.driver.open(spec)?;
            let result = f(connection.as_mut());
            release(connection);
            return result;
        }

        let mut retained = self.retained.lock();
        if let Some(current) = retained.as_mut() {
            if current.spec == *spec {
                return f(current.connection.as_mut());
            }
        }

        if let Some(stale) = retained.take() {
            debug!(path = %stale.spec.path.display(), "Replacing retained connection");
            release(stale.connection);
        }
        let mut connection = self.driver.open(spec)?;
        debug!(driver = self.driver.name(), path = %spec.path.display(), "Retaining connection");
        let result = f(connection.as_mut());
        *retained = Some(Retained {
            spec: spec.clone(),
            connection,
        });
        result
    }

    pub(crate) fn scalar_column(&self) -> &str {
        self.driver.scalar_column()
    }

    /// Release the retained connection, if any. Failures are logged.
    pub fn close(&self) {
        if let Some(retained) = self.retained.lock().take() {
            debug!(path = %retained.spec.path.display(), "Releasing retained connection");
            release(retained.connection);
        }
    }
}

fn release(connection: Box<dyn Connection>) {
    if let Err(err) = connection.close() {
        error!(error = %err, "Failed to release connection");
    }
}

impl Drop for QuerySession {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for QuerySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySession")
            .field("file_name", &self.file_name)
            .field("driver", &self.driver.name())
            .field("mapper", &self.mapper)
            .field("options", &self.options)
            .field("retained", &self.retained.lock().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Row;
    use crate::memory::MemoryDriver;

    fn driver() -> MemoryDriver {
        MemoryDriver::new()
            .with_sheet("Sheet1", &["Name"], vec![vec!["ACME".into()]])
            .with_sheet("Data Sheet", &["Name"], Vec::new())
            .with_named_range(None, "Firms", "A1", "A2")
            .with_named_range(Some("Data Sheet"), "Archive", "A1", "A1")
    }

    #[test]
    fn test_requires_file_name() {
        let session = QuerySession::unbound(Arc::new(driver()));
        let err = session.worksheet_names().unwrap_err();
        assert!(matches!(err, QueryError::Configuration(ref m) if m == "file name is not set"));
        assert!(session.default_worksheet::<Row>().is_err());
    }

    #[test]
    fn test_introspection() {
        let session = QuerySession::new("companies.xls", Arc::new(driver()));
        assert_eq!(session.worksheet_names().unwrap(), vec!["Sheet1", "Data Sheet"]);
        assert_eq!(session.named_ranges().unwrap(), vec!["Firms"]);
        assert_eq!(session.named_ranges_in("Data Sheet").unwrap(), vec!["Archive"]);
        assert_eq!(session.column_names("Sheet1").unwrap(), vec!["Name"]);
        assert_eq!(session.column_names_in_range(None, "Firms").unwrap(), vec!["Name"]);
    }

    #[test]
    fn test_connections_released_without_persistence() {
        let driver = driver();
        let session = QuerySession::new("companies.xls", Arc::new(driver.clone()));
        session.worksheet_names().unwrap();
        session.worksheet_names().unwrap();

        assert_eq!(driver.opened_connections(), 2);
        assert_eq!(driver.live_connections(), 0);
    }

    #[test]
    fn test_connection_released_on_error() {
        let driver = driver();
        let session = QuerySession::new("companies.xls", Arc::new(driver.clone()));
        assert!(session.column_names("Missing").is_err());
        assert_eq!(driver.live_connections(), 0);
    }

    #[test]
    fn test_persistent_connection_is_reused_until_close() {
        let driver = driver();
        let mut session = QuerySession::new("companies.xls", Arc::new(driver.clone()));
        session.set_persistent_connection(true);
        session.worksheet_names().unwrap();
        session.named_ranges().unwrap();

        assert_eq!(driver.opened_connections(), 1);
        assert_eq!(driver.live_connections(), 1);

        session.close();
        assert_eq!(driver.live_connections(), 0);
    }

    #[test]
    fn test_drop_releases_persistent_connection() {
        let driver = driver();
        {
            let mut session = QuerySession::new("companies.xls", Arc::new(driver.clone()));
            session.set_persistent_connection(true);
            session.worksheet_names().unwrap();
            assert_eq!(driver.live_connections(), 1);
        }
        assert_eq!(driver.live_connections(), 0);
    }

    #[test]
    fn test_from_config() {
        let config = SessionConfig::from_toml_str(
            r#"
            file_name = "companies.xls"

            [options]
            strict_mapping = "class_strict"
            trim_spaces = "both"

            [mappings]
            CEO = "Boss"
            "#,
        )
        .unwrap();

        let session = QuerySession::from_config(&config, Arc::new(driver())).unwrap();
        assert_eq!(session.file_name(), Some(Path::new("companies.xls")));
        assert_eq!(session.options().strict_mapping, StrictMapping::ClassStrict);
        assert_eq!(session.options().trim_spaces, TrimSpaces::Both);
        assert_eq!(session.mapper().map("CEO"), "Boss");
    }

    #[test]
    fn test_mapping_with_transform() {
        let mut session = QuerySession::new("companies.xls", Arc::new(driver()));
        session
            .add_mapping_with_transform("IsActive", "Active", |s| Value::Bool(s == "Y"))
            .unwrap();
        assert_eq!(session.mapper().map("IsActive"), "Active");
        assert!(session.mapper().transform("IsActive").is_some());
        assert!(session.add_transformation("IsActive", |_| Value::Null).is_err());
    }
}
