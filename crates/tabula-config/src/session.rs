//! Session configuration loading

use crate::error::{ConfigError, ConfigResult};
use crate::options::QueryOptions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Everything a query session needs before it talks to a driver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Source file the session reads from
    pub file_name: Option<PathBuf>,
    /// Query options
    pub options: QueryOptions,
    /// Property name to column name mappings
    pub mappings: BTreeMap<String, String>,
}

impl SessionConfig {
    /// Create a configuration for `file_name` with default options
    pub fn new(file_name: impl Into<PathBuf>) -> Self {
        Self {
            file_name: Some(file_name.into()),
            ..Self::default()
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading session config");

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Reject mappings with empty property or column names
    pub fn validate(&self) -> ConfigResult<()> {
        for (property, column) in &self.mappings {
            if property.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "mapping to column '{}' has an empty property name",
                    column
                )));
            }
            if column.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "property '{}' is mapped to an empty column name",
                    property
                )));
            }
        }

        if let Some(file_name) = &self.file_name {
            if file_name.as_os_str().is_empty() {
                return Err(ConfigError::Invalid("file_name is empty".to_string()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{StrictMapping, TrimSpaces};

    #[test]
    fn test_defaults_from_empty_document() {
        let config = SessionConfig::from_toml_str("").unwrap();
        assert_eq!(config, SessionConfig::default());
        assert!(config.file_name.is_none());
    }

    #[test]
    fn test_full_document() {
        let config = SessionConfig::from_toml_str(
            r#"
            file_name = "data/companies.csv"

            [options]
            strict_mapping = "worksheet_strict"
            trim_spaces = "both"
            persistent_connection = true
            read_only = true

            [mappings]
            Name = "Company Title"
            CEO = "Boss"
            "#,
        )
        .unwrap();

        assert_eq!(config.file_name, Some(PathBuf::from("data/companies.csv")));
        assert_eq!(config.options.strict_mapping, StrictMapping::WorksheetStrict);
        assert_eq!(config.options.trim_spaces, TrimSpaces::Both);
        assert!(config.options.persistent_connection);
        assert!(config.options.read_only);
        assert_eq!(config.mappings.get("CEO").map(String::as_str), Some("Boss"));
    }

    #[test]
    fn test_empty_column_rejected() {
        let err = SessionConfig::from_toml_str(
            r#"
            [mappings]
            Name = " "
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_unknown_strict_mode_rejected() {
        let err = SessionConfig::from_toml_str(
            r#"
            [options]
            strict_mapping = "sometimes"
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
