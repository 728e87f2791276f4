//! Error types for configuration loading

use std::path::PathBuf;
use thiserror::Error;

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading the configuration file failed
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// File that could not be read
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The configuration text is not valid TOML for the expected shape
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration parsed but holds values that cannot be used
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
