//! # Tabula Configuration
//!
//! Session-level options for tabula queries: strict mapping, whitespace
//! trimming, connection reuse and read-only access, plus the property to
//! column mappings a session starts with.
//!
//! ## Quick Start
//!
//! ```rust
//! use tabula_config::{SessionConfig, StrictMapping};
//!
//! let config = SessionConfig::from_toml_str(r#"
//!     file_name = "companies.xls"
//!
//!     [options]
//!     strict_mapping = "class_strict"
//!
//!     [mappings]
//!     Name = "Company Title"
//! "#).unwrap();
//!
//! assert_eq!(config.options.strict_mapping, StrictMapping::ClassStrict);
//! ```

#![warn(missing_docs)]

mod error;
mod options;
mod session;

pub use error::{ConfigError, ConfigResult};
pub use options::{QueryOptions, StrictMapping, TrimSpaces};
pub use session::SessionConfig;
