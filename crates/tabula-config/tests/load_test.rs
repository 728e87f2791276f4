//! Loading session configs from disk

use std::io::Write;
use tabula_config::{ConfigError, SessionConfig, TrimSpaces};
use tempfile::NamedTempFile;

#[test]
fn test_load_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
file_name = "companies.xls"

[options]
trim_spaces = "start"
"#
    )
    .unwrap();

    let config = SessionConfig::load(file.path()).unwrap();
    assert_eq!(config.options.trim_spaces, TrimSpaces::Start);
    assert!(config.mappings.is_empty());
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = SessionConfig::load(dir.path().join("missing.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}
