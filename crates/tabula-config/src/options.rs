//! Per-query options

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of a typed query must be fully mapped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrictMapping {
    /// No validation
    #[default]
    None,
    /// Every declared field needs a column
    ClassStrict,
    /// Every returned column needs a field
    WorksheetStrict,
    /// Both of the above
    Both,
}

impl StrictMapping {
    /// True when declared fields are validated
    pub fn checks_fields(self) -> bool {
        matches!(self, Self::ClassStrict | Self::Both)
    }

    /// True when returned columns are validated
    pub fn checks_columns(self) -> bool {
        matches!(self, Self::WorksheetStrict | Self::Both)
    }
}

/// Whitespace trimming applied to textual values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrimSpaces {
    /// Leave text untouched
    #[default]
    None,
    /// Trim leading whitespace
    Start,
    /// Trim trailing whitespace
    End,
    /// Trim both ends
    Both,
}

impl TrimSpaces {
    /// Apply the policy to `text`
    pub fn apply<'a>(self, text: &'a str) -> &'a str {
        match self {
            Self::None => text,
            Self::Start => text.trim_start(),
            Self::End => text.trim_end(),
            Self::Both => text.trim(),
        }
    }
}

/// Options threaded through every query created by a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    /// Strict mapping validation mode
    pub strict_mapping: StrictMapping,
    /// Trim policy for textual values
    pub trim_spaces: TrimSpaces,
    /// Keep one connection open across queries of the same session
    pub persistent_connection: bool,
    /// Open the source read-only
    pub read_only: bool,
}

impl QueryOptions {
    /// Set the strict mapping mode
    pub fn with_strict_mapping(mut self, mode: StrictMapping) -> Self {
        self.strict_mapping = mode;
        self
    }

    /// Set the trim policy
    pub fn with_trim_spaces(mut self, trim: TrimSpaces) -> Self {
        self.trim_spaces = trim;
        self
    }

    /// Enable or disable connection reuse
    pub fn with_persistent_connection(mut self, enabled: bool) -> Self {
        self.persistent_connection = enabled;
        self
    }

    /// Enable or disable read-only access
    pub fn with_read_only(mut self, enabled: bool) -> Self {
        self.read_only = enabled;
        self
    }
}

impl fmt::Display for QueryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StrictMapping: {:?}, UsePersistentConnection: {}, TrimSpaces: {:?}, ReadOnly: {}",
            self.strict_mapping, self.persistent_connection, self.trim_spaces, self.read_only
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(TrimSpaces::None, "  a b  " ; "none")]
    #[test_case(TrimSpaces::Start, "a b  " ; "start")]
    #[test_case(TrimSpaces::End, "  a b" ; "end")]
    #[test_case(TrimSpaces::Both, "a b" ; "both")]
    fn test_trim_policy(trim: TrimSpaces, expected: &str) {
        assert_eq!(trim.apply("  a b  "), expected);
    }

    #[test]
    fn test_strict_mapping_sides() {
        assert!(!StrictMapping::None.checks_fields());
        assert!(!StrictMapping::None.checks_columns());
        assert!(StrictMapping::ClassStrict.checks_fields());
        assert!(!StrictMapping::ClassStrict.checks_columns());
        assert!(StrictMapping::WorksheetStrict.checks_columns());
        assert!(StrictMapping::Both.checks_fields() && StrictMapping::Both.checks_columns());
    }

    #[test]
    fn test_builder_setters() {
        let options = QueryOptions::default()
            .with_strict_mapping(StrictMapping::Both)
            .with_trim_spaces(TrimSpaces::End)
            .with_persistent_connection(true)
            .with_read_only(true);

        assert_eq!(options.strict_mapping, StrictMapping::Both);
        assert_eq!(options.trim_spaces, TrimSpaces::End);
        assert!(options.persistent_connection);
        assert!(options.read_only);
    }
}
