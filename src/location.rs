//! Source locations attached to every IR value for diagnostics.

use std::fmt;
use serde::{Deserialize, Serialize};

/// An opaque, front-end-supplied source location.
///
/// The construction core never interprets a location beyond carrying it
/// through folds and rewrites (invariant 6: a folded value keeps the
/// location of the expression it replaces). Front ends are expected to
/// format something human-meaningful (`file:line:col`, a bytecode offset,
/// whatever the reader has on hand) before handing it in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location(String);

impl Location {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Used when a value is synthesized by the construction core itself
    /// (e.g. a peephole rewrite's intermediate node) rather than supplied
    /// directly by a caller.
    pub fn unknown() -> Self {
        Self("<unknown>".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::unknown()
    }
}

impl From<&str> for Location {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Location {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_location_is_default() {
        assert_eq!(Location::default(), Location::unknown());
        assert_eq!(Location::unknown().as_str(), "<unknown>");
    }

    #[test]
    fn carries_caller_tag() {
        let loc = Location::new("kernel.cu:42");
        assert_eq!(loc.as_str(), "kernel.cu:42");
        assert_eq!(loc.to_string(), "kernel.cu:42");
    }
}
