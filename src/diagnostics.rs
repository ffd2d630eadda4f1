//! Error handling for the construction core.
//!
//! All user-facing misuse surfaces as a single `IrError`, in the style of
//! `seen_ir::error::CodeGenError`: one `thiserror` variant per failure
//! mode, each carrying exactly the data needed to render a one-line
//! diagnostic, plus the [`Location`] of the construction call that failed.

use thiserror::Error;

use crate::location::Location;
use crate::types::TypeId;

/// Errors raised by the Construction API (C4) and friends.
///
/// `TypeMismatch` and `UnsupportedOperation` are ordinary, recoverable
/// misuse by a caller (fail fast, no partial construction). `InvariantViolation`
/// is never recoverable: it means the core itself, or a caller bypassing the
/// builder API, has broken an invariant that later stages depend on.
/// `NotInitialized` is raised by the SSA builder when a variable has no
/// definition reaching a block from the entry.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IrError {
    #[error("{location}: type mismatch: expected {expected:?}, found {found:?}")]
    TypeMismatch {
        expected: TypeId,
        found: TypeId,
        location: Location,
    },

    #[error("{location}: unsupported operation: {operation}")]
    UnsupportedOperation { operation: String, location: Location },

    #[error("{location}: invariant violation: {message}")]
    InvariantViolation { message: String, location: Location },

    #[error("{location}: variable '{variable}' has no definition reaching this block")]
    NotInitialized { variable: String, location: Location },
}

impl IrError {
    pub fn type_mismatch(expected: TypeId, found: TypeId, location: Location) -> Self {
        Self::TypeMismatch { expected, found, location }
    }

    pub fn unsupported(operation: impl Into<String>, location: Location) -> Self {
        Self::UnsupportedOperation { operation: operation.into(), location }
    }

    /// Raises an `InvariantViolation`. Also trips a `debug_assert!` so
    /// that test and debug builds fail loudly at the point of violation
    /// rather than only at the point the caller happens to inspect the
    /// `Result` (per §7: internal invariants are enforced by assertions in
    /// debug builds, and by structural preconditions in release builds).
    pub fn invariant(message: impl Into<String>, location: Location) -> Self {
        let message = message.into();
        debug_assert!(false, "IR invariant violated: {message}");
        Self::InvariantViolation { message, location }
    }

    pub fn not_initialized(variable: impl Into<String>, location: Location) -> Self {
        Self::NotInitialized { variable: variable.into(), location }
    }

    pub fn location(&self) -> &Location {
        match self {
            Self::TypeMismatch { location, .. }
            | Self::UnsupportedOperation { location, .. }
            | Self::InvariantViolation { location, .. }
            | Self::NotInitialized { location, .. } => location,
        }
    }
}

pub type IrResult<T> = Result<T, IrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_operation_renders_message() {
        let err = IrError::unsupported("bitwise and on float", Location::new("a.cu:1"));
        assert!(err.to_string().contains("bitwise and on float"));
        assert_eq!(err.location().as_str(), "a.cu:1");
    }

    #[test]
    fn not_initialized_names_variable() {
        let err = IrError::not_initialized("x", Location::unknown());
        assert!(err.to_string().contains("'x'"));
    }
}
