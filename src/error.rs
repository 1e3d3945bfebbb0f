//! Error types for the muster CLI.
//!
//! Uses thiserror for derive macros and provides user-actionable error
//! messages. The taxonomy follows the failure semantics of the core:
//!
//! - `Validation`: malformed input to a pure operation (e.g. a negative
//!   resource-usage percentage). Never caught internally, always surfaced.
//! - `NotFound`: a referenced convoy, task, or agent does not exist.
//!   Callers must handle this explicitly; it is never defaulted away.
//! - `Launch`: the session manager reported a failure. Recoverable: the
//!   affected task moves to Blocked or the agent to Dead, and the convoy
//!   continues.
//! - `Ledger`: the external store transport failed. Read failures in
//!   non-critical paths degrade to empty results with a warning; write
//!   failures in critical paths propagate through this variant.
//! - `Parse`: the external store produced output we could not decode.
//! - `User`: bad arguments or an invalid workspace state.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for muster operations.
///
/// Each variant maps to a specific exit code.
#[derive(Error, Debug)]
pub enum MusterError {
    /// User provided invalid arguments or the workspace is in an invalid state.
    #[error("{0}")]
    User(String),

    /// Malformed input to a core operation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced convoy, task, or agent was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What was looked up ("convoy", "task", "agent").
        kind: &'static str,
        /// The identifier that failed to resolve.
        id: String,
    },

    /// The session manager reported a launch or session failure.
    #[error("session operation failed: {0}")]
    Launch(String),

    /// The external ledger command failed.
    #[error("ledger command failed: {0}")]
    Ledger(String),

    /// The external ledger produced output that could not be parsed.
    #[error("failed to parse ledger output: {0}")]
    Parse(String),
}

impl MusterError {
    /// Convenience constructor for `NotFound`.
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        MusterError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            MusterError::User(_) => exit_codes::USER_ERROR,
            MusterError::Validation(_) => exit_codes::VALIDATION_FAILURE,
            MusterError::NotFound { .. } => exit_codes::USER_ERROR,
            MusterError::Launch(_) => exit_codes::SESSION_FAILURE,
            MusterError::Ledger(_) | MusterError::Parse(_) => exit_codes::LEDGER_FAILURE,
        }
    }
}

/// Result type alias for muster operations.
pub type Result<T> = std::result::Result<T, MusterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_error_has_correct_exit_code() {
        let err = MusterError::User("bad argument".to_string());
        assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
    }

    #[test]
    fn validation_error_has_correct_exit_code() {
        let err = MusterError::Validation("resourceUsage must be non-negative".to_string());
        assert_eq!(err.exit_code(), exit_codes::VALIDATION_FAILURE);
    }

    #[test]
    fn not_found_has_correct_exit_code() {
        let err = MusterError::not_found("convoy", "cv-missing");
        assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
        assert_eq!(err.to_string(), "convoy not found: cv-missing");
    }

    #[test]
    fn launch_error_has_correct_exit_code() {
        let err = MusterError::Launch("pane split rejected".to_string());
        assert_eq!(err.exit_code(), exit_codes::SESSION_FAILURE);
    }

    #[test]
    fn ledger_errors_share_exit_code() {
        let cmd = MusterError::Ledger("exit code 1".to_string());
        let parse = MusterError::Parse("unexpected token".to_string());
        assert_eq!(cmd.exit_code(), exit_codes::LEDGER_FAILURE);
        assert_eq!(parse.exit_code(), exit_codes::LEDGER_FAILURE);
    }

    #[test]
    fn error_messages_are_descriptive() {
        let err = MusterError::Validation("threshold must be finite".to_string());
        assert_eq!(err.to_string(), "validation failed: threshold must be finite");
    }
}
