//! Exit code constants for the muster CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid state)
//! - 2: Validation failure (malformed input to a core operation)
//! - 3: Ledger operation failure
//! - 4: Session manager failure

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, invalid state, or missing workspace.
pub const USER_ERROR: i32 = 1;

/// Validation failure: malformed input rejected by a core operation.
pub const VALIDATION_FAILURE: i32 = 2;

/// Ledger operation failure: the external store command failed or
/// returned unparseable output.
pub const LEDGER_FAILURE: i32 = 3;

/// Session manager failure: a tmux operation could not be completed.
pub const SESSION_FAILURE: i32 = 4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            SUCCESS,
            USER_ERROR,
            VALIDATION_FAILURE,
            LEDGER_FAILURE,
            SESSION_FAILURE,
        ];
        for (i, &a) in codes.iter().enumerate() {
            for (j, &b) in codes.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "Exit codes must be distinct");
                }
            }
        }
    }

    #[test]
    fn exit_codes_are_stable() {
        assert_eq!(SUCCESS, 0);
        assert_eq!(USER_ERROR, 1);
        assert_eq!(VALIDATION_FAILURE, 2);
        assert_eq!(LEDGER_FAILURE, 3);
        assert_eq!(SESSION_FAILURE, 4);
    }
}
