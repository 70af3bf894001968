//! Assertions on client outcomes.

use std::fmt::Debug;

use crate::core::{ErrorKind, Outcome};

/// Asserts that the outcome is a success and returns the value.
#[track_caller]
pub fn assert_success<T: Debug>(outcome: Outcome<T>) -> T {
    match outcome {
        Ok(value) => value,
        Err(failure) => panic!("Expected success, got failure: {failure}"),
    }
}

/// Asserts that the outcome failed with `kind`.
#[track_caller]
pub fn assert_failure_kind<T: Debug>(outcome: &Outcome<T>, kind: ErrorKind) {
    match outcome {
        Ok(value) => panic!("Expected {kind} failure, got success: {value:?}"),
        Err(failure) => assert_eq!(
            failure.kind(),
            kind,
            "Expected {kind} failure, got: {failure}"
        ),
    }
}

/// Asserts that the outcome was rejected by an open circuit.
#[track_caller]
pub fn assert_circuit_open<T: Debug>(outcome: &Outcome<T>) {
    match outcome {
        Ok(value) => panic!("Expected circuit-open rejection, got success: {value:?}"),
        Err(failure) => assert!(
            failure.is_circuit_open(),
            "Expected circuit-open rejection, got: {failure}"
        ),
    }
}

/// Asserts that the outcome is the cancellation failure.
#[track_caller]
pub fn assert_cancelled<T: Debug>(outcome: &Outcome<T>) {
    match outcome {
        Ok(value) => panic!("Expected cancellation, got success: {value:?}"),
        Err(failure) => assert!(failure.is_cancelled(), "Expected cancellation, got: {failure}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Failure;

    #[test]
    fn test_assertions_accept_matching_outcomes() {
        assert_eq!(assert_success::<u8>(Ok(3)), 3);
        assert_failure_kind::<()>(&Err(Failure::new(ErrorKind::Conflict, "stale")), ErrorKind::Conflict);
        assert_circuit_open::<()>(&Err(Failure::circuit_open("github:x")));
        assert_cancelled::<()>(&Err(Failure::cancelled()));
    }

    #[test]
    #[should_panic(expected = "Expected success")]
    fn test_assert_success_panics_on_failure() {
        assert_success::<()>(Err(Failure::new(ErrorKind::NotFound, "gone")));
    }
}
