//! Single sink for errors the sync core absorbs instead of propagating.
//!
//! Sync is retried on the next trigger, so public entry points never fail;
//! every swallowed error still ends up here as a structured event.

use std::fmt::Display;

/// Record an absorbed error for `operation`.
pub fn absorb(operation: &'static str, error: &impl Display) {
    tracing::warn!(target: "petsync::absorbed", operation, error = %error, "sync error absorbed");
}

/// Absorb the error side of `result`, keeping the value when there is one.
pub fn absorb_result<T, E: Display>(operation: &'static str, result: Result<T, E>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(error) => {
            absorb(operation, &error);
            None
        }
    }
}
