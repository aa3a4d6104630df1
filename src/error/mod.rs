// Error types for the piano metronome
//
// This module defines the metronome error type, providing structured error
// handling with numeric codes that front-ends can match on.

mod metronome;

pub use metronome::{log_metronome_error, MetronomeError, MetronomeErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the CLI and any embedding UI.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
