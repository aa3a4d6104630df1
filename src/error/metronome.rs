// Metronome error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Metronome error code constants
///
/// Error code range: 2001-2008
pub struct MetronomeErrorCodes {}

impl MetronomeErrorCodes {
    /// Tempo is not a positive, finite BPM value
    pub const TEMPO_INVALID: i32 = 2001;

    /// A scheduling pass ran while no tempo was established
    pub const TEMPO_UNSET: i32 = 2002;

    /// Operation requires a playing metronome
    pub const NOT_PLAYING: i32 = 2003;

    /// Failed to open the audio output stream
    pub const STREAM_OPEN_FAILED: i32 = 2004;

    /// Hardware error occurred
    pub const HARDWARE_ERROR: i32 = 2005;

    /// Mutex was poisoned
    pub const LOCK_POISONED: i32 = 2006;

    /// The voice command queue (or voice connection queue) is full
    pub const VOICE_QUEUE_FULL: i32 = 2007;

    /// Audio stream thread or channel went away unexpectedly
    pub const STREAM_FAILURE: i32 = 2008;
}

/// Log a metronome error with structured context
///
/// Fields logged:
/// - code: Numeric error code for programmatic handling
/// - context: The operation in which the error surfaced
/// - message: Human-readable error message
pub fn log_metronome_error(err: &MetronomeError, context: &str) {
    error!(
        "Metronome error in {}: code={}, component=Metronome, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Metronome-related errors
///
/// Covers tempo validation, scheduler invariants, and output stream access.
#[derive(Debug, Clone, PartialEq)]
pub enum MetronomeError {
    /// BPM value is invalid (must be finite and > 0)
    TempoInvalid { bpm: f64 },

    /// Scheduling pass invoked without an established tempo.
    ///
    /// Only reachable when the start/stop state machine is bypassed.
    TempoUnset,

    /// Metronome is not playing
    NotPlaying,

    /// Failed to open audio stream
    StreamOpenFailed { reason: String },

    /// Hardware error occurred
    HardwareError { details: String },

    /// Mutex was poisoned
    LockPoisoned { component: String },

    /// A lock-free queue towards the audio thread had no free slot
    VoiceQueueFull { queue: String },

    /// Audio thread or channel disconnected unexpectedly
    StreamFailure { reason: String },
}

impl ErrorCode for MetronomeError {
    fn code(&self) -> i32 {
        match self {
            MetronomeError::TempoInvalid { .. } => MetronomeErrorCodes::TEMPO_INVALID,
            MetronomeError::TempoUnset => MetronomeErrorCodes::TEMPO_UNSET,
            MetronomeError::NotPlaying => MetronomeErrorCodes::NOT_PLAYING,
            MetronomeError::StreamOpenFailed { .. } => MetronomeErrorCodes::STREAM_OPEN_FAILED,
            MetronomeError::HardwareError { .. } => MetronomeErrorCodes::HARDWARE_ERROR,
            MetronomeError::LockPoisoned { .. } => MetronomeErrorCodes::LOCK_POISONED,
            MetronomeError::VoiceQueueFull { .. } => MetronomeErrorCodes::VOICE_QUEUE_FULL,
            MetronomeError::StreamFailure { .. } => MetronomeErrorCodes::STREAM_FAILURE,
        }
    }

    fn message(&self) -> String {
        match self {
            MetronomeError::TempoInvalid { bpm } => {
                format!("Tempo must be a finite BPM greater than 0 (got {})", bpm)
            }
            MetronomeError::TempoUnset => {
                "Scheduling pass ran with no tempo set. start() must precede scheduling."
                    .to_string()
            }
            MetronomeError::NotPlaying => {
                "Metronome not playing. Call start() first.".to_string()
            }
            MetronomeError::StreamOpenFailed { reason } => {
                format!("Failed to open audio stream: {}", reason)
            }
            MetronomeError::HardwareError { details } => {
                format!("Hardware error: {}", details)
            }
            MetronomeError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
            MetronomeError::VoiceQueueFull { queue } => {
                format!("Queue '{}' is full, audio thread is not draining", queue)
            }
            MetronomeError::StreamFailure { reason } => {
                format!("Audio stream failed: {}", reason)
            }
        }
    }
}

impl fmt::Display for MetronomeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MetronomeError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for MetronomeError {}

impl From<std::io::Error> for MetronomeError {
    fn from(err: std::io::Error) -> Self {
        MetronomeError::HardwareError {
            details: err.to_string(),
        }
    }
}
