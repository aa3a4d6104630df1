//! Test harness utilities.
//!
//! Contexts here never touch an audio device, so metronome behavior can be
//! checked under `#[tokio::test(start_paused = true)]` on any machine.

pub mod recording_context;

pub use recording_context::RecordingContext;
