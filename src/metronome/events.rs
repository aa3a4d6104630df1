//! Events published by a running metronome.

use serde::{Deserialize, Serialize};

/// Lifecycle and tick notifications.
///
/// `ClickScheduled` is emitted when a click is submitted to the voice, ahead
/// of the moment it sounds; `at_ms` is on the audio clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetronomeEvent {
    Started { bpm: f64, origin_ms: f64 },
    Stopped,
    TempoChanged { bpm: f64 },
    ClickScheduled { at_ms: f64 },
    PassCompleted { now_ms: f64, scheduled: usize },
}
