//! Tempo value type.

use serde::{Deserialize, Serialize};

use crate::config::TempoRange;
use crate::error::MetronomeError;

/// Beats per minute; always finite and strictly positive
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Tempo(f64);

impl Tempo {
    pub fn new(bpm: f64) -> Result<Self, MetronomeError> {
        if bpm.is_finite() && bpm > 0.0 {
            Ok(Self(bpm))
        } else {
            Err(MetronomeError::TempoInvalid { bpm })
        }
    }

    /// Clamp into `range` first, the way the tempo slider does
    pub fn within(bpm: f64, range: &TempoRange) -> Result<Self, MetronomeError> {
        if bpm.is_nan() {
            return Err(MetronomeError::TempoInvalid { bpm });
        }
        Self::new(range.clamp(bpm))
    }

    pub fn bpm(self) -> f64 {
        self.0
    }

    /// Beat interval `60000 / bpm` in milliseconds
    #[inline]
    pub fn interval_ms(self) -> f64 {
        60_000.0 / self.0
    }
}

impl TryFrom<f64> for Tempo {
    type Error = MetronomeError;

    fn try_from(bpm: f64) -> Result<Self, Self::Error> {
        Self::new(bpm)
    }
}

impl From<Tempo> for f64 {
    fn from(tempo: Tempo) -> Self {
        tempo.0
    }
}
