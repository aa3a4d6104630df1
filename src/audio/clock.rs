//! Audio clock backed by the render path's frame counter.
//!
//! The clock only moves when the audio thread (or an offline render) consumes
//! frames, so anything scheduled against it is sample-accurate regardless of
//! how late the scheduling thread wakes up.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic audio clock shared between the renderer and schedulers.
#[derive(Debug, Clone)]
pub struct FrameClock {
    frames: Arc<AtomicU64>,
    sample_rate: u32,
}

impl FrameClock {
    pub fn new(sample_rate: u32) -> Self {
        Self::with_counter(Arc::new(AtomicU64::new(0)), sample_rate)
    }

    /// Build a clock around an existing frame counter.
    pub fn with_counter(frames: Arc<AtomicU64>, sample_rate: u32) -> Self {
        Self {
            frames,
            sample_rate: sample_rate.max(1),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Total frames rendered so far
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Advance the clock; called from the render path only
    pub fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::AcqRel);
    }

    /// Current audio-clock time in milliseconds
    pub fn now_ms(&self) -> f64 {
        self.frame_to_ms(self.frames())
    }

    #[inline]
    pub fn frame_to_ms(&self, frame: u64) -> f64 {
        frame as f64 * 1000.0 / self.sample_rate as f64
    }

    /// First frame at or after `ms`
    #[inline]
    pub fn ms_to_frame(&self, ms: f64) -> u64 {
        if ms <= 0.0 {
            return 0;
        }
        (ms * self.sample_rate as f64 / 1000.0).ceil() as u64
    }
}
