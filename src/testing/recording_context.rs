//! `AudioContext` driven by the tokio clock that records what it is asked to play.

use std::sync::{Mutex, MutexGuard};

use tokio::time::Instant;

use crate::audio::context::AudioContext;
use crate::audio::voice::ClickVoice;
use crate::error::MetronomeError;

/// Records connected voices instead of rendering them.
///
/// The audio clock is tokio's clock measured from construction, so with
/// paused time every pass lands exactly on a multiple of the window.
pub struct RecordingContext {
    epoch: Instant,
    sample_rate: u32,
    voices: Mutex<Vec<ClickVoice>>,
}

impl RecordingContext {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            epoch: Instant::now(),
            sample_rate,
            voices: Mutex::new(Vec::new()),
        }
    }

    fn lock_voices(&self) -> MutexGuard<'_, Vec<ClickVoice>> {
        // A panicking test already failed; keep reading what was recorded
        self.voices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Effective click times per voice, in connection order.
    ///
    /// Commands are applied with the same replace rule the voice uses on
    /// the render path.
    pub fn timelines(&self) -> Vec<Vec<f64>> {
        let mut voices = self.lock_voices();
        voices
            .iter_mut()
            .map(|voice| {
                voice.apply_commands();
                voice.pending_clicks().collect()
            })
            .collect()
    }

    /// All effective click times across voices, ascending
    pub fn timeline(&self) -> Vec<f64> {
        let mut clicks: Vec<f64> = self.timelines().into_iter().flatten().collect();
        clicks.sort_by(f64::total_cmp);
        clicks
    }

    pub fn voice_count(&self) -> usize {
        self.lock_voices().len()
    }

    /// Whether each recorded voice is still held by a scheduler
    pub fn voices_connected(&self) -> Vec<bool> {
        self.lock_voices()
            .iter()
            .map(ClickVoice::is_connected)
            .collect()
    }
}

impl AudioContext for RecordingContext {
    fn current_time_ms(&self) -> f64 {
        self.epoch.elapsed().as_nanos() as f64 / 1e6
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn connect(&self, voice: ClickVoice) -> Result<(), MetronomeError> {
        self.lock_voices().push(voice);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::voice::{click_voice, ClickSchedule};
    use crate::config::ClickConfig;

    #[tokio::test(start_paused = true)]
    async fn test_clock_follows_tokio_time() {
        let ctx = RecordingContext::new(48000);
        assert_eq!(ctx.current_time_ms(), 0.0);
        tokio::time::advance(std::time::Duration::from_millis(1024)).await;
        assert_eq!(ctx.current_time_ms(), 1024.0);
    }

    #[test]
    fn test_records_effective_timeline() {
        let ctx = RecordingContext::new(48000);
        let (voice, mut handle) = click_voice(&ClickConfig::default(), 16);
        ctx.connect(voice).unwrap();

        for at in [0.0, 500.0, 1000.0, 1500.0] {
            handle.schedule(ClickSchedule::at(at)).unwrap();
        }
        handle.schedule(ClickSchedule::at(1200.0)).unwrap();

        // 1200 replaces the later 1500
        assert_eq!(ctx.timeline(), vec![0.0, 500.0, 1000.0, 1200.0]);
        assert_eq!(ctx.voices_connected(), vec![true]);

        drop(handle);
        assert_eq!(ctx.voices_connected(), vec![false]);
        assert_eq!(ctx.voice_count(), 1);
    }
}
