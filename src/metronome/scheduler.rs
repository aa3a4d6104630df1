//! Look-ahead click scheduler
//!
//! A coarse timer cannot trigger clicks precisely, so it is only used to top
//! up the voice with clicks timestamped on the audio clock. Each pass covers
//! the next look-ahead window; the voice then fires them sample-accurately.
//!
//! Per pass:
//! 1. `I = 60000 / bpm`
//! 2. `offset = (now - origin) mod I`, the phase within the current beat
//! 3. `count = floor(W / I) + 1`
//! 4. if `W + offset >= I`, schedule `now - offset + (i + 1) * I` for `i < count`
//!
//! `origin` is the audio-clock time at which `start` ran, so beats fall on
//! `origin + k * I` and a restart always begins a fresh phase. A tempo change
//! moves `origin` to the last click already submitted; nothing submitted is
//! ever withdrawn.

use serde::{Deserialize, Serialize};

use crate::audio::context::AudioContext;
use crate::audio::voice::{click_voice, ClickSchedule, VoiceHandle};
use crate::config::{AppConfig, ClickConfig};
use crate::error::MetronomeError;

use super::tempo::Tempo;

/// Look-ahead window used when no configuration is supplied
pub const DEFAULT_LOOKAHEAD_MS: f64 = 1024.0;

/// Largest accepted look-ahead window
pub const MAX_LOOKAHEAD_MS: f64 = 10_000.0;

/// Clicks closer than this to an already submitted one are the same click
const SAME_CLICK_EPSILON_MS: f64 = 1e-6;

/// Result of planning one look-ahead pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickPlan {
    pub now_ms: f64,
    pub interval_ms: f64,
    pub offset_ms: f64,
    pub clicks: Vec<ClickSchedule>,
}

/// Number of clicks one pass plans, `floor(W / I) + 1`
#[inline]
pub fn clicks_per_pass(interval_ms: f64, window_ms: f64) -> usize {
    (window_ms / interval_ms).floor() as usize + 1
}

/// Plan the clicks for one pass of the look-ahead window.
///
/// Pure function: no clock reads, no side effects. Callers bound
/// `clicks_per_pass(interval_ms, window_ms)`.
pub fn plan_clicks(now_ms: f64, origin_ms: f64, interval_ms: f64, window_ms: f64) -> ClickPlan {
    let offset_ms = (now_ms - origin_ms).rem_euclid(interval_ms);
    let count = clicks_per_pass(interval_ms, window_ms);

    let clicks = if window_ms + offset_ms >= interval_ms {
        (0..count)
            .map(|i| ClickSchedule::at(now_ms - offset_ms + (i as f64 + 1.0) * interval_ms))
            .collect()
    } else {
        Vec::new()
    };

    ClickPlan {
        now_ms,
        interval_ms,
        offset_ms,
        clicks,
    }
}

/// What a pass actually did
#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    pub plan: ClickPlan,
    /// Clicks newly submitted to the voice (planned minus already submitted)
    pub scheduled: Vec<ClickSchedule>,
    /// Set when this pass switched the beat grid to a new tempo
    pub tempo_applied: Option<Tempo>,
}

/// Mutable engine state.
///
/// Invariant: `voice.is_some()` iff playing iff `tempo.is_some()`.
#[derive(Default)]
pub struct MetronomeState {
    /// Tempo requested by the caller; picked up at the next pass
    tempo: Option<Tempo>,
    /// Tempo the current beat grid was laid out with
    grid_tempo: Option<Tempo>,
    origin_ms: f64,
    last_scheduled_ms: f64,
    /// Duration of one frame of the connected context
    frame_ms: f64,
    voice: Option<VoiceHandle>,
}

/// Stopped/Playing state machine around the look-ahead algorithm
pub struct LookaheadScheduler {
    window_ms: f64,
    click: ClickConfig,
    queue_capacity: usize,
    state: MetronomeState,
}

impl LookaheadScheduler {
    pub fn new(config: &AppConfig) -> Self {
        let requested = config.metronome.lookahead_ms;
        let window_ms = if requested.is_finite() && requested > 0.0 && requested <= MAX_LOOKAHEAD_MS
        {
            requested
        } else {
            log::warn!(
                "[Metronome] Look-ahead {}ms outside (0, {}]ms, using {}ms",
                requested,
                MAX_LOOKAHEAD_MS,
                DEFAULT_LOOKAHEAD_MS
            );
            DEFAULT_LOOKAHEAD_MS
        };

        Self {
            window_ms,
            click: config.click.clone(),
            queue_capacity: config.audio.voice_queue_capacity,
            state: MetronomeState::default(),
        }
    }

    pub fn window_ms(&self) -> f64 {
        self.window_ms
    }

    pub fn is_playing(&self) -> bool {
        self.state.voice.is_some()
    }

    /// Requested tempo (may not be applied to the grid yet)
    pub fn tempo(&self) -> Option<Tempo> {
        self.state.tempo
    }

    /// Audio-clock time the current beat grid is anchored to
    pub fn origin_ms(&self) -> Option<f64> {
        self.is_playing().then_some(self.state.origin_ms)
    }

    /// Most clicks one pass may submit; the start click takes one queue slot
    pub fn max_clicks_per_pass(&self) -> usize {
        self.queue_capacity.saturating_sub(1).max(1)
    }

    /// Reject tempos the voice cannot keep up with
    fn check_tempo(&self, tempo: Tempo, frame_ms: f64) -> Result<(), MetronomeError> {
        let interval_ms = tempo.interval_ms();
        if interval_ms < frame_ms
            || clicks_per_pass(interval_ms, self.window_ms) > self.max_clicks_per_pass()
        {
            log::warn!(
                "[Metronome] Tempo {} BPM too fast for a {}ms window",
                tempo.bpm(),
                self.window_ms
            );
            return Err(MetronomeError::TempoInvalid { bpm: tempo.bpm() });
        }
        Ok(())
    }

    /// Connect a fresh voice, click immediately, and run the first pass.
    ///
    /// Returns `Ok(None)` without touching anything when already playing.
    pub fn start(
        &mut self,
        ctx: &dyn AudioContext,
        tempo: Tempo,
    ) -> Result<Option<PassReport>, MetronomeError> {
        if self.is_playing() {
            log::debug!("[Metronome] start ignored, already playing");
            return Ok(None);
        }

        let frame_ms = 1000.0 / f64::from(ctx.sample_rate().max(1));
        self.check_tempo(tempo, frame_ms)?;

        let (voice, mut handle) = click_voice(&self.click, self.queue_capacity);
        ctx.connect(voice)?;

        let now_ms = ctx.current_time_ms();
        handle.schedule(ClickSchedule::at(now_ms))?;

        self.state = MetronomeState {
            tempo: Some(tempo),
            grid_tempo: Some(tempo),
            origin_ms: now_ms,
            last_scheduled_ms: now_ms,
            frame_ms,
            voice: Some(handle),
        };

        match self.run_pass(now_ms) {
            Ok(report) => Ok(Some(report)),
            Err(err) => {
                self.stop();
                Err(err)
            }
        }
    }

    /// Store a new tempo for the next pass. No-op (returns false) when stopped.
    pub fn update_tempo(&mut self, tempo: Tempo) -> Result<bool, MetronomeError> {
        if !self.is_playing() {
            return Ok(false);
        }
        self.check_tempo(tempo, self.state.frame_ms)?;
        self.state.tempo = Some(tempo);
        Ok(true)
    }

    /// Disconnect the voice. No-op (returns false) when already stopped.
    pub fn stop(&mut self) -> bool {
        match self.state.voice.take() {
            Some(voice) => {
                voice.disconnect();
                self.state = MetronomeState::default();
                true
            }
            None => false,
        }
    }

    /// Run one look-ahead pass at audio-clock time `now_ms`
    pub fn run_pass(&mut self, now_ms: f64) -> Result<PassReport, MetronomeError> {
        let tempo = self.state.tempo.ok_or(MetronomeError::TempoUnset)?;
        let state = &mut self.state;
        let voice = state.voice.as_mut().ok_or(MetronomeError::NotPlaying)?;

        let mut tempo_applied = None;
        if state.grid_tempo != Some(tempo) {
            // The new grid continues from the last submitted click
            state.origin_ms = state.last_scheduled_ms;
            tempo_applied = Some(tempo);
        }
        state.grid_tempo = Some(tempo);

        let plan = plan_clicks(now_ms, state.origin_ms, tempo.interval_ms(), self.window_ms);

        let mut scheduled = Vec::with_capacity(plan.clicks.len());
        for click in &plan.clicks {
            if click.at_ms > state.last_scheduled_ms + SAME_CLICK_EPSILON_MS {
                voice.schedule(*click)?;
                state.last_scheduled_ms = click.at_ms;
                scheduled.push(*click);
            }
        }

        Ok(PassReport {
            plan,
            scheduled,
            tempo_applied,
        })
    }
}

#[cfg(test)]
mod tests;
