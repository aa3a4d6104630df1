//! Click voice - the metronome's audio-generation unit
//!
//! A `ClickVoice` is a continuously running sine oscillator whose output is
//! gated by a short gain envelope (silence -> peak -> silence) at each
//! scheduled click time. It lives on the audio thread; the scheduler talks to
//! it through the matching `VoiceHandle` over a lock-free SPSC queue.
//!
//! Dropping the `VoiceHandle` disconnects the voice: the mixer removes it
//! before rendering the next buffer, so nothing it still had queued is heard.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};
use serde::{Deserialize, Serialize};

use crate::config::ClickConfig;
use crate::error::MetronomeError;

/// "A click must sound at absolute audio-clock time `at_ms`."
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClickSchedule {
    pub at_ms: f64,
}

impl ClickSchedule {
    pub fn at(at_ms: f64) -> Self {
        Self { at_ms }
    }
}

/// Commands sent from the scheduler to the audio thread
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VoiceCommand {
    /// Cancel pending clicks at or after the given time, then schedule it
    Click(ClickSchedule),
}

/// Linear attack/release gain ramp applied to the oscillator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickEnvelope {
    pub attack_ms: f64,
    pub release_ms: f64,
    pub peak_gain: f32,
}

impl ClickEnvelope {
    pub fn from_config(config: &ClickConfig) -> Self {
        Self {
            attack_ms: config.attack_ms.max(0.0),
            release_ms: config.release_ms.max(0.0),
            peak_gain: config.peak_gain,
        }
    }

    pub fn duration_ms(&self) -> f64 {
        self.attack_ms + self.release_ms
    }

    /// Gain `elapsed_ms` after the click time
    pub fn gain_at(&self, elapsed_ms: f64) -> f32 {
        if elapsed_ms < 0.0 || elapsed_ms >= self.duration_ms() {
            return 0.0;
        }
        if elapsed_ms < self.attack_ms {
            return self.peak_gain * (elapsed_ms / self.attack_ms) as f32;
        }
        let into_release = elapsed_ms - self.attack_ms;
        self.peak_gain * (1.0 - into_release / self.release_ms) as f32
    }
}

impl Default for ClickEnvelope {
    fn default() -> Self {
        Self::from_config(&ClickConfig::default())
    }
}

/// Create a connected voice/handle pair
///
/// `queue_capacity` bounds how many commands may be in flight before the
/// audio thread drains them.
pub fn click_voice(config: &ClickConfig, queue_capacity: usize) -> (ClickVoice, VoiceHandle) {
    let capacity = queue_capacity.max(1);
    let (producer, consumer) = RingBuffer::new(capacity);
    let released = Arc::new(AtomicBool::new(false));

    let voice = ClickVoice {
        commands: consumer,
        released: Arc::clone(&released),
        pending: VecDeque::with_capacity(capacity),
        active_since_ms: None,
        envelope: ClickEnvelope::from_config(config),
        frequency_hz: config.frequency_hz,
        phase: 0.0,
    };
    let handle = VoiceHandle {
        commands: producer,
        released,
    };
    (voice, handle)
}

/// Audio-thread side: oscillator + gain envelope
pub struct ClickVoice {
    commands: Consumer<VoiceCommand>,
    released: Arc<AtomicBool>,
    /// Pending click times in ms, ascending
    pending: VecDeque<f64>,
    active_since_ms: Option<f64>,
    envelope: ClickEnvelope,
    frequency_hz: f64,
    /// Oscillator phase in cycles, [0, 1)
    phase: f64,
}

impl ClickVoice {
    pub fn is_connected(&self) -> bool {
        !self.released.load(Ordering::Acquire)
    }

    /// Drain the command queue into the pending click list
    pub fn apply_commands(&mut self) {
        while let Ok(command) = self.commands.pop() {
            match command {
                VoiceCommand::Click(click) => {
                    // Scheduling at T replaces anything at or after T
                    while self
                        .pending
                        .back()
                        .is_some_and(|&queued| queued >= click.at_ms)
                    {
                        self.pending.pop_back();
                    }
                    self.pending.push_back(click.at_ms);
                }
            }
        }
    }

    /// Click times that have not started sounding yet
    pub fn pending_clicks(&self) -> impl Iterator<Item = f64> + '_ {
        self.pending.iter().copied()
    }

    /// Mix this voice into `out` (mono), whose first sample is `start_frame`
    pub fn render_add(&mut self, out: &mut [f32], start_frame: u64, sample_rate: u32) {
        self.apply_commands();

        let rate = sample_rate as f64;
        let phase_step = self.frequency_hz / rate;

        for (i, sample) in out.iter_mut().enumerate() {
            let now_ms = (start_frame + i as u64) as f64 * 1000.0 / rate;

            while let Some(&next) = self.pending.front() {
                if next > now_ms {
                    break;
                }
                self.active_since_ms = Some(next);
                self.pending.pop_front();
            }

            let gain = match self.active_since_ms {
                Some(since) => {
                    let elapsed = now_ms - since;
                    if elapsed >= self.envelope.duration_ms() {
                        self.active_since_ms = None;
                    }
                    self.envelope.gain_at(elapsed)
                }
                None => 0.0,
            };

            if gain != 0.0 {
                *sample += (self.phase * std::f64::consts::TAU).sin() as f32 * gain;
            }

            self.phase += phase_step;
            if self.phase >= 1.0 {
                self.phase -= 1.0;
            }
        }
    }
}

/// Scheduler side of a click voice
///
/// Owning the handle keeps the voice connected; dropping it disconnects.
pub struct VoiceHandle {
    commands: Producer<VoiceCommand>,
    released: Arc<AtomicBool>,
}

impl VoiceHandle {
    pub fn schedule(&mut self, click: ClickSchedule) -> Result<(), MetronomeError> {
        self.send(VoiceCommand::Click(click))
    }

    pub fn is_connected(&self) -> bool {
        !self.released.load(Ordering::Acquire)
    }

    /// Disconnect the voice from the output
    pub fn disconnect(self) {
        drop(self);
    }

    fn send(&mut self, command: VoiceCommand) -> Result<(), MetronomeError> {
        self.commands
            .push(command)
            .map_err(|_| MetronomeError::VoiceQueueFull {
                queue: "voice_commands".to_string(),
            })
    }
}

impl Drop for VoiceHandle {
    fn drop(&mut self) {
        self.released.store(true, Ordering::Release);
    }
}
