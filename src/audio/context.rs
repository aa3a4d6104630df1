//! Audio contexts: an output sink plus the audio clock that drives it.
//!
//! The metronome never reaches for a global audio device on its own; it is
//! handed an `Arc<dyn AudioContext>`. `shared_output()` provides the
//! process-wide desktop output for callers that want a single lazily opened
//! device.

use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;
use rtrb::Producer;

use super::clock::FrameClock;
use super::context_cpal::CpalContext;
use super::mixer::Mixer;
use super::voice::ClickVoice;
use crate::config::AudioConfig;
use crate::error::{log_metronome_error, MetronomeError};

/// Output sink with a sample-accurate clock
pub trait AudioContext: Send + Sync {
    /// Current audio-clock time in milliseconds (monotonic)
    fn current_time_ms(&self) -> f64;

    fn sample_rate(&self) -> u32;

    /// Hand a voice to the render path; it plays until its handle is dropped
    fn connect(&self, voice: ClickVoice) -> Result<(), MetronomeError>;
}

/// Scheduler-side end of the mixer's voice queue
pub(crate) struct VoiceConnector {
    producer: Mutex<Producer<ClickVoice>>,
}

impl VoiceConnector {
    pub(crate) fn new(producer: Producer<ClickVoice>) -> Self {
        Self {
            producer: Mutex::new(producer),
        }
    }

    pub(crate) fn connect(&self, voice: ClickVoice) -> Result<(), MetronomeError> {
        let mut producer = self.producer.lock().map_err(|_| {
            let err = MetronomeError::LockPoisoned {
                component: "voice_connector".to_string(),
            };
            log_metronome_error(&err, "connect");
            err
        })?;
        producer
            .push(voice)
            .map_err(|_| MetronomeError::VoiceQueueFull {
                queue: "voice_connect".to_string(),
            })
    }
}

/// Deterministic context that renders only when asked
///
/// The clock advances exclusively through `render`, which makes it suitable
/// for tests and for exporting audio faster than real time.
pub struct OfflineContext {
    clock: FrameClock,
    connector: VoiceConnector,
    mixer: Mutex<Mixer>,
}

impl OfflineContext {
    pub fn new(sample_rate: u32) -> Self {
        Self::with_config(sample_rate, &AudioConfig::default())
    }

    pub fn with_config(sample_rate: u32, config: &AudioConfig) -> Self {
        let clock = FrameClock::new(sample_rate);
        let (producer, mixer) = Mixer::new(clock.clone(), config.max_render_frames);
        Self {
            clock,
            connector: VoiceConnector::new(producer),
            mixer: Mutex::new(mixer),
        }
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    /// Render `frames` mono samples and advance the clock
    pub fn render(&self, frames: usize) -> Result<Vec<f32>, MetronomeError> {
        let mut mixer = self
            .mixer
            .lock()
            .map_err(|_| MetronomeError::LockPoisoned {
                component: "offline_mixer".to_string(),
            })?;
        let mut out = vec![0.0; frames];
        mixer.render_interleaved(&mut out, 1);
        Ok(out)
    }

    /// Render up to the frame at `now + duration_ms`
    pub fn render_ms(&self, duration_ms: f64) -> Result<Vec<f32>, MetronomeError> {
        let start = self.clock.frames();
        let end = self.clock.ms_to_frame(self.clock.now_ms() + duration_ms);
        self.render(end.saturating_sub(start) as usize)
    }
}

impl AudioContext for OfflineContext {
    fn current_time_ms(&self) -> f64 {
        self.clock.now_ms()
    }

    fn sample_rate(&self) -> u32 {
        self.clock.sample_rate()
    }

    fn connect(&self, voice: ClickVoice) -> Result<(), MetronomeError> {
        self.connector.connect(voice)
    }
}

static SHARED_OUTPUT: OnceCell<Arc<CpalContext>> = OnceCell::new();

/// Process-wide default output, opened on first use and reused afterwards
pub fn shared_output() -> Result<Arc<CpalContext>, MetronomeError> {
    SHARED_OUTPUT
        .get_or_try_init(|| {
            CpalContext::open_default(&AudioConfig::default()).map(Arc::new)
        })
        .cloned()
}
