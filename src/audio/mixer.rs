//! Mixer - audio-thread owner of all connected click voices
//!
//! Real-time safety:
//! - New voices arrive over a lock-free SPSC queue
//! - Rendering uses a scratch buffer allocated once at construction
//! - No locks; the only shared state is the atomic frame clock

use rtrb::{Consumer, Producer, RingBuffer};

use super::clock::FrameClock;
use super::voice::ClickVoice;

/// Maximum number of voices that may be waiting to be picked up
pub const VOICE_CONNECT_CAPACITY: usize = 8;

/// Renders connected voices and advances the audio clock
pub struct Mixer {
    voices: Vec<ClickVoice>,
    incoming: Consumer<ClickVoice>,
    clock: FrameClock,
    scratch: Vec<f32>,
}

impl Mixer {
    /// Create a mixer plus the producer used to connect voices to it
    pub fn new(clock: FrameClock, max_render_frames: usize) -> (Producer<ClickVoice>, Self) {
        let (producer, incoming) = RingBuffer::new(VOICE_CONNECT_CAPACITY);
        (producer, Self::from_consumer(clock, incoming, max_render_frames))
    }

    /// Build a mixer around an existing voice queue
    pub fn from_consumer(
        clock: FrameClock,
        incoming: Consumer<ClickVoice>,
        max_render_frames: usize,
    ) -> Self {
        Self {
            voices: Vec::with_capacity(VOICE_CONNECT_CAPACITY),
            incoming,
            clock,
            scratch: vec![0.0; max_render_frames.max(1)],
        }
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    /// Number of voices currently rendered
    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Fill an interleaved output buffer and advance the clock by its frames
    pub fn render_interleaved(&mut self, data: &mut [f32], channels: usize) {
        let channels = channels.max(1);

        while let Ok(voice) = self.incoming.pop() {
            self.voices.push(voice);
        }
        self.voices.retain(ClickVoice::is_connected);

        let sample_rate = self.clock.sample_rate();
        for block in data.chunks_mut(self.scratch.len() * channels) {
            let frames = block.len() / channels;
            let mono = &mut self.scratch[..frames];
            mono.fill(0.0);

            let start_frame = self.clock.frames();
            for voice in self.voices.iter_mut() {
                voice.render_add(mono, start_frame, sample_rate);
            }

            for (frame, &value) in block.chunks_mut(channels).zip(mono.iter()) {
                frame.fill(value);
            }

            self.clock.advance(frames as u64);
        }
    }
}
