//! CPAL-based audio context for desktop platforms (Linux, macOS, Windows)
//!
//! The `cpal::Stream` is not `Send` on every platform, so it is created,
//! played, and dropped on a dedicated thread. The context only keeps the
//! voice connector, the shared frame clock, and a shutdown channel.

use std::sync::atomic::AtomicU64;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rtrb::RingBuffer;

use super::clock::FrameClock;
use super::context::{AudioContext, VoiceConnector};
use super::mixer::{Mixer, VOICE_CONNECT_CAPACITY};
use super::voice::ClickVoice;
use crate::config::AudioConfig;
use crate::error::{log_metronome_error, MetronomeError};

/// Default output device driven by a cpal stream
pub struct CpalContext {
    clock: FrameClock,
    connector: VoiceConnector,
    shutdown: Mutex<Option<mpsc::Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CpalContext {
    /// Open and start the default output device
    ///
    /// Blocks until the stream thread reports that playback started or failed.
    pub fn open_default(config: &AudioConfig) -> Result<Self, MetronomeError> {
        let frames = Arc::new(AtomicU64::new(0));
        let (voice_tx, voice_rx) = RingBuffer::<ClickVoice>::new(VOICE_CONNECT_CAPACITY);
        let (ready_tx, ready_rx) = mpsc::channel::<Result<u32, MetronomeError>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let thread_frames = Arc::clone(&frames);
        let max_render_frames = config.max_render_frames;

        let worker = std::thread::Builder::new()
            .name("metronome-output".to_string())
            .spawn(move || {
                let (stream, sample_rate) =
                    match build_output_stream(thread_frames, voice_rx, max_render_frames) {
                        Ok(opened) => opened,
                        Err(err) => {
                            let _ = ready_tx.send(Err(err));
                            return;
                        }
                    };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(MetronomeError::HardwareError {
                        details: format!("Output start failed: {}", e),
                    }));
                    return;
                }

                let _ = ready_tx.send(Ok(sample_rate));
                // Park until the context is dropped
                let _ = shutdown_rx.recv();
                drop(stream);
                log::info!("[CpalContext] Output stream closed");
            })?;

        let sample_rate = ready_rx
            .recv()
            .map_err(|_| MetronomeError::StreamFailure {
                reason: "output thread exited before reporting status".to_string(),
            })
            .and_then(|status| status)
            .map_err(|err| {
                log_metronome_error(&err, "open_default");
                err
            })?;

        log::info!(
            "[CpalContext] Output stream running at {} Hz",
            sample_rate
        );

        Ok(Self {
            clock: FrameClock::with_counter(frames, sample_rate),
            connector: VoiceConnector::new(voice_tx),
            shutdown: Mutex::new(Some(shutdown_tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }
}

impl AudioContext for CpalContext {
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

impl Drop for CpalContext {
    fn drop(&mut self) {
        if let Ok(mut shutdown) = self.shutdown.lock() {
            shutdown.take();
        }
        if let Ok(mut worker) = self.worker.lock() {
            if let Some(handle) = worker.take() {
                let _ = handle.join();
            }
        }
    }
}

fn build_output_stream(
    frames: Arc<AtomicU64>,
    voice_rx: rtrb::Consumer<ClickVoice>,
    max_render_frames: usize,
) -> Result<(cpal::Stream, u32), MetronomeError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| MetronomeError::StreamOpenFailed {
            reason: "No default output device found".to_string(),
        })?;

    let config = device
        .default_output_config()
        .map_err(|e| MetronomeError::StreamOpenFailed {
            reason: format!("Failed to get default output config: {:?}", e),
        })?;

    let stream_config: cpal::StreamConfig = config.clone().into();
    let channels_count = stream_config.channels as usize;
    let sample_rate = stream_config.sample_rate.0;

    let clock = FrameClock::with_counter(frames, sample_rate);
    let mut mixer = Mixer::from_consumer(clock, voice_rx, max_render_frames);

    let err_fn = |err| log::error!("[CpalContext] Output stream error: {}", err);

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => device.build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                mixer.render_interleaved(data, channels_count);
            },
            err_fn,
            None,
        ),
        other => {
            return Err(MetronomeError::StreamOpenFailed {
                reason: format!(
                    "Only F32 sample format is currently supported for output (device uses {:?})",
                    other
                ),
            })
        }
    }
    .map_err(|e| MetronomeError::StreamOpenFailed {
        reason: format!("{:?}", e),
    })?;

    Ok((stream, sample_rate))
}
