//! Metronome - timer-driven look-ahead scheduling
//!
//! Wraps a `LookaheadScheduler` with the recurring re-arm task. The task
//! sleeps for one look-ahead window on a tokio timer, then runs a pass. Timer
//! jitter only changes *when* clicks are submitted, never when they sound.
//!
//! Cancellation: every `start` opens a new session generation. `stop` bumps
//! the generation, aborts the task, and releases the voice, all under the
//! session lock. A pass that already woke up re-checks the generation under
//! the same lock and exits, so no pass can run after `stop` returns.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::Stream;
use once_cell::sync::OnceCell;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::audio::context::AudioContext;
use crate::config::AppConfig;
use crate::error::{log_metronome_error, MetronomeError};

use super::events::MetronomeEvent;
use super::scheduler::{LookaheadScheduler, PassReport};
use super::tempo::Tempo;

const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Runtime used when the metronome is created outside any tokio runtime
static TIMER_RUNTIME: OnceCell<Runtime> = OnceCell::new();

fn timer_runtime() -> Result<&'static Runtime, MetronomeError> {
    TIMER_RUNTIME.get_or_try_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("metronome-timer")
            .enable_time()
            .build()
            .map_err(MetronomeError::from)
    })
}

struct Session {
    scheduler: LookaheadScheduler,
    generation: u64,
    rearm: Option<JoinHandle<()>>,
}

struct Shared {
    context: Arc<dyn AudioContext>,
    session: Mutex<Session>,
    events: broadcast::Sender<MetronomeEvent>,
    window: Duration,
}

impl Shared {
    fn lock_session(&self) -> Result<MutexGuard<'_, Session>, MetronomeError> {
        self.session.lock().map_err(|_| {
            let err = MetronomeError::LockPoisoned {
                component: "metronome_session".to_string(),
            };
            log_metronome_error(&err, "lock_session");
            err
        })
    }

    fn publish(&self, event: MetronomeEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn publish_pass(&self, report: &PassReport) {
        for click in &report.scheduled {
            self.publish(MetronomeEvent::ClickScheduled { at_ms: click.at_ms });
        }
        self.publish(MetronomeEvent::PassCompleted {
            now_ms: report.plan.now_ms,
            scheduled: report.scheduled.len(),
        });
    }

    /// Run one timer-driven pass. `Ok(false)` means the session is gone.
    fn run_pass(&self, generation: u64) -> Result<bool, MetronomeError> {
        let mut session = self.lock_session()?;
        if session.generation != generation {
            return Ok(false);
        }

        let now_ms = self.context.current_time_ms();
        match session.scheduler.run_pass(now_ms) {
            Ok(report) => {
                if let Some(tempo) = report.tempo_applied {
                    log::debug!(
                        "[Metronome] Beat grid switched to {} BPM at {:.3}ms",
                        tempo.bpm(),
                        now_ms
                    );
                }
                self.publish_pass(&report);
                Ok(true)
            }
            Err(err) => {
                // Keep "playing" tied to a live re-arm task
                session.scheduler.stop();
                session.generation += 1;
                session.rearm = None;
                self.publish(MetronomeEvent::Stopped);
                Err(err)
            }
        }
    }
}

async fn rearm_loop(shared: Arc<Shared>, generation: u64) {
    loop {
        tokio::time::sleep(shared.window).await;
        match shared.run_pass(generation) {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => {
                log_metronome_error(&err, "rearm_loop");
                break;
            }
        }
    }
}

/// Audible metronome driven by a look-ahead scheduling loop
///
/// # Example
/// ```ignore
/// let ctx = piano_metronome::audio::shared_output()?;
/// let metronome = Metronome::new(ctx, &AppConfig::load())?;
/// metronome.start(96.0)?;
/// metronome.update_tempo(120.0)?;
/// metronome.stop()?;
/// ```
pub struct Metronome {
    shared: Arc<Shared>,
    runtime: Handle,
}

impl Metronome {
    /// Create a stopped metronome on the current tokio runtime, or on a
    /// process-wide timer runtime when called outside of one.
    pub fn new(context: Arc<dyn AudioContext>, config: &AppConfig) -> Result<Self, MetronomeError> {
        let runtime = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => timer_runtime()?.handle().clone(),
        };
        Ok(Self::with_runtime(context, config, runtime))
    }

    /// Create a stopped metronome whose re-arm task runs on `runtime`
    pub fn with_runtime(context: Arc<dyn AudioContext>, config: &AppConfig, runtime: Handle) -> Self {
        let scheduler = LookaheadScheduler::new(config);
        let window = Duration::from_nanos((scheduler.window_ms() * 1e6).round() as u64);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            shared: Arc::new(Shared {
                context,
                session: Mutex::new(Session {
                    scheduler,
                    generation: 0,
                    rearm: None,
                }),
                events,
                window,
            }),
            runtime,
        }
    }

    /// Start clicking at `bpm`. Does nothing if already playing.
    pub fn start(&self, bpm: f64) -> Result<(), MetronomeError> {
        let tempo = Tempo::new(bpm)?;
        let mut session = self.shared.lock_session()?;

        let report = match session
            .scheduler
            .start(self.shared.context.as_ref(), tempo)
            .map_err(|err| {
                log_metronome_error(&err, "start");
                err
            })? {
            Some(report) => report,
            None => return Ok(()),
        };

        session.generation += 1;
        let generation = session.generation;
        let origin_ms = report.plan.now_ms;

        self.shared.publish(MetronomeEvent::Started { bpm, origin_ms });
        self.shared
            .publish(MetronomeEvent::ClickScheduled { at_ms: origin_ms });
        self.shared.publish_pass(&report);

        session.rearm = Some(
            self.runtime
                .spawn(rearm_loop(Arc::clone(&self.shared), generation)),
        );

        log::info!(
            "[Metronome] Started at {} BPM (origin {:.3}ms, window {:?})",
            bpm,
            origin_ms,
            self.shared.window
        );
        Ok(())
    }

    /// Change tempo without interrupting clicks already scheduled.
    ///
    /// Takes effect at the next pass. Returns `Ok(false)` when stopped.
    pub fn update_tempo(&self, bpm: f64) -> Result<bool, MetronomeError> {
        let tempo = Tempo::new(bpm)?;
        let mut session = self.shared.lock_session()?;
        if !session.scheduler.update_tempo(tempo)? {
            return Ok(false);
        }
        self.shared.publish(MetronomeEvent::TempoChanged { bpm });
        log::info!("[Metronome] Tempo set to {} BPM", bpm);
        Ok(true)
    }

    /// Stop clicking. Returns `Ok(false)` when already stopped.
    pub fn stop(&self) -> Result<bool, MetronomeError> {
        let mut session = self.shared.lock_session()?;
        session.generation += 1;
        if let Some(task) = session.rearm.take() {
            task.abort();
        }
        if !session.scheduler.stop() {
            return Ok(false);
        }
        self.shared.publish(MetronomeEvent::Stopped);
        log::info!("[Metronome] Stopped");
        Ok(true)
    }

    pub fn is_playing(&self) -> bool {
        self.shared
            .lock_session()
            .map(|session| session.scheduler.is_playing())
            .unwrap_or(false)
    }

    /// Requested tempo, if playing
    pub fn tempo(&self) -> Option<Tempo> {
        self.shared
            .lock_session()
            .ok()
            .and_then(|session| session.scheduler.tempo())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetronomeEvent> {
        self.shared.events.subscribe()
    }

    /// Event stream that skips over events lost to lagging
    pub fn event_stream(&self) -> impl Stream<Item = MetronomeEvent> {
        BroadcastStream::new(self.subscribe()).filter_map(|event| event.ok())
    }
}

impl Drop for Metronome {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
