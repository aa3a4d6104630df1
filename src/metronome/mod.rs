//! Metronome: look-ahead click scheduling on the audio clock

pub mod engine;
pub mod events;
pub mod scheduler;
pub mod tempo;

pub use engine::Metronome;
pub use events::MetronomeEvent;
pub use scheduler::{
    clicks_per_pass, plan_clicks, ClickPlan, LookaheadScheduler, PassReport, DEFAULT_LOOKAHEAD_MS,
    MAX_LOOKAHEAD_MS,
};
pub use tempo::Tempo;
