// Audio module - audio clock, click voice, and output contexts

pub mod clock;
pub mod context;
pub mod context_cpal;
pub mod mixer;
pub mod voice;

// Re-export commonly used types for convenience
pub use clock::FrameClock;
pub use context::{shared_output, AudioContext, OfflineContext};
pub use context_cpal::CpalContext;
pub use mixer::Mixer;
pub use voice::{click_voice, ClickEnvelope, ClickSchedule, ClickVoice, VoiceCommand, VoiceHandle};
