// Piano Metronome Core - look-ahead click scheduler
// Clicks are timestamped on the audio clock; a coarse timer only tops them up

// Module declarations
pub mod audio;
pub mod config;
pub mod error;
pub mod metronome;
pub mod testing;

// Re-exports for convenience
pub use audio::{shared_output, AudioContext, CpalContext, OfflineContext};
pub use config::AppConfig;
pub use error::{ErrorCode, MetronomeError};
pub use metronome::{Metronome, MetronomeEvent, Tempo};
