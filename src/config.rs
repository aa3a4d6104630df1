//! Configuration management for metronome tuning
//!
//! This module provides runtime configuration loading from JSON files so the
//! look-ahead window, click sound, and audio buffering can be adjusted
//! without recompilation.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub metronome: MetronomeConfig,
    pub click: ClickConfig,
    pub audio: AudioConfig,
}

/// Inclusive BPM range accepted from user input
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoRange {
    pub min_bpm: f64,
    pub max_bpm: f64,
}

impl TempoRange {
    /// Clamp a user-supplied BPM into the range
    pub fn clamp(&self, bpm: f64) -> f64 {
        bpm.clamp(self.min_bpm, self.max_bpm)
    }

    pub fn contains(&self, bpm: f64) -> bool {
        (self.min_bpm..=self.max_bpm).contains(&bpm)
    }
}

impl Default for TempoRange {
    fn default() -> Self {
        Self {
            min_bpm: 30.0,
            max_bpm: 240.0,
        }
    }
}

/// Look-ahead scheduler parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    /// Look-ahead window in milliseconds; also the re-arm period
    pub lookahead_ms: f64,
    /// Tempo used when the caller does not supply one
    pub default_bpm: f64,
    pub tempo_range: TempoRange,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            lookahead_ms: 1024.0,
            default_bpm: 60.0,
            tempo_range: TempoRange::default(),
        }
    }
}

/// Click sound parameters (sine tone shaped by a gain ramp)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickConfig {
    pub frequency_hz: f64,
    /// Ramp from silence to peak
    pub attack_ms: f64,
    /// Ramp from peak back to silence
    pub release_ms: f64,
    pub peak_gain: f32,
}

impl Default for ClickConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 1000.0,
            attack_ms: 1.0,
            release_ms: 10.0,
            peak_gain: 1.0,
        }
    }
}

/// Audio output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate used for offline rendering
    pub offline_sample_rate: u32,
    /// Capacity of each voice's command queue
    pub voice_queue_capacity: usize,
    /// Size of the mixer's pre-allocated scratch buffer in frames
    pub max_render_frames: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            offline_sample_rate: 48000,
            voice_queue_capacity: 256,
            max_render_frames: 4096,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// Falls back to defaults (with a warning) when the file is missing or
    /// its JSON is invalid. Missing fields take their default values.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the default location
    pub fn load() -> Self {
        Self::load_from_file("assets/metronome_config.json")
    }
}
