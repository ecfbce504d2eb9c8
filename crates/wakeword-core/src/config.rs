//! Detector configuration
//!
//! Supplied once at detector creation. Can be persisted as JSON so a device
//! or the CLI can keep its tuning between runs.

use crate::error::{Result, WakeWordError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

fn default_threshold() -> f32 {
    crate::DEFAULT_THRESHOLD
}

fn default_sample_rate() -> u32 {
    crate::DEFAULT_SAMPLE_RATE
}

fn default_frame_size_ms() -> u32 {
    crate::DEFAULT_FRAME_SIZE_MS
}

fn default_cooldown_ms() -> u32 {
    crate::DEFAULT_COOLDOWN_MS
}

fn default_vad_threshold() -> f32 {
    0.5
}

fn default_tensor_arena_size() -> usize {
    crate::DEFAULT_TENSOR_ARENA_SIZE
}

fn default_wake_word() -> String {
    crate::DEFAULT_WAKE_WORD.to_string()
}

/// Wake-word detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WakeWordConfig {
    /// Location of the model, interpreted by the model loader (None = no model)
    #[serde(default)]
    pub model_path: Option<String>,
    /// Second model location tried when `model_path` cannot be loaded
    #[serde(default)]
    pub fallback_model_path: Option<String>,
    /// Detection threshold (0.0 to 1.0); scores must be strictly above it
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// Audio sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Audio frame duration in milliseconds
    #[serde(default = "default_frame_size_ms")]
    pub frame_size_ms: u32,
    /// Quiet period after a detection in milliseconds
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u32,
    /// Reserved: voice activity gating is accepted but not applied
    #[serde(default)]
    pub enable_vad: bool,
    /// Reserved: threshold for voice activity gating
    #[serde(default = "default_vad_threshold")]
    pub vad_threshold: f32,
    /// Working-memory budget of the model runtime in bytes
    #[serde(default = "default_tensor_arena_size")]
    pub tensor_arena_size: usize,
    /// Label passed to the detection handler
    #[serde(default = "default_wake_word")]
    pub wake_word: String,
    /// Score frames by energy when no model is loaded (integration testing)
    #[serde(default)]
    pub test_mode: bool,
}

impl Default for WakeWordConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            fallback_model_path: None,
            threshold: default_threshold(),
            sample_rate: default_sample_rate(),
            frame_size_ms: default_frame_size_ms(),
            cooldown_ms: default_cooldown_ms(),
            enable_vad: false,
            vad_threshold: default_vad_threshold(),
            tensor_arena_size: default_tensor_arena_size(),
            wake_word: default_wake_word(),
            test_mode: false,
        }
    }
}

impl WakeWordConfig {
    /// Number of samples expected per frame
    ///
    /// `sample_rate * frame_size_ms / 1000`, e.g. 1280 at 16kHz / 80ms.
    pub fn frame_samples(&self) -> usize {
        (self.sample_rate as u64 * self.frame_size_ms as u64 / 1000) as usize
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms as u64)
    }

    /// Check that the configuration describes a usable detector
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(WakeWordError::InvalidArgument(format!(
                "threshold must be within 0.0..=1.0, got {}",
                self.threshold
            )));
        }
        if self.sample_rate == 0 {
            return Err(WakeWordError::InvalidArgument(
                "sample rate must be non-zero".to_string(),
            ));
        }
        if self.frame_size_ms == 0 || self.frame_samples() == 0 {
            return Err(WakeWordError::InvalidArgument(format!(
                "frame of {} ms at {} Hz holds no samples",
                self.frame_size_ms, self.sample_rate
            )));
        }
        if self.tensor_arena_size == 0 {
            return Err(WakeWordError::InvalidArgument(
                "tensor arena size must be non-zero".to_string(),
            ));
        }
        if self.wake_word.is_empty() {
            return Err(WakeWordError::InvalidArgument(
                "wake word label must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Load config from a JSON file, falling back to defaults on any error
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    tracing::info!(path = %path.display(), "Loaded config from disk");
                    config
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!(path = %path.display(), "No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Save config as pretty JSON, creating parent directories if needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Config saved to disk");
        Ok(())
    }
}
