//! Wakeword Core - log-mel front-end, model runtime and detector
//!
//! This library implements the on-device wake-word pipeline of the Naptick
//! voice assistant. One audio frame flows through three stages:
//!
//! 1. [`FeatureExtractor`]: 16-bit PCM frame -> 40-band log-mel vector
//! 2. [`ModelRuntime`]: feature vector -> model output (wake-word probability)
//! 3. [`WakeWordDetector`]: threshold, cooldown and detection delivery
//!
//! Model bytes, audio capture and the clock are supplied by the caller, so
//! every stage can be driven from tests without hardware.

pub mod audio;
pub mod config;
pub mod detector;
pub mod error;
pub mod model;
pub mod stats;

pub use audio::features::FeatureExtractor;
pub use audio::framer::FrameAssembler;
pub use config::WakeWordConfig;
pub use detector::{
    Clock, Detection, DetectionHandler, ManualClock, ModelSlot, MonotonicClock, WakeWordDetector,
};
pub use error::{Result, WakeWordError};
pub use model::runtime::ModelRuntime;
pub use stats::store::{DetectorStats, StatsStore};

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date stamped by build.rs
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Default sample rate for microphone audio (16kHz, what the models are trained on)
pub const DEFAULT_SAMPLE_RATE: u32 = 16000;

/// Default frame duration in milliseconds (1280 samples at 16kHz)
pub const DEFAULT_FRAME_SIZE_MS: u32 = 80;

/// Default cooldown after a detection in milliseconds
pub const DEFAULT_COOLDOWN_MS: u32 = 2000;

/// Default detection threshold
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Default tensor arena budget in bytes
pub const DEFAULT_TENSOR_ARENA_SIZE: usize = 100 * 1024;

/// Label reported for detections unless configured otherwise
pub const DEFAULT_WAKE_WORD: &str = "hey_naptick";

/// FFT size of the mel front-end
pub const N_FFT: usize = 512;

/// Number of mel bands produced per frame
pub const N_MELS: usize = 40;

/// Number of FFT magnitude bins consumed by the filterbank (N_FFT / 2 + 1)
pub const N_FFT_BINS: usize = N_FFT / 2 + 1;
