//! Naptick wake-word detection
//!
//! This library re-exports the feature extractor, model runtime, detector
//! and statistics from `wakeword-core`.

pub use wakeword_core::audio;
pub use wakeword_core::config;
pub use wakeword_core::detector;
pub use wakeword_core::error;
pub use wakeword_core::model;
pub use wakeword_core::stats;

pub use wakeword_core::{
    Clock, Detection, DetectionHandler, DetectorStats, FeatureExtractor, FrameAssembler,
    ManualClock, ModelRuntime, ModelSlot, MonotonicClock, Result, StatsStore, WakeWordConfig,
    WakeWordDetector, WakeWordError,
};
pub use wakeword_core::{
    BUILD_DATE, DEFAULT_SAMPLE_RATE, DEFAULT_WAKE_WORD, N_FFT, N_MELS, VERSION,
};
