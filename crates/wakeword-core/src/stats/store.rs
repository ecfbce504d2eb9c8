//! Detector statistics store
//!
//! Keeps the running counters and per-stage timings of a detector plus a
//! bounded history of recent confidences and detections.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// Maximum number of per-frame confidences kept (about 20s of 80ms frames)
const MAX_HISTORY_SIZE: usize = 256;

/// Maximum number of detection events kept
const MAX_DETECTION_HISTORY: usize = 64;

/// A single per-frame measurement
#[derive(Debug, Clone, Serialize)]
pub struct Measurement {
    pub timestamp: DateTime<Utc>,
    pub value: f32,
}

/// A delivered detection
#[derive(Debug, Clone, Serialize)]
pub struct DetectionEvent {
    /// When the detection was delivered
    pub timestamp: DateTime<Utc>,
    /// Score that crossed the threshold
    pub confidence: f32,
}

/// Snapshot of detector counters and timings
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct DetectorStats {
    /// Frames that reached feature extraction
    pub total_frames_processed: u64,
    /// Detections delivered to the handler
    pub detections_count: u64,
    /// Failed model invocations
    pub inference_errors: u64,
    /// Failed feature extractions
    pub preprocessing_errors: u64,
    pub avg_preprocessing_time: Duration,
    pub max_preprocessing_time: Duration,
    pub avg_inference_time: Duration,
    pub max_inference_time: Duration,
    /// Bytes of the loaded model (0 without a model)
    pub model_size_bytes: usize,
    /// Bytes reserved for the tensor arena (0 without a model)
    pub tensor_arena_size_bytes: usize,
    /// Bytes of the frame buffer
    pub audio_buffer_size_bytes: usize,
    pub model_loaded: bool,
    pub runtime_initialized: bool,
    pub test_mode_enabled: bool,
    /// Confidence computed for the most recent frame
    pub last_confidence: f32,
}

impl fmt::Display for DetectorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Frames processed:     {}", self.total_frames_processed)?;
        writeln!(f, "Detections:           {}", self.detections_count)?;
        writeln!(f, "Inference errors:     {}", self.inference_errors)?;
        writeln!(f, "Preprocessing errors: {}", self.preprocessing_errors)?;
        writeln!(
            f,
            "Preprocessing time:   avg {:?}, max {:?}",
            self.avg_preprocessing_time, self.max_preprocessing_time
        )?;
        writeln!(
            f,
            "Inference time:       avg {:?}, max {:?}",
            self.avg_inference_time, self.max_inference_time
        )?;
        writeln!(
            f,
            "Memory:               model {} B, arena {} B, audio {} B",
            self.model_size_bytes, self.tensor_arena_size_bytes, self.audio_buffer_size_bytes
        )?;
        write!(
            f,
            "Model loaded: {}, runtime ready: {}, test mode: {}",
            self.model_loaded, self.runtime_initialized, self.test_mode_enabled
        )
    }
}

/// Running average and maximum of a stage duration
#[derive(Debug, Default, Clone, Copy)]
struct Timing {
    total: Duration,
    count: u32,
    max: Duration,
}

impl Timing {
    fn record(&mut self, elapsed: Duration) {
        self.total = self.total.saturating_add(elapsed);
        self.count = self.count.saturating_add(1);
        self.max = self.max.max(elapsed);
    }

    fn average(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total / self.count
        }
    }
}

/// Statistics store of one detector
#[derive(Debug)]
pub struct StatsStore {
    /// Confidence of recent frames
    confidence_history: VecDeque<Measurement>,
    /// Recent detections
    detection_history: VecDeque<DetectionEvent>,
    max_size: usize,
    preprocessing: Timing,
    inference: Timing,
    stats: DetectorStats,
}

impl Default for StatsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsStore {
    pub fn new() -> Self {
        Self {
            confidence_history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
            detection_history: VecDeque::with_capacity(MAX_DETECTION_HISTORY),
            max_size: MAX_HISTORY_SIZE,
            preprocessing: Timing::default(),
            inference: Timing::default(),
            stats: DetectorStats::default(),
        }
    }

    /// Record the memory footprint and model state fixed at creation
    ///
    /// # Arguments
    /// * `model_size` - Bytes of the loaded model, 0 without one
    /// * `arena_size` - Bytes of the tensor arena, 0 without a model
    /// * `audio_buffer_size` - Bytes of the detector's frame buffer
    pub fn set_memory(&mut self, model_size: usize, arena_size: usize, audio_buffer_size: usize) {
        self.stats.model_size_bytes = model_size;
        self.stats.tensor_arena_size_bytes = arena_size;
        self.stats.audio_buffer_size_bytes = audio_buffer_size;
    }

    pub fn set_model_state(&mut self, model_loaded: bool, runtime_initialized: bool) {
        self.stats.model_loaded = model_loaded;
        self.stats.runtime_initialized = runtime_initialized;
    }

    pub fn set_test_mode(&mut self, enabled: bool) {
        self.stats.test_mode_enabled = enabled;
    }

    /// Count a frame entering feature extraction
    pub fn record_frame(&mut self) {
        self.stats.total_frames_processed += 1;
    }

    pub fn record_preprocessing(&mut self, elapsed: Duration) {
        self.preprocessing.record(elapsed);
        self.stats.avg_preprocessing_time = self.preprocessing.average();
        self.stats.max_preprocessing_time = self.preprocessing.max;
    }

    pub fn record_inference(&mut self, elapsed: Duration) {
        self.inference.record(elapsed);
        self.stats.avg_inference_time = self.inference.average();
        self.stats.max_inference_time = self.inference.max;
    }

    pub fn record_preprocessing_error(&mut self) {
        self.stats.preprocessing_errors += 1;
    }

    pub fn record_inference_error(&mut self) {
        self.stats.inference_errors += 1;
    }

    /// Record the confidence computed for a frame
    pub fn record_confidence(&mut self, confidence: f32) {
        if self.confidence_history.len() >= self.max_size {
            self.confidence_history.pop_front();
        }
        self.confidence_history.push_back(Measurement {
            timestamp: Utc::now(),
            value: confidence,
        });
        self.stats.last_confidence = confidence;
    }

    /// Record a delivered detection
    pub fn record_detection(&mut self, confidence: f32, timestamp: DateTime<Utc>) {
        if self.detection_history.len() >= MAX_DETECTION_HISTORY {
            self.detection_history.pop_front();
        }
        self.detection_history.push_back(DetectionEvent {
            timestamp,
            confidence,
        });
        self.stats.detections_count += 1;
    }

    /// Current counters and timings
    pub fn stats(&self) -> &DetectorStats {
        &self.stats
    }

    pub fn confidence_history(&self) -> &VecDeque<Measurement> {
        &self.confidence_history
    }

    pub fn detection_history(&self) -> &VecDeque<DetectionEvent> {
        &self.detection_history
    }

    /// Highest confidence among the last `count` frames
    pub fn peak_confidence(&self, count: usize) -> Option<f32> {
        self.confidence_history
            .iter()
            .rev()
            .take(count)
            .map(|m| m.value)
            .reduce(f32::max)
    }

    /// Reset counters, timings and history
    ///
    /// Memory sizes and model state describe the instance, not its
    /// activity, and are preserved.
    pub fn reset_counters(&mut self) {
        self.confidence_history.clear();
        self.detection_history.clear();
        self.preprocessing = Timing::default();
        self.inference = Timing::default();
        self.stats = DetectorStats {
            model_size_bytes: self.stats.model_size_bytes,
            tensor_arena_size_bytes: self.stats.tensor_arena_size_bytes,
            audio_buffer_size_bytes: self.stats.audio_buffer_size_bytes,
            model_loaded: self.stats.model_loaded,
            runtime_initialized: self.stats.runtime_initialized,
            test_mode_enabled: self.stats.test_mode_enabled,
            ..Default::default()
        };
    }
}
