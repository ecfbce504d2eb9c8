//! Wake-word detector
//!
//! Owns a [`FeatureExtractor`], an optional [`ModelRuntime`] and the
//! threshold/cooldown state machine. One call to
//! [`WakeWordDetector::process_audio`] handles one frame:
//!
//! ```text
//! frame -> cooldown gate -> log-mel features -> model -> confidence
//!                                                          |
//!                               confidence > threshold -> handler
//! ```
//!
//! The handler runs synchronously on the caller's thread. It must be quick;
//! a handler that needs to do real work should forward the [`Detection`]
//! elsewhere, e.g. through a `crossbeam_channel::Sender`.

use crate::audio::energy::energy_confidence;
use crate::audio::features::FeatureExtractor;
use crate::config::WakeWordConfig;
use crate::error::{Result, WakeWordError};
use crate::model::loader::{load_with_fallback, ModelLoader};
use crate::model::runtime::{Backend, ModelRuntime};
use crate::stats::store::{DetectorStats, StatsStore};
use crate::N_MELS;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Model outputs read per frame
const OUTPUT_CAPACITY: usize = 4;

/// Frames between "model not loaded" debug logs
const NOT_READY_LOG_INTERVAL: u64 = 100;

/// A wake-word detection delivered to the handler
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Configured wake-word label
    pub label: String,
    /// Score that crossed the threshold
    pub confidence: f32,
    /// Wall-clock time of the detection
    pub timestamp: DateTime<Utc>,
}

/// Receiver of detections
pub trait DetectionHandler: Send {
    fn on_detection(&mut self, detection: &Detection);
}

impl<F> DetectionHandler for F
where
    F: FnMut(&Detection) + Send,
{
    fn on_detection(&mut self, detection: &Detection) {
        self(detection)
    }
}

/// Event-queue delivery: detections are sent to a channel
impl DetectionHandler for crossbeam_channel::Sender<Detection> {
    fn on_detection(&mut self, detection: &Detection) {
        if self.send(detection.clone()).is_err() {
            tracing::warn!(label = %detection.label, "Detection receiver dropped");
        }
    }
}

/// Monotonic time source for cooldown tracking
pub trait Clock: Send {
    /// Time elapsed since the clock's epoch
    fn now(&self) -> Duration;
}

/// [`Clock`] backed by [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Manually advanced [`Clock`]
///
/// Clones share the same time, so a test can keep one handle and move time
/// forward while the detector owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, at: Duration) {
        self.millis.store(at.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

/// Model owned by a detector
#[derive(Debug)]
pub enum ModelSlot {
    Loaded(ModelRuntime),
    Unloaded,
}

impl ModelSlot {
    pub fn is_loaded(&self) -> bool {
        matches!(self, ModelSlot::Loaded(_))
    }

    pub fn runtime(&self) -> Option<&ModelRuntime> {
        match self {
            ModelSlot::Loaded(runtime) => Some(runtime),
            ModelSlot::Unloaded => None,
        }
    }
}

impl From<Option<ModelRuntime>> for ModelSlot {
    fn from(runtime: Option<ModelRuntime>) -> Self {
        runtime.map_or(ModelSlot::Unloaded, ModelSlot::Loaded)
    }
}

/// Threshold and cooldown state machine over the feature/model pipeline
pub struct WakeWordDetector {
    config: WakeWordConfig,
    extractor: FeatureExtractor,
    model: ModelSlot,
    handler: Box<dyn DetectionHandler>,
    clock: Box<dyn Clock>,
    /// Frame buffer, `frame_samples` long
    audio_buffer: Vec<i16>,
    /// Log-mel features of the current frame
    features: Vec<f32>,
    output: [f32; OUTPUT_CAPACITY],
    /// Clock reading of the last detection; None until the first one
    last_detection: Option<Duration>,
    cooldown: Duration,
    /// Frames refused with `NotReady`
    not_ready_frames: u64,
    stats: StatsStore,
}

impl WakeWordDetector {
    /// Create a detector using the monotonic system clock
    ///
    /// # Arguments
    /// * `config` - Detector configuration, validated here
    /// * `model` - Loaded model, or `ModelSlot::Unloaded`
    /// * `handler` - Receives every detection, synchronously
    pub fn new(
        config: WakeWordConfig,
        model: ModelSlot,
        handler: impl DetectionHandler + 'static,
    ) -> Result<Self> {
        Self::with_clock(config, model, handler, MonotonicClock::default())
    }

    /// Create a detector with an explicit time source
    pub fn with_clock(
        config: WakeWordConfig,
        model: ModelSlot,
        handler: impl DetectionHandler + 'static,
        clock: impl Clock + 'static,
    ) -> Result<Self> {
        config.validate()?;

        let extractor = FeatureExtractor::new(config.sample_rate)?;
        let frame_samples = config.frame_samples();

        let mut audio_buffer = Vec::new();
        audio_buffer.try_reserve_exact(frame_samples).map_err(|_| {
            WakeWordError::NoMemory(format!("audio buffer of {} samples", frame_samples))
        })?;
        audio_buffer.resize(frame_samples, 0);

        let mut stats = StatsStore::new();
        let (model_size, arena_size) = model
            .runtime()
            .map_or((0, 0), |rt| (rt.model_size(), rt.arena_size()));
        stats.set_memory(
            model_size,
            arena_size,
            frame_samples * std::mem::size_of::<i16>(),
        );
        stats.set_model_state(
            model.is_loaded(),
            model.runtime().is_some_and(|rt| rt.is_initialized()),
        );
        stats.set_test_mode(config.test_mode);

        if config.enable_vad {
            tracing::warn!("VAD gating is not implemented; enable_vad is ignored");
        }

        tracing::info!(
            threshold = config.threshold,
            sample_rate = config.sample_rate,
            frame_samples,
            cooldown_ms = config.cooldown_ms,
            model_loaded = model.is_loaded(),
            test_mode = config.test_mode,
            "Wake-word detector initialized"
        );

        Ok(Self {
            cooldown: config.cooldown(),
            config,
            extractor,
            model,
            handler: Box::new(handler),
            clock: Box::new(clock),
            audio_buffer,
            features: vec![0.0; N_MELS],
            output: [0.0; OUTPUT_CAPACITY],
            last_detection: None,
            not_ready_frames: 0,
            stats,
        })
    }

    /// Create a detector, loading the configured model
    ///
    /// Tries `model_path`, then `fallback_model_path`. A model that cannot
    /// be loaded or instantiated leaves the detector without one: it
    /// reports `NotReady` per frame (or scores by energy in test mode)
    /// instead of failing here.
    ///
    /// # Errors
    /// Only configuration and front-end failures; never model failures.
    pub fn load(
        config: WakeWordConfig,
        loader: &dyn ModelLoader,
        backend: &dyn Backend,
        handler: impl DetectionHandler + 'static,
    ) -> Result<Self> {
        Self::load_with_clock(config, loader, backend, handler, MonotonicClock::default())
    }

    /// Like [`load`](Self::load), with an explicit time source for the cooldown
    ///
    /// Offline drivers pass a [`ManualClock`] advanced by the frame duration,
    /// so the cooldown is measured in audio time instead of wall time.
    pub fn load_with_clock(
        config: WakeWordConfig,
        loader: &dyn ModelLoader,
        backend: &dyn Backend,
        handler: impl DetectionHandler + 'static,
        clock: impl Clock + 'static,
    ) -> Result<Self> {
        config.validate()?;

        let model = match config.model_path.as_deref() {
            None => {
                tracing::info!("No model path configured");
                ModelSlot::Unloaded
            }
            Some(path) => {
                let runtime = load_with_fallback(
                    loader,
                    path,
                    config.fallback_model_path.as_deref(),
                )
                .and_then(|bytes| ModelRuntime::create(bytes, config.tensor_arena_size, backend));

                match runtime {
                    Ok(runtime) => ModelSlot::Loaded(runtime),
                    Err(e) => {
                        tracing::warn!(
                            path,
                            error = %e,
                            "Failed to load model, continuing without it"
                        );
                        ModelSlot::Unloaded
                    }
                }
            }
        };

        Self::with_clock(config, model, handler, clock)
    }

    /// Process one audio frame
    ///
    /// Frames arriving during the cooldown after a detection are accepted
    /// and ignored. Input longer than a frame is truncated; shorter input is
    /// processed as-is.
    ///
    /// # Errors
    /// * `InvalidArgument` - empty input
    /// * `NotReady` - no model loaded and test mode off
    /// * `PreprocessingFailed` - feature extraction failed
    /// * `InferenceFailed` (or `InvalidState`) - the model invocation failed
    pub fn process_audio(&mut self, samples: &[i16]) -> Result<()> {
        if samples.is_empty() {
            return Err(WakeWordError::InvalidArgument(
                "empty audio frame".to_string(),
            ));
        }

        if self.is_in_cooldown() {
            return Ok(());
        }

        let frame_samples = self.audio_buffer.len();
        if samples.len() != frame_samples {
            tracing::warn!(
                got = samples.len(),
                expected = frame_samples,
                "Audio frame size mismatch"
            );
        }
        let n = samples.len().min(frame_samples);
        self.audio_buffer[..n].copy_from_slice(&samples[..n]);

        if !self.model.is_loaded() && !self.config.test_mode {
            if self.not_ready_frames % NOT_READY_LOG_INTERVAL == 0 {
                tracing::debug!(frames = self.not_ready_frames, "Model not loaded, skipping frame");
            }
            self.not_ready_frames += 1;
            return Err(WakeWordError::NotReady);
        }

        self.stats.record_frame();

        let started = Instant::now();
        if let Err(e) = self
            .extractor
            .extract(&self.audio_buffer[..n], &mut self.features)
        {
            self.stats.record_preprocessing_error();
            tracing::error!(error = %e, "Feature extraction failed");
            return Err(WakeWordError::PreprocessingFailed(e.to_string()));
        }
        self.stats.record_preprocessing(started.elapsed());

        let confidence = match &mut self.model {
            ModelSlot::Loaded(runtime) => {
                let started = Instant::now();
                let written = match runtime.invoke(&self.features, &mut self.output) {
                    Ok(written) => written,
                    Err(WakeWordError::NotSupported) => 0,
                    Err(e) => {
                        self.stats.record_inference_error();
                        tracing::error!(error = %e, "Inference failed");
                        return Err(e);
                    }
                };
                self.stats.record_inference(started.elapsed());
                confidence_from_outputs(&self.output[..written])
            }
            ModelSlot::Unloaded => energy_confidence(&self.audio_buffer[..n]),
        };
        self.stats.record_confidence(confidence);

        if confidence > self.config.threshold {
            self.last_detection = Some(self.clock.now());
            let detection = Detection {
                label: self.config.wake_word.clone(),
                confidence,
                timestamp: Utc::now(),
            };
            self.stats.record_detection(confidence, detection.timestamp);

            tracing::info!(
                label = %detection.label,
                confidence,
                threshold = self.config.threshold,
                "Wake word detected"
            );
            self.handler.on_detection(&detection);
        }

        Ok(())
    }

    /// Whether frames are currently being ignored after a detection
    pub fn is_in_cooldown(&self) -> bool {
        match self.last_detection {
            Some(at) => self.clock.now().saturating_sub(at) < self.cooldown,
            None => false,
        }
    }

    /// Samples expected per `process_audio` call
    pub fn input_requirements(&self) -> usize {
        self.audio_buffer.len()
    }

    /// `(frames processed, detections, model loaded)`
    pub fn statistics(&self) -> (u64, u64, bool) {
        let stats = self.stats.stats();
        (
            stats.total_frames_processed,
            stats.detections_count,
            self.model.is_loaded(),
        )
    }

    /// Full snapshot of counters, timings and memory use
    pub fn stats(&self) -> DetectorStats {
        self.stats.stats().clone()
    }

    /// Recent per-frame confidences and detections
    pub fn stats_store(&self) -> &StatsStore {
        &self.stats
    }

    /// Zero counters and timings; the cooldown is left running
    pub fn reset_stats(&mut self) {
        self.stats.reset_counters();
        tracing::info!("Detector statistics reset");
    }

    pub fn config(&self) -> &WakeWordConfig {
        &self.config
    }

    pub fn model(&self) -> &ModelSlot {
        &self.model
    }
}

impl Drop for WakeWordDetector {
    fn drop(&mut self) {
        let stats = self.stats.stats();
        tracing::info!(
            frames = stats.total_frames_processed,
            detections = stats.detections_count,
            inference_errors = stats.inference_errors,
            "Wake-word detector shut down"
        );
    }
}

/// Wake-word probability from the model outputs
///
/// Two-class models emit `[background, wake_word]`; single-output models
/// emit the probability directly.
fn confidence_from_outputs(outputs: &[f32]) -> f32 {
    match outputs {
        [_, wake, ..] => *wake,
        [only] => *only,
        [] => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::runtime::Interpreter;
    use crate::model::schema::header_only_model;
    use std::sync::Mutex;

    /// Returns the same outputs on every invoke
    struct FixedInterpreter {
        outputs: Vec<f32>,
    }

    impl Interpreter for FixedInterpreter {
        fn input_len(&self) -> usize {
            N_MELS
        }

        fn output_len(&self) -> usize {
            self.outputs.len()
        }

        fn invoke(&mut self, _input: &[f32], output: &mut [f32]) -> Result<()> {
            output.copy_from_slice(&self.outputs);
            Ok(())
        }
    }

    struct FixedBackend(Vec<f32>);

    impl Backend for FixedBackend {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn build(&self, _model: &[u8]) -> Result<Box<dyn Interpreter>> {
            Ok(Box::new(FixedInterpreter {
                outputs: self.0.clone(),
            }))
        }
    }

    fn slot(outputs: &[f32]) -> ModelSlot {
        let runtime =
            ModelRuntime::create(header_only_model(3), 4096, &FixedBackend(outputs.to_vec()))
                .unwrap();
        ModelSlot::Loaded(runtime)
    }

    fn counting_handler() -> (Arc<Mutex<Vec<Detection>>>, impl DetectionHandler) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler = move |d: &Detection| sink.lock().unwrap().push(d.clone());
        (seen, handler)
    }

    #[test]
    fn test_confidence_from_outputs() {
        assert_eq!(confidence_from_outputs(&[0.1, 0.8, 0.0, 0.0]), 0.8);
        assert_eq!(confidence_from_outputs(&[0.1, 0.8]), 0.8);
        assert_eq!(confidence_from_outputs(&[0.7]), 0.7);
        assert_eq!(confidence_from_outputs(&[]), 0.0);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = WakeWordConfig {
            threshold: 2.0,
            ..Default::default()
        };
        let (_, handler) = counting_handler();
        assert!(WakeWordDetector::new(config, ModelSlot::Unloaded, handler).is_err());
    }

    #[test]
    fn test_empty_input() {
        let (_, handler) = counting_handler();
        let mut detector =
            WakeWordDetector::new(WakeWordConfig::default(), slot(&[0.0, 0.1]), handler).unwrap();
        assert!(matches!(
            detector.process_audio(&[]),
            Err(WakeWordError::InvalidArgument(_))
        ));
        assert_eq!(detector.statistics().0, 0);
    }

    #[test]
    fn test_single_output_model() {
        let (seen, handler) = counting_handler();
        let mut detector =
            WakeWordDetector::new(WakeWordConfig::default(), slot(&[0.75]), handler).unwrap();
        detector.process_audio(&[0i16; 1280]).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].confidence, 0.75);
        assert_eq!(seen[0].label, "hey_naptick");
    }

    #[test]
    fn test_test_mode_scores_energy() {
        let clock = ManualClock::new();
        let config = WakeWordConfig {
            test_mode: true,
            ..Default::default()
        };
        let (seen, handler) = counting_handler();
        let mut detector =
            WakeWordDetector::with_clock(config, ModelSlot::Unloaded, handler, clock).unwrap();

        detector.process_audio(&[0i16; 1280]).unwrap();
        assert!(seen.lock().unwrap().is_empty());

        let loud: Vec<i16> = (0..1280)
            .map(|i| if i % 2 == 0 { 20000 } else { -20000 })
            .collect();
        detector.process_audio(&loud).unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(detector.stats().test_mode_enabled);
        assert!(!detector.stats().model_loaded);
    }

    #[test]
    fn test_cooldown_starts_clear() {
        let (_, handler) = counting_handler();
        let detector =
            WakeWordDetector::new(WakeWordConfig::default(), slot(&[0.0, 0.1]), handler).unwrap();
        assert!(!detector.is_in_cooldown());
    }

    #[test]
    fn test_memory_stats() {
        let (_, handler) = counting_handler();
        let detector =
            WakeWordDetector::new(WakeWordConfig::default(), slot(&[0.0, 0.1]), handler).unwrap();
        let stats = detector.stats();
        assert_eq!(stats.model_size_bytes, 24);
        assert_eq!(stats.tensor_arena_size_bytes, 4096);
        assert_eq!(stats.audio_buffer_size_bytes, 2560);
        assert!(stats.model_loaded);
        assert!(stats.runtime_initialized);
        assert_eq!(detector.input_requirements(), 1280);
    }

    #[test]
    fn test_reset_stats() {
        let (_, handler) = counting_handler();
        let mut detector =
            WakeWordDetector::new(WakeWordConfig::default(), slot(&[0.0, 0.1]), handler).unwrap();
        for _ in 0..5 {
            detector.process_audio(&[0i16; 1280]).unwrap();
        }
        assert_eq!(detector.statistics(), (5, 0, true));

        detector.reset_stats();
        assert_eq!(detector.statistics(), (0, 0, true));
        assert_eq!(detector.stats().model_size_bytes, 24);
    }
}
