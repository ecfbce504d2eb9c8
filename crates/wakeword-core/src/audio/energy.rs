//! Energy-based scoring for test mode
//!
//! Lets the detector run end-to-end without a trained model: loud frames
//! score high, quiet frames score zero. Only meant for integration testing
//! of the capture and detection-delivery path.

/// Frames quieter than this never score
pub const ENERGY_THRESHOLD_DB: f32 = -30.0;

/// Lowest non-zero confidence a frame can receive
pub const MIN_CONFIDENCE: f32 = 0.3;

/// Highest confidence a frame can receive
pub const MAX_CONFIDENCE: f32 = 0.9;

/// dB span mapped onto MIN_CONFIDENCE..MAX_CONFIDENCE
const ENERGY_RANGE_DB: f32 = 20.0;

/// RMS level of a frame, samples scaled to [-1, 1)
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples
        .iter()
        .map(|&s| {
            let x = s as f32 / 32768.0;
            x * x
        })
        .sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// RMS level in dBFS
pub fn rms_db(samples: &[i16]) -> f32 {
    20.0 * (rms(samples) + 1e-10).log10()
}

/// Confidence in 0.0..=0.9 derived from frame loudness
///
/// # Example
/// ```
/// use wakeword_core::audio::energy::energy_confidence;
///
/// assert_eq!(energy_confidence(&[0i16; 1280]), 0.0);
/// assert!(energy_confidence(&[16000i16; 1280]) > 0.5);
/// ```
pub fn energy_confidence(samples: &[i16]) -> f32 {
    let db = rms_db(samples);
    if db <= ENERGY_THRESHOLD_DB {
        return 0.0;
    }
    let normalized = (db - ENERGY_THRESHOLD_DB) / ENERGY_RANGE_DB;
    (MIN_CONFIDENCE + normalized * (MAX_CONFIDENCE - MIN_CONFIDENCE)).min(MAX_CONFIDENCE)
}
