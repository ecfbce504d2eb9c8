//! Log-mel spectrogram front-end
//!
//! Converts one frame of 16-bit PCM into a fixed-length vector of
//! log-compressed mel band energies, close enough to the librosa /
//! OpenWakeWord front-end for a pretrained model to consume.
//!
//! ## Pipeline
//!
//! ```text
//! i16 -> x / 32768 -> Hann window -> FFT (512) -> |X| (257 bins)
//!     -> mel filterbank (40 x 257) -> log10(x + 1e-10)
//! ```
//!
//! Only the first [`N_FFT`] samples of a frame contribute; shorter frames
//! are zero-padded. The window, filterbank and FFT plan are computed once
//! at construction and never change afterwards.

use crate::error::{Result, WakeWordError};
use crate::{N_FFT, N_FFT_BINS, N_MELS};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Lower edge of the filterbank in Hz
pub const FMIN_HZ: f32 = 0.0;

/// Floor added before the logarithm so silent bands stay finite
pub const LOG_EPSILON: f32 = 1e-10;

/// Scale from i16 full-scale to [-1, 1)
const SAMPLE_SCALE: f32 = 32768.0;

/// Convert frequency in Hz to the mel scale (HTK formula)
pub fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

/// Convert a mel-scale value back to Hz
pub fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10f64.powf(mel / 2595.0) - 1.0)
}

/// Allocate a zero-filled buffer, reporting allocation failure instead of aborting
fn alloc_zeroed<T: Clone + Default>(len: usize, what: &str) -> Result<Vec<T>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| WakeWordError::NoMemory(format!("{} ({} elements)", what, len)))?;
    buffer.resize(len, T::default());
    Ok(buffer)
}

/// Fill `window` with a symmetric Hann window
fn hann_window(window: &mut [f32]) {
    let size = window.len();
    if size < 2 {
        window.fill(1.0);
        return;
    }
    let denom = (size - 1) as f64;
    for (i, w) in window.iter_mut().enumerate() {
        *w = (0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / denom).cos())) as f32;
    }
}

/// Fill a row-major `n_mels x n_bins` matrix with triangular mel filters
///
/// `n_mels + 2` edge frequencies are spaced evenly in mel between
/// [`FMIN_HZ`] and Nyquist; filter `m` rises from edge `m` to edge `m + 1`
/// and falls back to zero at edge `m + 2`.
fn mel_filterbank(bank: &mut [f32], sample_rate: u32, n_fft: usize, n_mels: usize) {
    let n_bins = n_fft / 2 + 1;
    let mel_min = hz_to_mel(FMIN_HZ as f64);
    let mel_max = hz_to_mel(sample_rate as f64 / 2.0);
    let spacing = (mel_max - mel_min) / (n_mels + 1) as f64;

    let edges: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_min + i as f64 * spacing))
        .collect();

    bank.fill(0.0);
    for mel in 0..n_mels {
        let (left, center, right) = (edges[mel], edges[mel + 1], edges[mel + 2]);
        let row = &mut bank[mel * n_bins..(mel + 1) * n_bins];

        for (bin, weight) in row.iter_mut().enumerate() {
            let freq = bin as f64 * sample_rate as f64 / n_fft as f64;
            *weight = if freq >= left && freq <= center && center > left {
                ((freq - left) / (center - left)) as f32
            } else if freq > center && freq <= right && right > center {
                ((right - freq) / (right - center)) as f32
            } else {
                0.0
            };
        }
    }
}

/// Log-mel feature extractor
///
/// Owns the precomputed Hann window, mel filterbank and FFT plan plus the
/// scratch buffers of the transform. One instance serves one caller at a
/// time; create one per detector.
///
/// # Example
/// ```
/// use wakeword_core::audio::features::FeatureExtractor;
///
/// let mut extractor = FeatureExtractor::new(16000).unwrap();
/// let silence = vec![0i16; 1280];
///
/// let mel = extractor.extract_vec(&silence).unwrap();
/// assert_eq!(mel.len(), 40);
/// assert!((mel[0] - (-10.0)).abs() < 1e-3);
/// ```
pub struct FeatureExtractor {
    /// Sample rate the filterbank was built for
    sample_rate: u32,
    /// Hann window, N_FFT points
    window: Vec<f32>,
    /// Mel filterbank, N_MELS x N_FFT_BINS row-major
    filterbank: Vec<f32>,
    /// Forward FFT plan of size N_FFT
    fft: Arc<dyn Fft<f32>>,
    /// Complex transform buffer
    spectrum: Vec<Complex<f32>>,
    /// In-place FFT scratch
    scratch: Vec<Complex<f32>>,
    /// Magnitude spectrum for bins 0..=N_FFT/2
    magnitude: Vec<f32>,
}

impl FeatureExtractor {
    /// Create an extractor for the given sample rate
    ///
    /// # Arguments
    /// * `sample_rate` - Sample rate in Hz; the filterbank spans 0 Hz to Nyquist
    ///
    /// # Errors
    /// `InvalidArgument` for a zero sample rate, `NoMemory` if any buffer
    /// cannot be allocated.
    pub fn new(sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(WakeWordError::InvalidArgument(
                "sample rate must be non-zero".to_string(),
            ));
        }

        let mut window = alloc_zeroed::<f32>(N_FFT, "hann window")?;
        let mut filterbank = alloc_zeroed::<f32>(N_MELS * N_FFT_BINS, "mel filterbank")?;
        let spectrum = alloc_zeroed::<Complex<f32>>(N_FFT, "fft buffer")?;
        let magnitude = alloc_zeroed::<f32>(N_FFT_BINS, "magnitude buffer")?;

        hann_window(&mut window);
        mel_filterbank(&mut filterbank, sample_rate, N_FFT, N_MELS);

        let fft = FftPlanner::<f32>::new().plan_fft_forward(N_FFT);
        let scratch = alloc_zeroed::<Complex<f32>>(fft.get_inplace_scratch_len(), "fft scratch")?;

        tracing::info!(
            sample_rate,
            n_fft = N_FFT,
            n_mels = N_MELS,
            "Initialized log-mel feature extractor"
        );

        Ok(Self {
            sample_rate,
            window,
            filterbank,
            fft,
            spectrum,
            scratch,
            magnitude,
        })
    }

    /// Extract the log-mel vector of one frame into `out`
    ///
    /// Samples past [`N_FFT`] are ignored; a shorter frame is zero-padded.
    /// Exactly [`N_MELS`] values are written to the front of `out`.
    ///
    /// # Arguments
    /// * `samples` - PCM samples of the frame (must not be empty)
    /// * `out` - Destination, at least [`N_MELS`] long
    ///
    /// # Returns
    /// Number of values written (always [`N_MELS`])
    pub fn extract(&mut self, samples: &[i16], out: &mut [f32]) -> Result<usize> {
        if samples.is_empty() {
            return Err(WakeWordError::InvalidArgument(
                "no samples to extract features from".to_string(),
            ));
        }
        if out.len() < N_MELS {
            return Err(WakeWordError::InvalidArgument(format!(
                "feature buffer holds {} values, need {}",
                out.len(),
                N_MELS
            )));
        }

        let used = samples.len().min(N_FFT);
        for (i, (slot, &w)) in self.spectrum.iter_mut().zip(&self.window).enumerate() {
            let x = if i < used {
                samples[i] as f32 / SAMPLE_SCALE
            } else {
                0.0
            };
            *slot = Complex::new(x * w, 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);

        for (mag, c) in self.magnitude.iter_mut().zip(&self.spectrum) {
            *mag = c.norm();
        }

        for (mel, value) in out[..N_MELS].iter_mut().enumerate() {
            let row = &self.filterbank[mel * N_FFT_BINS..(mel + 1) * N_FFT_BINS];
            let energy: f32 = row
                .iter()
                .zip(&self.magnitude)
                .map(|(weight, mag)| weight * mag)
                .sum();
            *value = (energy + LOG_EPSILON).log10();
        }

        Ok(N_MELS)
    }

    /// Extract into a freshly allocated vector
    pub fn extract_vec(&mut self, samples: &[i16]) -> Result<Vec<f32>> {
        let mut out = vec![0.0f32; N_MELS];
        self.extract(samples, &mut out)?;
        Ok(out)
    }

    /// Sample rate the filterbank was built for
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Length of every feature vector
    pub fn n_mels(&self) -> usize {
        N_MELS
    }

    pub fn window(&self) -> &[f32] {
        &self.window
    }

    /// Mel filterbank, `N_MELS x N_FFT_BINS` row-major
    pub fn filterbank(&self) -> &[f32] {
        &self.filterbank
    }
}

impl std::fmt::Debug for FeatureExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureExtractor")
            .field("sample_rate", &self.sample_rate)
            .field("n_fft", &N_FFT)
            .field("n_mels", &N_MELS)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn tone(freq: f32, sample_rate: u32, len: usize, amplitude: f32) -> Vec<i16> {
        (0..len)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                ((2.0 * std::f32::consts::PI * freq * t).sin() * amplitude * 32767.0) as i16
            })
            .collect()
    }

    #[test]
    fn test_mel_scale_round_trip() {
        for hz in [0.0, 440.0, 1000.0, 8000.0] {
            assert_abs_diff_eq!(mel_to_hz(hz_to_mel(hz)), hz, epsilon = 1e-6);
        }
        assert_abs_diff_eq!(hz_to_mel(0.0), 0.0);
        // 1000 Hz is roughly 1000 mel on the HTK scale
        assert_abs_diff_eq!(hz_to_mel(1000.0), 999.99, epsilon = 0.1);
    }

    #[test]
    fn test_hann_window_shape() {
        let extractor = FeatureExtractor::new(16000).unwrap();
        let window = extractor.window();
        assert_eq!(window.len(), N_FFT);
        assert_abs_diff_eq!(window[0], 0.0, epsilon = 1e-7);
        assert_abs_diff_eq!(window[N_FFT - 1], 0.0, epsilon = 1e-7);
        // Symmetric
        for i in 0..N_FFT / 2 {
            assert_abs_diff_eq!(window[i], window[N_FFT - 1 - i], epsilon = 1e-6);
        }
        assert!(window.iter().all(|&w| (0.0..=1.0).contains(&w)));
    }

    #[test]
    fn test_filterbank_triangles() {
        let extractor = FeatureExtractor::new(16000).unwrap();
        let bank = extractor.filterbank();
        assert_eq!(bank.len(), N_MELS * N_FFT_BINS);

        for mel in 0..N_MELS {
            let row = &bank[mel * N_FFT_BINS..(mel + 1) * N_FFT_BINS];
            assert!(row.iter().all(|&w| (0.0..=1.0).contains(&w)));
            assert!(
                row.iter().any(|&w| w > 0.0),
                "mel band {} has no support",
                mel
            );
        }
    }

    #[test]
    fn test_zero_sample_rate_rejected() {
        assert!(matches!(
            FeatureExtractor::new(0),
            Err(WakeWordError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_silence_is_log_epsilon() {
        let mut extractor = FeatureExtractor::new(16000).unwrap();
        let mel = extractor.extract_vec(&[0i16; 1280]).unwrap();
        for value in mel {
            assert_abs_diff_eq!(value, LOG_EPSILON.log10(), epsilon = 1e-4);
        }
    }

    #[test]
    fn test_invalid_arguments() {
        let mut extractor = FeatureExtractor::new(16000).unwrap();
        let mut out = [0.0f32; N_MELS];
        assert!(matches!(
            extractor.extract(&[], &mut out),
            Err(WakeWordError::InvalidArgument(_))
        ));

        let mut short = [0.0f32; N_MELS - 1];
        assert!(matches!(
            extractor.extract(&[1, 2, 3], &mut short),
            Err(WakeWordError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_only_first_n_mels_written() {
        let mut extractor = FeatureExtractor::new(16000).unwrap();
        let mut out = [7.0f32; N_MELS + 4];
        let written = extractor.extract(&[100i16; 600], &mut out).unwrap();
        assert_eq!(written, N_MELS);
        assert_eq!(&out[N_MELS..], &[7.0; 4]);
    }

    #[test]
    fn test_tone_peaks_near_its_frequency() {
        let sample_rate = 16000;
        let mut extractor = FeatureExtractor::new(sample_rate).unwrap();
        let mel = extractor
            .extract_vec(&tone(1000.0, sample_rate, N_FFT, 0.5))
            .unwrap();

        let peak = mel
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();

        let spacing = hz_to_mel(sample_rate as f64 / 2.0) / (N_MELS + 1) as f64;
        let center_hz = mel_to_hz((peak + 1) as f64 * spacing);
        assert!(
            (center_hz - 1000.0).abs() < 150.0,
            "peak band {} centered at {:.0} Hz, expected near 1000 Hz",
            peak,
            center_hz
        );
    }

    #[test]
    fn test_louder_signal_has_more_energy() {
        let mut extractor = FeatureExtractor::new(16000).unwrap();
        let quiet = extractor
            .extract_vec(&tone(500.0, 16000, N_FFT, 0.05))
            .unwrap();
        let loud = extractor
            .extract_vec(&tone(500.0, 16000, N_FFT, 0.5))
            .unwrap();

        let quiet_sum: f32 = quiet.iter().sum();
        let loud_sum: f32 = loud.iter().sum();
        assert!(loud_sum > quiet_sum);
    }
}
