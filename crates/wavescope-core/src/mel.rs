//! Mel spectrogram computation
//!
//! Short-time Fourier analysis of the mono mixdown, folded through a
//! triangular mel filterbank and converted to dB. The result is a full-file
//! matrix independent of any view; it is recomputed only when the FFT size
//! or window function changes, never on scroll or zoom.
//!
//! Frequency layout: filter centers are evenly spaced on the mel scale
//! (`mel(f) = 2595·log10(1 + f/700)`) between 20 Hz and the Nyquist limit,
//! capped at 22.05 kHz. Each filter ramps linearly up to its center bin and
//! back down to its right neighbor, peaking at 1.

use rayon::prelude::*;
use realfft::RealFftPlanner;
use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::types::SampleBuffer;

/// Number of mel bands in the spectrogram
pub const N_MELS: usize = 256;

/// Lowest displayed frequency in Hz
pub const F_MIN_HZ: f64 = 20.0;

/// Highest displayed frequency in Hz (capped at Nyquist per file)
pub const F_MAX_HZ: f64 = 22_050.0;

/// Default FFT size; must be one of [`FFT_SIZES`]
pub const DEFAULT_FFT_SIZE: usize = 2_048;

/// FFT sizes the analysis UI offers
pub const FFT_SIZES: [usize; 5] = [512, 1_024, 2_048, 4_096, 8_192];

/// Power floor before the dB conversion
const POWER_EPSILON: f32 = 1e-10;

/// Analysis window applied to each STFT frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WindowKind {
    #[default]
    Hann,
    Hamming,
    BlackmanHarris,
}

impl WindowKind {
    /// Periodic window coefficients of the given length
    pub fn coefficients(self, size: usize) -> Vec<f32> {
        use std::f64::consts::PI;
        let n = size.max(1) as f64;
        (0..size)
            .map(|i| {
                let phase = 2.0 * PI * i as f64 / n;
                let w = match self {
                    WindowKind::Hann => 0.5 - 0.5 * phase.cos(),
                    WindowKind::Hamming => 0.54 - 0.46 * phase.cos(),
                    WindowKind::BlackmanHarris => {
                        0.35875 - 0.48829 * phase.cos() + 0.14128 * (2.0 * phase).cos()
                            - 0.01168 * (3.0 * phase).cos()
                    }
                };
                w as f32
            })
            .collect()
    }

    pub fn name(self) -> &'static str {
        match self {
            WindowKind::Hann => "hann",
            WindowKind::Hamming => "hamming",
            WindowKind::BlackmanHarris => "blackman-harris",
        }
    }
}

/// Spectrogram analysis parameters; changing either field invalidates the
/// computed matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpectrogramParams {
    pub fft_size: usize,
    pub window: WindowKind,
}

impl Default for SpectrogramParams {
    fn default() -> Self {
        Self {
            fft_size: DEFAULT_FFT_SIZE,
            window: WindowKind::Hann,
        }
    }
}

impl SpectrogramParams {
    /// Hop between successive frames (fixed quarter-window overlap)
    pub fn hop(&self) -> usize {
        (self.fft_size / 4).max(1)
    }
}

/// Full-file mel spectrogram in dB, row-major `[mel][frame]`
#[derive(Debug, Clone, PartialEq)]
pub struct MelSpectrogram {
    n_mels: usize,
    n_frames: usize,
    data: Vec<f32>,
}

impl MelSpectrogram {
    /// Assemble a spectrogram from raw row-major `[mel][frame]` data
    ///
    /// `None` unless `data` holds a whole number of `n_mels` rows.
    pub fn from_data(n_mels: usize, data: Vec<f32>) -> Option<Self> {
        if n_mels == 0 || data.is_empty() || data.len() % n_mels != 0 {
            return None;
        }
        let n_frames = data.len() / n_mels;
        Some(Self {
            n_mels,
            n_frames,
            data,
        })
    }

    pub fn n_mels(&self) -> usize {
        self.n_mels
    }

    pub fn n_frames(&self) -> usize {
        self.n_frames
    }

    /// One mel band across all frames
    pub fn row(&self, mel: usize) -> &[f32] {
        &self.data[mel * self.n_frames..(mel + 1) * self.n_frames]
    }

    pub fn value(&self, mel: usize, frame: usize) -> f32 {
        self.data[mel * self.n_frames + frame]
    }
}

/// Convert frequency in Hz to mel
#[inline]
pub fn hz_to_mel(hz: f64) -> f64 {
    2_595.0 * (1.0 + hz / 700.0).log10()
}

/// Convert mel to frequency in Hz
#[inline]
pub fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10.0f64.powf(mel / 2_595.0) - 1.0)
}

/// The full displayable mel range `[mel(20 Hz), mel(min(22050, sr/2))]`
pub fn full_mel_range(sample_rate: u32) -> (f64, f64) {
    let f_max = F_MAX_HZ.min(sample_rate as f64 / 2.0);
    (hz_to_mel(F_MIN_HZ), hz_to_mel(f_max))
}

/// One triangular mel filter over a contiguous run of FFT bins
struct MelFilter {
    first_bin: usize,
    weights: Vec<f32>,
}

/// Build the triangular filterbank for the given analysis geometry
///
/// Centers are evenly spaced in mel, converted back to Hz and snapped to FFT
/// bin indices. Degenerate filters (neighboring centers on the same bin) are
/// widened by one bin so every filter has nonzero support.
fn mel_filterbank(sample_rate: u32, fft_size: usize, n_mels: usize) -> Vec<MelFilter> {
    let n_freqs = fft_size / 2 + 1;
    let f_max = F_MAX_HZ.min(sample_rate as f64 / 2.0);
    let mel_min = hz_to_mel(F_MIN_HZ);
    let mel_max = hz_to_mel(f_max);
    let n_points = n_mels + 2;

    let bin_points: Vec<usize> = (0..n_points)
        .map(|i| {
            let mel = mel_min + (mel_max - mel_min) * i as f64 / (n_points - 1) as f64;
            let hz = mel_to_hz(mel);
            (((fft_size + 1) as f64 * hz / sample_rate as f64).floor() as usize).min(n_freqs - 1)
        })
        .collect();

    (0..n_mels)
        .map(|m| {
            let left = bin_points[m];
            let mut center = bin_points[m + 1];
            if center == left {
                center = left + 1;
            }
            let mut right = bin_points[m + 2];
            if right <= center {
                right = center + 1;
            }
            let weights = (left..right.min(n_freqs))
                .map(|j| {
                    if j < center {
                        (j - left) as f32 / (center - left) as f32
                    } else {
                        (right - j) as f32 / (right - center) as f32
                    }
                })
                .collect();
            MelFilter {
                first_bin: left,
                weights,
            }
        })
        .collect()
}

/// Compute the full-file mel spectrogram
///
/// Mixes all channels to mono, runs a hop = fft/4 STFT with the configured
/// window, and folds the power spectra through the filterbank. Returns
/// `None` when the audio is shorter than one FFT frame; that is a valid
/// state ("spectrogram unavailable"), not an error.
pub fn compute_mel_spectrogram(
    buffer: &SampleBuffer,
    params: SpectrogramParams,
) -> Option<MelSpectrogram> {
    let fft_size = params.fft_size;
    let n = buffer.total_samples();
    if n < fft_size || fft_size == 0 {
        return None;
    }

    let mono = mix_to_mono(buffer);
    let hop = params.hop();
    let n_frames = (n - fft_size) / hop + 1;
    let window = params.window.coefficients(fft_size);
    let win_sum: f32 = window.iter().sum();
    let norm = 1.0 / (win_sum * win_sum).max(f32::MIN_POSITIVE);
    let filterbank = mel_filterbank(buffer.sample_rate(), fft_size, N_MELS);

    let mut planner = RealFftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(fft_size);

    // One mel column per frame, computed independently
    let columns: Vec<Vec<f32>> = (0..n_frames)
        .into_par_iter()
        .map_init(
            || {
                (
                    fft.make_input_vec(),
                    fft.make_output_vec(),
                    fft.make_scratch_vec(),
                    vec![0.0f32; fft_size / 2 + 1],
                )
            },
            |(input, output, scratch, power), frame| {
                let start = frame * hop;
                for ((dst, &src), &w) in input
                    .iter_mut()
                    .zip(&mono[start..start + fft_size])
                    .zip(&window)
                {
                    *dst = src * w;
                }
                fft.process_with_scratch(input, output, scratch)
                    .expect("FFT length mismatch");
                power_spectrum(output, norm, power);
                filterbank
                    .iter()
                    .map(|filter| {
                        let bins = &power[filter.first_bin..filter.first_bin + filter.weights.len()];
                        let energy: f32 = filter
                            .weights
                            .iter()
                            .zip(bins)
                            .map(|(&w, &p)| w * p)
                            .sum();
                        10.0 * energy.max(POWER_EPSILON).log10()
                    })
                    .collect()
            },
        )
        .collect();

    // Transpose frame columns into row-major [mel][frame]
    let mut data = vec![0.0f32; N_MELS * n_frames];
    for (frame, column) in columns.iter().enumerate() {
        for (mel, &value) in column.iter().enumerate() {
            data[mel * n_frames + frame] = value;
        }
    }

    Some(MelSpectrogram {
        n_mels: N_MELS,
        n_frames,
        data,
    })
}

/// Normalized power per frequency bin, `|X|² / win_sum²`
fn power_spectrum(bins: &[Complex<f32>], norm: f32, out: &mut [f32]) {
    for (p, c) in out.iter_mut().zip(bins) {
        *p = (c.re * c.re + c.im * c.im) * norm;
    }
}

fn mix_to_mono(buffer: &SampleBuffer) -> Vec<f32> {
    let channels = buffer.channels();
    if channels.len() == 1 {
        return channels[0].clone();
    }
    let scale = 1.0 / channels.len() as f32;
    let mut mono = vec![0.0f32; buffer.total_samples()];
    for channel in channels {
        for (acc, &sample) in mono.iter_mut().zip(channel) {
            *acc += sample;
        }
    }
    for value in &mut mono {
        *value *= scale;
    }
    mono
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine_buffer(freq: f32, seconds: f32, rate: u32) -> SampleBuffer {
        let n = (seconds * rate as f32) as usize;
        let samples: Vec<f32> = (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / rate as f32).sin() * 0.5)
            .collect();
        SampleBuffer::new(vec![samples], rate).unwrap()
    }

    #[test]
    fn mel_hz_roundtrip() {
        for &hz in &[20.0, 100.0, 440.0, 1_000.0, 8_000.0, 22_050.0] {
            let back = mel_to_hz(hz_to_mel(hz));
            assert!(
                (back - hz).abs() < 1e-6 * hz,
                "roundtrip {} -> {}",
                hz,
                back
            );
        }
    }

    #[test]
    fn too_short_audio_is_unavailable_not_an_error() {
        let params = SpectrogramParams::default();
        let buffer =
            SampleBuffer::new(vec![vec![0.1; params.fft_size - 1]], 44_100).unwrap();
        assert!(compute_mel_spectrogram(&buffer, params).is_none());

        let exact = SampleBuffer::new(vec![vec![0.1; params.fft_size]], 44_100).unwrap();
        let spec = compute_mel_spectrogram(&exact, params).unwrap();
        assert_eq!(spec.n_frames(), 1);
    }

    #[test]
    fn frame_count_follows_hop() {
        let params = SpectrogramParams::default();
        let n = 44_100usize;
        let buffer = SampleBuffer::new(vec![vec![0.0; n]], 44_100).unwrap();
        let spec = compute_mel_spectrogram(&buffer, params).unwrap();
        let expected = (n - params.fft_size) / params.hop() + 1;
        assert_eq!(spec.n_frames(), expected);
        assert_eq!(spec.n_mels(), N_MELS);
        assert_eq!(spec.row(0).len(), expected);
    }

    #[test]
    fn sine_energy_lands_in_expected_mel_band() {
        let rate = 44_100u32;
        let freq = 440.0f32;
        let spec =
            compute_mel_spectrogram(&sine_buffer(freq, 1.0, rate), SpectrogramParams::default())
                .unwrap();

        // Average each band over time, find the loudest
        let mut loudest = 0usize;
        let mut loudest_db = f32::NEG_INFINITY;
        for mel in 0..spec.n_mels() {
            let row = spec.row(mel);
            let mean = row.iter().sum::<f32>() / row.len() as f32;
            if mean > loudest_db {
                loudest_db = mean;
                loudest = mel;
            }
        }

        let (mel_min, mel_max) = full_mel_range(rate);
        let step = (mel_max - mel_min) / (N_MELS + 1) as f64;
        let expected = ((hz_to_mel(freq as f64) - mel_min) / step - 1.0).round() as isize;
        assert!(
            (loudest as isize - expected).abs() <= 2,
            "440 Hz energy in band {}, expected near {}",
            loudest,
            expected
        );
    }

    #[test]
    fn silence_sits_at_the_power_floor() {
        let buffer = SampleBuffer::new(vec![vec![0.0; 8_192]], 44_100).unwrap();
        let spec = compute_mel_spectrogram(&buffer, SpectrogramParams::default()).unwrap();
        let floor_db = 10.0 * POWER_EPSILON.log10();
        for mel in 0..spec.n_mels() {
            for &v in spec.row(mel) {
                assert!((v - floor_db).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn window_coefficients_peak_mid_frame() {
        for kind in [WindowKind::Hann, WindowKind::Hamming, WindowKind::BlackmanHarris] {
            let w = kind.coefficients(1_024);
            assert_eq!(w.len(), 1_024);
            let mid = w[512];
            assert!(mid > 0.99, "{} midpoint {}", kind.name(), mid);
            assert!(w[0] < 0.1, "{} edge {}", kind.name(), w[0]);
        }
    }

    #[test]
    fn filterbank_filters_have_unit_peak_and_cover_range() {
        let filters = mel_filterbank(44_100, 2_048, N_MELS);
        assert_eq!(filters.len(), N_MELS);
        for (i, f) in filters.iter().enumerate() {
            assert!(!f.weights.is_empty(), "filter {} empty", i);
            let peak = f.weights.iter().cloned().fold(0.0f32, f32::max);
            assert!(peak > 0.99 && peak <= 1.0, "filter {} peak {}", i, peak);
            assert!(f.first_bin + f.weights.len() <= 1_025);
        }
    }
}
