//! Wavescope Core - compute engines for interactive audio visualization
//!
//! Pure in-process analysis of already-decoded sample buffers: peak and
//! windowed-RMS statistics, full-file mel spectrograms, and the background
//! worker that keeps all of it off the interactive thread. View-side caches
//! and display state live in the `wavescope-view` crate.

pub mod mel;
pub mod rms;
pub mod types;
pub mod worker;

pub use mel::{
    compute_mel_spectrogram, full_mel_range, hz_to_mel, mel_to_hz, MelSpectrogram,
    SpectrogramParams, WindowKind, DEFAULT_FFT_SIZE, FFT_SIZES, F_MAX_HZ, F_MIN_HZ, N_MELS,
};
pub use rms::{cumulative_sum, cumulative_sums, find_peak, find_rms_max, RmsEngine, RmsEnvelope};
pub use types::{
    amplitude_to_db, BufferError, PeakMarker, RmsMaxMarker, Sample, SampleBuffer, ViewRange,
    MAX_VERTICAL_SCALE, MIN_VERTICAL_SCALE, MIN_VIEW_SAMPLES,
};
pub use worker::{CancelToken, ComputeWorker, LoadBundle, WorkerResult};
