//! Windowed RMS analysis
//!
//! Builds per-channel cumulative sums of squared samples once per buffer and
//! derives everything else from them: pixel-resolution RMS envelopes for the
//! current view, the whole-file maximum-RMS marker, and the peak-sample
//! marker. The cumulative sum makes any windowed mean square an O(1) lookup
//! (`(cs[k+w] - cs[k]) / w`), so changing the window length never requires
//! another pass over the raw samples.
//!
//! Envelope downsampling is max-hold: each pixel reports the loudest window
//! that starts inside its sample range, so short transients stay visible at
//! any zoom level. Cross-channel combination happens in the power domain
//! (mean of mean squares, then one square root).

use std::sync::Arc;

use rayon::prelude::*;

use crate::types::{amplitude_to_db, PeakMarker, RmsMaxMarker, SampleBuffer, ViewRange};

/// A derived value behind an explicit dirty flag
///
/// `Dirty` after any mutation that invalidates the value; `Ready` only once
/// the accessor has evaluated it.
#[derive(Debug, Clone)]
enum Lazy<T> {
    Dirty,
    Ready(T),
}

impl<T> Lazy<T> {
    fn is_dirty(&self) -> bool {
        matches!(self, Lazy::Dirty)
    }
}

/// Per-pixel RMS envelopes for one view
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RmsEnvelope {
    /// One array per channel, `width` values each
    pub per_channel: Vec<Vec<f32>>,
    /// Cross-channel envelope (power-domain mean of the channels)
    pub combined: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EnvelopeKey {
    width: usize,
    start: usize,
    end: usize,
    window: usize,
}

/// Build one channel's cumulative sum of squared samples
///
/// Returns `n + 1` values with `cs[0] = 0`, accumulated in f64 so that
/// differences of nearby entries stay accurate on long files.
pub fn cumulative_sum(channel: &[f32]) -> Vec<f64> {
    let mut cs = Vec::with_capacity(channel.len() + 1);
    let mut acc = 0.0f64;
    cs.push(0.0);
    for &sample in channel {
        acc += sample as f64 * sample as f64;
        cs.push(acc);
    }
    cs
}

/// Build cumulative sums for every channel of a buffer
pub fn cumulative_sums(buffer: &SampleBuffer) -> Vec<Vec<f64>> {
    buffer
        .channels()
        .par_iter()
        .map(|ch| cumulative_sum(ch))
        .collect()
}

/// Locate the single loudest sample across all channels
///
/// Ties resolve to the earliest sample, then the lowest channel.
pub fn find_peak(buffer: &SampleBuffer) -> Option<PeakMarker> {
    if buffer.is_empty() {
        return None;
    }
    let mut best: Option<(f32, usize, usize)> = None; // (|amp|, sample, channel)
    for (ch_idx, channel) in buffer.channels().iter().enumerate() {
        let mut ch_best = 0usize;
        let mut ch_amp = 0.0f32;
        for (idx, &sample) in channel.iter().enumerate() {
            let a = sample.abs();
            if a > ch_amp {
                ch_amp = a;
                ch_best = idx;
            }
        }
        let better = match best {
            None => true,
            Some((amp, sample, _)) => ch_amp > amp || (ch_amp == amp && ch_best < sample),
        };
        if better {
            best = Some((ch_amp, ch_best, ch_idx));
        }
    }
    let (_, sample, channel) = best?;
    let amplitude = buffer.channel(channel)[sample];
    Some(PeakMarker {
        sample,
        channel,
        amplitude,
        db: amplitude_to_db(amplitude.abs() as f64),
    })
}

/// Locate the window with the highest mean square, averaged across channels
///
/// Scans the entire buffer regardless of any view. Channels shorter than the
/// window degenerate to a single zero-valued window.
pub fn find_rms_max(
    buffer: &SampleBuffer,
    cumsums: &[Vec<f64>],
    window: usize,
) -> Option<RmsMaxMarker> {
    if window == 0 || buffer.is_empty() || cumsums.len() != buffer.num_channels() {
        return None;
    }
    let n = buffer.total_samples();
    if n <= window {
        // Degenerate: one zero window centered at window/2
        return Some(RmsMaxMarker {
            sample: window / 2,
            db: f64::NEG_INFINITY,
            amplitude: 0.0,
        });
    }
    let wm_len = n - window + 1;
    let nch = cumsums.len() as f64;
    let mut max_value = f64::NEG_INFINITY;
    let mut max_idx = 0usize;
    for k in 0..wm_len {
        let mut acc = 0.0f64;
        for cs in cumsums {
            acc += (cs[k + window] - cs[k]) / window as f64;
        }
        let combined = acc / nch;
        if combined > max_value {
            max_value = combined;
            max_idx = k;
        }
    }
    let rms = max_value.max(0.0).sqrt();
    Some(RmsMaxMarker {
        sample: max_idx + window / 2,
        db: amplitude_to_db(rms),
        amplitude: rms,
    })
}

/// RMS computation state for the currently loaded buffer
///
/// The cumulative sums arrive either from the background worker (preferred)
/// or are built on first use. Both markers sit behind dirty flags: set on
/// load, and for the RMS marker also on every window-length change.
#[derive(Debug)]
pub struct RmsEngine {
    buffer: Option<Arc<SampleBuffer>>,
    cumsums: Vec<Vec<f64>>,
    window: usize,
    peak: Lazy<Option<PeakMarker>>,
    rms_max: Lazy<Option<RmsMaxMarker>>,
    envelope: Option<(EnvelopeKey, RmsEnvelope)>,
}

impl Default for RmsEngine {
    fn default() -> Self {
        Self {
            buffer: None,
            cumsums: Vec::new(),
            window: 0,
            peak: Lazy::Ready(None),
            rms_max: Lazy::Ready(None),
            envelope: None,
        }
    }
}

impl RmsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a freshly loaded buffer; all derived values become dirty
    pub fn set_buffer(&mut self, buffer: Option<Arc<SampleBuffer>>) {
        let loaded = buffer.is_some();
        self.buffer = buffer;
        self.cumsums = Vec::new();
        self.envelope = None;
        if loaded {
            self.peak = Lazy::Dirty;
            self.rms_max = Lazy::Dirty;
        } else {
            self.peak = Lazy::Ready(None);
            self.rms_max = Lazy::Ready(None);
        }
    }

    /// Install precomputed results from a background load
    ///
    /// `window` is the RMS window the marker was computed with; when it no
    /// longer matches the engine's current window the marker stays dirty and
    /// is recomputed from the installed cumulative sums on next access.
    pub fn install_precomputed(
        &mut self,
        cumsums: Vec<Vec<f64>>,
        peak: Option<PeakMarker>,
        rms_max: Option<RmsMaxMarker>,
        window: usize,
    ) {
        self.cumsums = cumsums;
        self.envelope = None;
        self.peak = Lazy::Ready(peak);
        if window == self.window {
            self.rms_max = Lazy::Ready(rms_max);
        } else {
            self.rms_max = Lazy::Dirty;
        }
    }

    /// Change the RMS window length
    ///
    /// Cumulative sums survive; the envelope cache and the RMS-max marker do
    /// not. The peak marker is window-independent and stays valid.
    pub fn set_window(&mut self, samples: usize) {
        if samples == self.window {
            return;
        }
        self.window = samples;
        self.envelope = None;
        self.rms_max = if self.buffer.is_some() && samples > 0 {
            Lazy::Dirty
        } else {
            Lazy::Ready(None)
        };
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// The loudest-sample marker, computed on first access after a load
    pub fn peak_marker(&mut self) -> Option<PeakMarker> {
        if self.peak.is_dirty() {
            let marker = self.buffer.as_deref().and_then(find_peak);
            self.peak = Lazy::Ready(marker);
        }
        match self.peak {
            Lazy::Ready(marker) => marker,
            Lazy::Dirty => None,
        }
    }

    /// The loudest-window marker, recomputed after load or window change
    pub fn rms_max_marker(&mut self) -> Option<RmsMaxMarker> {
        if self.rms_max.is_dirty() {
            self.ensure_cumsums();
            let marker = self
                .buffer
                .as_deref()
                .and_then(|buf| find_rms_max(buf, &self.cumsums, self.window));
            self.rms_max = Lazy::Ready(marker);
        }
        match self.rms_max {
            Lazy::Ready(marker) => marker,
            Lazy::Dirty => None,
        }
    }

    /// Per-pixel RMS envelopes for a view, cached by (width, view, window)
    pub fn envelope(&mut self, view: ViewRange, width: usize) -> &RmsEnvelope {
        let key = EnvelopeKey {
            width,
            start: view.start,
            end: view.end,
            window: self.window,
        };
        let hit = matches!(&self.envelope, Some((cached, _)) if *cached == key);
        if !hit {
            self.ensure_cumsums();
            let env = self.compute_envelope(view, width);
            self.envelope = Some((key, env));
        }
        match &self.envelope {
            Some((_, env)) => env,
            None => unreachable!("envelope cache populated above"),
        }
    }

    fn ensure_cumsums(&mut self) {
        if self.cumsums.is_empty() {
            if let Some(buffer) = &self.buffer {
                self.cumsums = cumulative_sums(buffer);
            }
        }
    }

    fn compute_envelope(&self, view: ViewRange, width: usize) -> RmsEnvelope {
        let window = self.window;
        let buffer = match &self.buffer {
            Some(b) => b,
            None => return RmsEnvelope::default(),
        };
        let view_len = view.len();
        if width == 0 || view_len == 0 || window == 0 || buffer.is_empty() {
            return RmsEnvelope::default();
        }
        let n = buffer.total_samples();
        if n <= window {
            // Degenerate single-point envelope, stretched flat across the view
            let zeros = vec![0.0f32; width];
            return RmsEnvelope {
                per_channel: vec![zeros.clone(); buffer.num_channels()],
                combined: zeros,
            };
        }
        let wm_len = n - window + 1;
        let half = window / 2;
        let nch = self.cumsums.len();

        // Window-start index range for pixel i, clamped into [0, wm_len).
        // The half-window offset centers each window on the pixel it covers.
        let pixel_range = |i: usize| -> (usize, usize) {
            let s_lo = view.start + i * view_len / width;
            let s_hi = view.start + (i + 1) * view_len / width;
            let lo = s_lo.saturating_sub(half).min(wm_len - 1);
            let hi = s_hi.saturating_sub(half).clamp(lo + 1, wm_len);
            (lo, hi)
        };

        let per_channel: Vec<Vec<f32>> = self
            .cumsums
            .iter()
            .map(|cs| {
                (0..width)
                    .map(|i| {
                        let (lo, hi) = pixel_range(i);
                        let mut max_ms = f64::NEG_INFINITY;
                        for k in lo..hi {
                            let ms = (cs[k + window] - cs[k]) / window as f64;
                            if ms > max_ms {
                                max_ms = ms;
                            }
                        }
                        max_ms.max(0.0).sqrt() as f32
                    })
                    .collect()
            })
            .collect();

        let combined: Vec<f32> = (0..width)
            .map(|i| {
                let (lo, hi) = pixel_range(i);
                let mut max_ms = f64::NEG_INFINITY;
                for k in lo..hi {
                    let mut acc = 0.0f64;
                    for cs in &self.cumsums {
                        acc += (cs[k + window] - cs[k]) / window as f64;
                    }
                    let ms = acc / nch as f64;
                    if ms > max_ms {
                        max_ms = ms;
                    }
                }
                max_ms.max(0.0).sqrt() as f32
            })
            .collect();

        RmsEnvelope {
            per_channel,
            combined,
        }
    }
}
