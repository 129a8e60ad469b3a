//! Display state and coordinate mapping
//!
//! The `ViewModel` owns all mutable view state: the visible sample window,
//! the vertical amplitude scale, and the visible mel-frequency sub-range.
//! Every operation clamps its result so the view is never empty, inverted,
//! or outside the loaded file. The coordinate transforms are pure functions
//! of the current state and a viewport size; the rendering layer calls them
//! freely on every paint.

use wavescope_core::{
    full_mel_range, ViewRange, MAX_VERTICAL_SCALE, MIN_VERTICAL_SCALE, MIN_VIEW_SAMPLES,
};

/// Minimum visible mel span; frequency zoom never goes tighter than this
pub const MIN_MEL_SPAN: f64 = 50.0;

/// Visible sub-range of the displayable mel scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FreqView {
    pub mel_min: f64,
    pub mel_max: f64,
}

impl FreqView {
    pub fn span(&self) -> f64 {
        self.mel_max - self.mel_min
    }
}

/// Mutable view state for one loaded track
#[derive(Debug, Clone)]
pub struct ViewModel {
    total_samples: usize,
    sample_rate: u32,
    view: ViewRange,
    vertical_scale: f32,
    freq_view: FreqView,
}

impl Default for ViewModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewModel {
    pub fn new() -> Self {
        let (mel_min, mel_max) = full_mel_range(44_100);
        Self {
            total_samples: 0,
            sample_rate: 44_100,
            view: ViewRange::new(0, 0),
            vertical_scale: 1.0,
            freq_view: FreqView { mel_min, mel_max },
        }
    }

    /// Reset for a newly loaded track: full time view, full frequency range
    pub fn reset(&mut self, total_samples: usize, sample_rate: u32) {
        self.total_samples = total_samples;
        self.sample_rate = sample_rate;
        self.view = ViewRange::full(total_samples);
        self.vertical_scale = 1.0;
        self.reset_freq_view();
    }

    pub fn view_range(&self) -> ViewRange {
        self.view
    }

    pub fn vertical_scale(&self) -> f32 {
        self.vertical_scale
    }

    pub fn freq_view(&self) -> FreqView {
        self.freq_view
    }

    pub fn total_samples(&self) -> usize {
        self.total_samples
    }

    // ── Time-axis operations ────────────────────────────────────────────

    /// Halve the visible range, centered on the view midpoint
    pub fn zoom_in(&mut self) {
        let len = self.view.len();
        if len <= MIN_VIEW_SAMPLES {
            return;
        }
        let center = self.view.start + len / 2;
        self.apply_zoom(center, (len / 2).max(MIN_VIEW_SAMPLES));
    }

    /// Double the visible range, centered on the view midpoint
    pub fn zoom_out(&mut self) {
        let len = self.view.len();
        if len >= self.total_samples {
            return;
        }
        let center = self.view.start + len / 2;
        self.apply_zoom(center, (len * 2).min(self.total_samples));
    }

    /// Show the entire file and the full frequency range
    pub fn zoom_fit(&mut self) {
        self.view = ViewRange::full(self.total_samples);
        self.vertical_scale = 1.0;
        self.reset_freq_view();
    }

    /// Shift the view by a signed sample delta, clamped to the file edges
    pub fn scroll(&mut self, delta: i64) {
        let len = self.view.len();
        if len == 0 || self.total_samples == 0 {
            return;
        }
        let max_start = self.total_samples - len;
        let new_start = (self.view.start as i64 + delta).clamp(0, max_start as i64) as usize;
        self.view = ViewRange::new(new_start, new_start + len);
    }

    fn apply_zoom(&mut self, center: usize, new_len: usize) {
        let new_len = new_len.clamp(MIN_VIEW_SAMPLES.min(self.total_samples), self.total_samples);
        let half = new_len / 2;
        let mut start = center.saturating_sub(half);
        if start + new_len > self.total_samples {
            start = self.total_samples - new_len;
        }
        self.view = ViewRange::new(start, start + new_len);
    }

    // ── Vertical amplitude scale ────────────────────────────────────────

    pub fn set_vertical_scale(&mut self, scale: f32) {
        self.vertical_scale = scale.clamp(MIN_VERTICAL_SCALE, MAX_VERTICAL_SCALE);
    }

    pub fn scale_up(&mut self) {
        self.set_vertical_scale(self.vertical_scale * 1.5);
    }

    pub fn scale_down(&mut self) {
        self.set_vertical_scale(self.vertical_scale / 1.5);
    }

    // ── Frequency-axis operations ───────────────────────────────────────

    /// Zoom the mel range by `factor` (< 1 zooms in) around `anchor_mel`
    ///
    /// Without an anchor the view center is used. The anchor keeps its
    /// fractional position inside the view, the way wheel zoom keeps the
    /// frequency under the cursor fixed.
    pub fn freq_zoom(&mut self, factor: f64, anchor_mel: Option<f64>) {
        let (full_min, full_max) = full_mel_range(self.sample_rate);
        let span = self.freq_view.span();
        let (anchor, frac) = match anchor_mel {
            Some(mel) if span > 0.0 => {
                let anchor = mel.clamp(self.freq_view.mel_min, self.freq_view.mel_max);
                (anchor, (anchor - self.freq_view.mel_min) / span)
            }
            _ => ((self.freq_view.mel_min + self.freq_view.mel_max) / 2.0, 0.5),
        };
        let new_span = (span * factor).clamp(MIN_MEL_SPAN, full_max - full_min);
        let mut new_min = anchor - frac * new_span;
        let mut new_max = anchor + (1.0 - frac) * new_span;
        if new_min < full_min {
            new_min = full_min;
            new_max = new_min + new_span;
        }
        if new_max > full_max {
            new_max = full_max;
            new_min = new_max - new_span;
        }
        self.freq_view = FreqView {
            mel_min: new_min.max(full_min),
            mel_max: new_max.min(full_max),
        };
    }

    /// Pan the frequency view by a signed mel delta, clamped to the full range
    pub fn scroll_freq(&mut self, delta_mel: f64) {
        let (full_min, full_max) = full_mel_range(self.sample_rate);
        let span = self.freq_view.span();
        let mut new_min = self.freq_view.mel_min + delta_mel;
        let mut new_max = self.freq_view.mel_max + delta_mel;
        if new_min < full_min {
            new_min = full_min;
            new_max = new_min + span;
        }
        if new_max > full_max {
            new_max = full_max;
            new_min = new_max - span;
        }
        self.freq_view = FreqView {
            mel_min: new_min.max(full_min),
            mel_max: new_max.min(full_max),
        };
    }

    fn reset_freq_view(&mut self) {
        let (mel_min, mel_max) = full_mel_range(self.sample_rate);
        self.freq_view = FreqView { mel_min, mel_max };
    }

    // ── Coordinate transforms (pure, no side effects) ───────────────────

    /// Horizontal pixel position of a sample index in a `width`-pixel viewport
    pub fn sample_to_pixel(&self, sample: usize, width: usize) -> f64 {
        let len = self.view.len();
        if len == 0 {
            return 0.0;
        }
        (sample as f64 - self.view.start as f64) / len as f64 * width as f64
    }

    /// Sample index under a horizontal pixel position, clamped into the file
    pub fn pixel_to_sample(&self, x: f64, width: usize) -> usize {
        let len = self.view.len();
        if width == 0 || len == 0 {
            return 0;
        }
        let sample = self.view.start as f64 + x / width as f64 * len as f64;
        let last = self.total_samples.saturating_sub(1);
        (sample.max(0.0) as usize).min(last)
    }

    /// Vertical pixel position of a mel value; low frequencies at the bottom
    pub fn mel_to_pixel(&self, mel: f64, height: usize) -> f64 {
        let span = self.freq_view.span();
        if span <= 0.0 {
            return 0.0;
        }
        let frac = (mel - self.freq_view.mel_min) / span;
        height as f64 * (1.0 - frac)
    }

    /// Mel value under a vertical pixel position, clamped into the view
    pub fn pixel_to_mel(&self, y: f64, height: usize) -> f64 {
        if height == 0 {
            return self.freq_view.mel_min;
        }
        let frac = (1.0 - y / height as f64).clamp(0.0, 1.0);
        self.freq_view.mel_min + frac * self.freq_view.span()
    }
}
