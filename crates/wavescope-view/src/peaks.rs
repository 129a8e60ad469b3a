//! Peak generation and caching for waveform display
//!
//! Downsamples audio into one (min, max) pair per horizontal pixel for the
//! current view. Results are cached by the exact `(width, view)` key; a
//! horizontal scroll that keeps the width and view length reuses the
//! overlapping columns and rescans only the fringe that slid into view,
//! which turns a one-pixel scroll on a ten-million-sample file into a
//! few-thousand-sample rescan.

use wavescope_core::{Sample, SampleBuffer, ViewRange};

/// One channel's per-pixel envelope; `mins[i] <= maxs[i]` for every column
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelPeaks {
    pub mins: Vec<Sample>,
    pub maxs: Vec<Sample>,
}

impl ChannelPeaks {
    fn zeroed(width: usize) -> Self {
        Self {
            mins: vec![0.0; width],
            maxs: vec![0.0; width],
        }
    }

    pub fn len(&self) -> usize {
        self.mins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mins.is_empty()
    }
}

/// How the last `get_peaks` call was serviced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeakRefresh {
    /// Exact cache hit, nothing recomputed
    Cached,
    /// Scroll serviced by shifting the previous columns and rescanning the fringe
    Shifted,
    /// Full rescan of the view
    Rebuilt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PeakKey {
    width: usize,
    start: usize,
    end: usize,
}

/// Per-pixel min/max cache for one track's waveform view
#[derive(Debug, Default)]
pub struct PeakCache {
    peaks: Vec<ChannelPeaks>,
    key: Option<PeakKey>,
    last_refresh: Option<PeakRefresh>,
}

impl PeakCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all cached columns (track change, resize, zoom)
    pub fn invalidate(&mut self) {
        self.peaks.clear();
        self.key = None;
    }

    /// How the most recent request was serviced
    pub fn last_refresh(&self) -> Option<PeakRefresh> {
        self.last_refresh
    }

    /// Per-channel peaks for `view` at `width` pixels
    ///
    /// Always returns one entry per channel with exactly `width` columns
    /// (empty for a degenerate view or zero width).
    pub fn get_peaks(
        &mut self,
        buffer: &SampleBuffer,
        view: ViewRange,
        width: usize,
    ) -> &[ChannelPeaks] {
        if width == 0 || view.is_empty() || buffer.is_empty() {
            self.invalidate();
            self.last_refresh = Some(PeakRefresh::Rebuilt);
            return &self.peaks;
        }

        let key = PeakKey {
            width,
            start: view.start,
            end: view.end,
        };
        if self.key == Some(key) && !self.peaks.is_empty() {
            self.last_refresh = Some(PeakRefresh::Cached);
            return &self.peaks;
        }

        if self.try_shift(buffer, key) {
            self.key = Some(key);
            self.last_refresh = Some(PeakRefresh::Shifted);
            return &self.peaks;
        }

        log::trace!(
            "peak rebuild: view {}..{} at {} px",
            view.start,
            view.end,
            width
        );
        self.peaks = buffer
            .channels()
            .iter()
            .map(|ch| peaks_for_bins(ch, view.start, view.len(), width, 0, width))
            .collect();
        self.key = Some(key);
        self.last_refresh = Some(PeakRefresh::Rebuilt);
        &self.peaks
    }

    /// Attempt the incremental scroll path; true on success
    fn try_shift(&mut self, buffer: &SampleBuffer, key: PeakKey) -> bool {
        let old = match self.key {
            Some(old) => old,
            None => return false,
        };
        let view_len = key.end - key.start;
        if self.peaks.is_empty()
            || self.peaks.len() != buffer.num_channels()
            || old.width != key.width
            || old.end - old.start != view_len
            || old.start == key.start
        {
            return false;
        }

        let width = key.width;
        let shift_samples = key.start as i64 - old.start as i64;
        let shift_bins =
            (shift_samples as f64 * width as f64 / view_len as f64).round() as i64;
        if shift_bins == 0 || shift_bins.unsigned_abs() as usize >= width {
            return false;
        }

        for (ch_idx, old_peaks) in self.peaks.iter_mut().enumerate() {
            let data = buffer.channel(ch_idx);
            let mut mins = vec![0.0f32; width];
            let mut maxs = vec![0.0f32; width];
            if shift_bins > 0 {
                // Scrolled right: old columns slide left, fresh fringe at the end
                let shift = shift_bins as usize;
                let keep = width - shift;
                mins[..keep].copy_from_slice(&old_peaks.mins[shift..]);
                maxs[..keep].copy_from_slice(&old_peaks.maxs[shift..]);
                let fringe = peaks_for_bins(data, key.start, view_len, width, keep, width);
                mins[keep..].copy_from_slice(&fringe.mins);
                maxs[keep..].copy_from_slice(&fringe.maxs);
            } else {
                // Scrolled left: old columns slide right, fresh fringe at the front
                let shift = (-shift_bins) as usize;
                let keep = width - shift;
                mins[shift..].copy_from_slice(&old_peaks.mins[..keep]);
                maxs[shift..].copy_from_slice(&old_peaks.maxs[..keep]);
                let fringe = peaks_for_bins(data, key.start, view_len, width, 0, shift);
                mins[..shift].copy_from_slice(&fringe.mins);
                maxs[..shift].copy_from_slice(&fringe.maxs);
            }
            old_peaks.mins = mins;
            old_peaks.maxs = maxs;
        }
        true
    }
}

/// Min/max columns `bin_lo..bin_hi` of a `width`-column view starting at
/// `view_start` over `view_len` samples
///
/// Column `i` covers the run `[i·n/width, (i+1)·n/width)`; using the same
/// global run bounds for fringe columns keeps incremental results identical
/// to a full rebuild. When the view has fewer samples than columns, each
/// column holds at most one sample and empty columns are zero-filled.
fn peaks_for_bins(
    data: &[Sample],
    view_start: usize,
    view_len: usize,
    width: usize,
    bin_lo: usize,
    bin_hi: usize,
) -> ChannelPeaks {
    let n_bins = bin_hi - bin_lo;
    let mut out = ChannelPeaks::zeroed(n_bins);
    if view_len == 0 {
        return out;
    }
    for bin in bin_lo..bin_hi {
        let run_start = view_start + bin * view_len / width;
        let run_end = view_start + (bin + 1) * view_len / width;
        let run_start = run_start.min(data.len());
        let run_end = run_end.min(data.len());
        if run_end <= run_start {
            continue; // zero-filled
        }
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for &sample in &data[run_start..run_end] {
            min = min.min(sample);
            max = max.max(sample);
        }
        out.mins[bin - bin_lo] = min;
        out.maxs[bin - bin_lo] = max;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_buffer(n: usize) -> SampleBuffer {
        let samples: Vec<f32> = (0..n).map(|i| (i as f32 / n as f32) * 2.0 - 1.0).collect();
        SampleBuffer::new(vec![samples], 44_100).unwrap()
    }

    fn noise_buffer(n: usize, channels: usize) -> SampleBuffer {
        // Deterministic pseudo-noise, enough structure to make min != max
        let chans: Vec<Vec<f32>> = (0..channels)
            .map(|c| {
                (0..n)
                    .map(|i| {
                        let x = (i * 2_654_435_761 + c * 97) % 10_007;
                        (x as f32 / 10_007.0) * 2.0 - 1.0
                    })
                    .collect()
            })
            .collect();
        SampleBuffer::new(chans, 44_100).unwrap()
    }

    #[test]
    fn returns_width_columns_with_ordered_pairs() {
        let buffer = noise_buffer(100_000, 2);
        let mut cache = PeakCache::new();
        let peaks = cache.get_peaks(&buffer, ViewRange::new(0, 100_000), 800);
        assert_eq!(peaks.len(), 2);
        for ch in peaks {
            assert_eq!(ch.mins.len(), 800);
            assert_eq!(ch.maxs.len(), 800);
            for (i, (&min, &max)) in ch.mins.iter().zip(&ch.maxs).enumerate() {
                assert!(min <= max, "column {}: {} > {}", i, min, max);
            }
        }
    }

    #[test]
    fn full_file_runs_cover_expected_sample_counts() {
        // 10M samples at 800 px: each run spans 12500 samples
        let n = 10_000_000usize;
        let samples = vec![0.25f32; n];
        let buffer = SampleBuffer::new(vec![samples], 44_100).unwrap();
        let mut cache = PeakCache::new();
        let peaks = cache.get_peaks(&buffer, ViewRange::new(0, n), 800);
        assert_eq!(peaks[0].len(), 800);
        assert_eq!(n / 800, 12_500);
        for &v in &peaks[0].maxs {
            assert_eq!(v, 0.25);
        }
    }

    #[test]
    fn sparse_view_zero_fills_empty_columns() {
        let buffer = ramp_buffer(1_000);
        let mut cache = PeakCache::new();
        // 50 samples across 200 px: three quarters of the columns are empty
        let peaks = cache.get_peaks(&buffer, ViewRange::new(100, 150), 200);
        assert_eq!(peaks[0].len(), 200);
        for (&min, &max) in peaks[0].mins.iter().zip(&peaks[0].maxs) {
            assert!(min <= max);
        }
        let nonzero = peaks[0].maxs.iter().filter(|&&v| v != 0.0).count();
        assert!(nonzero >= 49 && nonzero <= 51, "nonzero columns: {}", nonzero);
    }

    #[test]
    fn exact_repeat_request_hits_cache() {
        let buffer = noise_buffer(50_000, 1);
        let mut cache = PeakCache::new();
        cache.get_peaks(&buffer, ViewRange::new(0, 40_000), 400);
        assert_eq!(cache.last_refresh(), Some(PeakRefresh::Rebuilt));
        cache.get_peaks(&buffer, ViewRange::new(0, 40_000), 400);
        assert_eq!(cache.last_refresh(), Some(PeakRefresh::Cached));
    }

    #[test]
    fn one_pixel_scroll_takes_the_shift_path() {
        let buffer = noise_buffer(200_000, 2);
        let width = 500usize;
        let view_len = 100_000usize;
        let per_pixel = view_len / width;
        let mut cache = PeakCache::new();
        cache.get_peaks(&buffer, ViewRange::new(10_000, 10_000 + view_len), width);

        let scrolled = ViewRange::new(10_000 + per_pixel, 10_000 + per_pixel + view_len);
        cache.get_peaks(&buffer, scrolled, width);
        assert_eq!(cache.last_refresh(), Some(PeakRefresh::Shifted));
    }

    #[test]
    fn shifted_result_equals_full_rebuild() {
        let buffer = noise_buffer(300_000, 2);
        let width = 640usize;
        let view_len = 128_000usize; // divisible by width: exact bin alignment
        let start = 20_000usize;
        let per_pixel = view_len / width;

        for &scroll_bins in &[1usize, 3, 17, 200] {
            let mut incremental = PeakCache::new();
            incremental.get_peaks(&buffer, ViewRange::new(start, start + view_len), width);
            let scrolled = ViewRange::new(
                start + scroll_bins * per_pixel,
                start + scroll_bins * per_pixel + view_len,
            );
            let shifted = incremental.get_peaks(&buffer, scrolled, width).to_vec();
            assert_eq!(incremental.last_refresh(), Some(PeakRefresh::Shifted));

            let mut fresh = PeakCache::new();
            let rebuilt = fresh.get_peaks(&buffer, scrolled, width);
            assert_eq!(shifted, rebuilt, "scroll of {} bins diverged", scroll_bins);
        }
    }

    #[test]
    fn backwards_scroll_also_shifts_coherently() {
        let buffer = noise_buffer(300_000, 1);
        let width = 640usize;
        let view_len = 128_000usize;
        let per_pixel = view_len / width;
        let start = 100_000usize;

        let mut incremental = PeakCache::new();
        incremental.get_peaks(&buffer, ViewRange::new(start, start + view_len), width);
        let scrolled = ViewRange::new(start - 5 * per_pixel, start - 5 * per_pixel + view_len);
        let shifted = incremental.get_peaks(&buffer, scrolled, width).to_vec();
        assert_eq!(incremental.last_refresh(), Some(PeakRefresh::Shifted));

        let mut fresh = PeakCache::new();
        assert_eq!(shifted, fresh.get_peaks(&buffer, scrolled, width));
    }

    #[test]
    fn zoom_change_forces_rebuild() {
        let buffer = noise_buffer(100_000, 1);
        let mut cache = PeakCache::new();
        cache.get_peaks(&buffer, ViewRange::new(0, 80_000), 400);
        cache.get_peaks(&buffer, ViewRange::new(0, 40_000), 400);
        assert_eq!(cache.last_refresh(), Some(PeakRefresh::Rebuilt));
    }

    #[test]
    fn whole_view_scroll_forces_rebuild() {
        let buffer = noise_buffer(400_000, 1);
        let mut cache = PeakCache::new();
        cache.get_peaks(&buffer, ViewRange::new(0, 100_000), 200);
        // No overlap left to reuse
        cache.get_peaks(&buffer, ViewRange::new(200_000, 300_000), 200);
        assert_eq!(cache.last_refresh(), Some(PeakRefresh::Rebuilt));
    }
}
