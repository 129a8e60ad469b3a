//! Spectrogram rasterization
//!
//! Maps the visible sub-rectangle of the mel spectrogram (time view ×
//! frequency view) through dB normalization and a colormap into a
//! viewport-sized RGBA image. The raster is cached by the exact parameter
//! tuple that produced it; scrolling or zooming that leaves every parameter
//! unchanged reuses the cached image verbatim, and any change rebuilds it.

use image::imageops::{self, FilterType};
use image::RgbaImage;
use wavescope_core::{full_mel_range, MelSpectrogram, ViewRange};

use crate::colormap::{colormap, ColormapTable, DEFAULT_COLORMAP};
use crate::view::FreqView;

/// Normalization divisor never drops below 1 dB to avoid blowing up a
/// degenerate floor/ceiling configuration
const MIN_DB_RANGE: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
struct ImageKey {
    view_start: usize,
    view_end: usize,
    width: u32,
    height: u32,
    colormap: &'static str,
    mel_min: f64,
    mel_max: f64,
    db_floor: f64,
    db_ceil: f64,
}

/// Cached viewport raster of the mel spectrogram
#[derive(Debug, Default)]
pub struct SpectrogramImageCache {
    image: Option<RgbaImage>,
    key: Option<ImageKey>,
}

impl SpectrogramImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the cached raster (new spectrogram data, track change)
    pub fn invalidate(&mut self) {
        self.image = None;
        self.key = None;
    }

    /// The raster for the given view and display parameters
    ///
    /// `view` is in sample indices of the underlying buffer; it is mapped
    /// proportionally onto the spectrogram's frame axis. Returns `None` for
    /// a degenerate viewport.
    #[allow(clippy::too_many_arguments)]
    pub fn image(
        &mut self,
        spectrogram: &MelSpectrogram,
        total_samples: usize,
        sample_rate: u32,
        view: ViewRange,
        freq_view: FreqView,
        width: u32,
        height: u32,
        colormap_name: &str,
        db_floor: f64,
        db_ceil: f64,
    ) -> Option<&RgbaImage> {
        if width == 0 || height == 0 || total_samples == 0 {
            self.invalidate();
            return None;
        }
        let table = colormap(colormap_name)
            .or_else(|| colormap(DEFAULT_COLORMAP))
            .expect("default colormap is always registered");
        let key = ImageKey {
            view_start: view.start,
            view_end: view.end,
            width,
            height,
            colormap: table.name(),
            mel_min: freq_view.mel_min,
            mel_max: freq_view.mel_max,
            db_floor,
            db_ceil,
        };
        let hit = self.image.is_some() && self.key.as_ref() == Some(&key);
        if !hit {
            self.image = build_image(
                spectrogram,
                total_samples,
                sample_rate,
                &key,
                freq_view,
                table,
            );
            self.key = Some(key);
        }
        self.image.as_ref()
    }
}

/// Render the visible slice of the spectrogram to an RGBA raster
fn build_image(
    spec: &MelSpectrogram,
    total_samples: usize,
    sample_rate: u32,
    key: &ImageKey,
    freq_view: FreqView,
    table: &ColormapTable,
) -> Option<RgbaImage> {
    let n_mels = spec.n_mels();
    let n_frames = spec.n_frames();

    // Time view → frame columns, at least one
    let frame_start = (key.view_start * n_frames / total_samples).min(n_frames - 1);
    let mut frame_end = (key.view_end * n_frames / total_samples).min(n_frames);
    if frame_end <= frame_start {
        frame_end = frame_start + 1;
    }

    // Frequency view → mel rows, against the full displayable range
    let (full_min, full_max) = full_mel_range(sample_rate);
    let full_range = full_max - full_min;
    if full_range <= 0.0 {
        return None;
    }
    let row_lo = ((freq_view.mel_min - full_min) / full_range * (n_mels - 1) as f64) as isize;
    let row_hi = ((freq_view.mel_max - full_min) / full_range * (n_mels - 1) as f64).ceil() as isize;
    let row_lo = row_lo.clamp(0, n_mels as isize - 1) as usize;
    let row_hi = ((row_hi + 1).clamp(row_lo as isize + 1, n_mels as isize)) as usize;

    let native_w = frame_end - frame_start;
    let native_h = row_hi - row_lo;
    let db_range = (key.db_ceil - key.db_floor).max(MIN_DB_RANGE);

    let mut native = RgbaImage::new(native_w as u32, native_h as u32);
    for (y, row) in (row_lo..row_hi).rev().enumerate() {
        // Top image row is the highest visible mel band
        let values = &spec.row(row)[frame_start..frame_end];
        for (x, &db) in values.iter().enumerate() {
            let norm = ((db as f64 - key.db_floor) / db_range).clamp(0.0, 1.0);
            let index = (norm * 255.0) as u8;
            native.put_pixel(x as u32, y as u32, image::Rgba(table.color(index)));
        }
    }

    if native_w as u32 == key.width && native_h as u32 == key.height {
        Some(native)
    } else {
        Some(imageops::resize(
            &native,
            key.width,
            key.height,
            FilterType::Triangle,
        ))
    }
}
