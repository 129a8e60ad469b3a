//! Spectrogram colormaps
//!
//! Named 256-entry RGBA lookup tables, built once at first use from
//! control-point lists via per-channel linear interpolation and shared
//! read-only across threads after that. Alpha is fully opaque.

use once_cell::sync::Lazy;

/// Default colormap applied until the caller picks another
pub const DEFAULT_COLORMAP: &str = "magma";

/// A 256-entry RGBA lookup table mapping normalized intensity to color
#[derive(Debug, Clone)]
pub struct ColormapTable {
    name: &'static str,
    lut: [[u8; 4]; 256],
}

impl ColormapTable {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// RGBA entry for a LUT index
    #[inline]
    pub fn color(&self, index: u8) -> [u8; 4] {
        self.lut[index as usize]
    }

    pub fn entries(&self) -> &[[u8; 4]; 256] {
        &self.lut
    }
}

/// Build a LUT from (position, rgb) control points
///
/// Positions span [0, 1] in ascending order; each color channel is
/// interpolated linearly between neighboring points.
fn build_lut(name: &'static str, controls: &[(f64, [u8; 3])]) -> ColormapTable {
    let mut lut = [[0u8, 0, 0, 255]; 256];
    for (idx, entry) in lut.iter_mut().enumerate() {
        let pos = idx as f64 / 255.0;
        let seg_end = controls
            .iter()
            .position(|&(p, _)| p >= pos)
            .unwrap_or(controls.len() - 1);
        let (p1, c1) = controls[seg_end];
        let (p0, c0) = controls[seg_end.saturating_sub(1)];
        let t = if p1 > p0 {
            ((pos - p0) / (p1 - p0)).clamp(0.0, 1.0)
        } else {
            0.0
        };
        for ch in 0..3 {
            let value = c0[ch] as f64 + (c1[ch] as f64 - c0[ch] as f64) * t;
            entry[ch] = value.round().clamp(0.0, 255.0) as u8;
        }
    }
    ColormapTable { name, lut }
}

static COLORMAPS: Lazy<Vec<ColormapTable>> = Lazy::new(|| {
    vec![
        build_lut(
            "magma",
            &[
                (0.0, [0, 0, 4]),
                (0.25, [81, 18, 124]),
                (0.5, [183, 55, 121]),
                (0.75, [254, 159, 109]),
                (1.0, [252, 253, 191]),
            ],
        ),
        build_lut(
            "viridis",
            &[
                (0.0, [68, 1, 84]),
                (0.25, [59, 82, 139]),
                (0.5, [33, 145, 140]),
                (0.75, [94, 201, 98]),
                (1.0, [253, 231, 37]),
            ],
        ),
        build_lut("grayscale", &[(0.0, [0, 0, 0]), (1.0, [255, 255, 255])]),
    ]
});

/// Look up a colormap by name
pub fn colormap(name: &str) -> Option<&'static ColormapTable> {
    COLORMAPS.iter().find(|c| c.name == name)
}

/// The registered colormap names, in menu order
pub fn colormap_names() -> impl Iterator<Item = &'static str> {
    COLORMAPS.iter().map(|c| c.name)
}
