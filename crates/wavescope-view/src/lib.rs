//! Wavescope View - caches and display state for audio visualization
//!
//! The view-side half of the wavescope engine: per-pixel peak caches with
//! incremental scroll updates, the zoom/scroll view model and its coordinate
//! transforms, the colormap registry, the spectrogram raster cache, and the
//! `TrackVisualizer` facade the rendering layer drives.
//!
//! All types here are written from the interactive thread only; background
//! results arrive as immutable bundles through `TrackVisualizer::poll_events`.

pub mod colormap;
pub mod peaks;
pub mod spec_image;
pub mod track;
pub mod view;

pub use colormap::{colormap, colormap_names, ColormapTable, DEFAULT_COLORMAP};
pub use peaks::{ChannelPeaks, PeakCache, PeakRefresh};
pub use spec_image::SpectrogramImageCache;
pub use track::{TrackEvent, TrackVisualizer};
pub use view::{FreqView, ViewModel, MIN_MEL_SPAN};
