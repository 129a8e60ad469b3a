//! Track visualization facade
//!
//! `TrackVisualizer` owns the full visualization state for one loaded track:
//! the sample buffer, view model, peak cache, RMS engine, mel spectrogram and
//! its raster cache, plus the background worker. The rendering layer talks
//! only to this type: setters for load and display parameters, pull-based
//! getters on every redraw, and `poll_events` on every tick to install
//! completed background work.
//!
//! All caches are written exclusively from the interactive thread. The
//! worker hands back immutable bundles tagged with the load generation they
//! were computed for; bundles for a superseded generation are discarded, so
//! switching tracks mid-computation can never install stale data.

use std::sync::Arc;

use image::RgbaImage;
use wavescope_core::{
    BufferError, ComputeWorker, MelSpectrogram, PeakMarker, RmsEngine, RmsEnvelope, RmsMaxMarker,
    Sample, SampleBuffer, SpectrogramParams, WindowKind, WorkerResult,
};

use crate::colormap::{colormap, DEFAULT_COLORMAP};
use crate::peaks::{ChannelPeaks, PeakCache};
use crate::spec_image::SpectrogramImageCache;
use crate::view::ViewModel;

/// Completed background work, surfaced to the owner once per tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackEvent {
    /// Full-load analysis installed (markers, cumulative sums, spectrogram)
    LoadComplete,
    /// A spectrogram recompute finished and the raster cache was reset
    SpectrogramReady,
}

/// Visualization engine for one track at a time
pub struct TrackVisualizer {
    buffer: Option<Arc<SampleBuffer>>,
    generation: u64,
    view: ViewModel,
    peaks: PeakCache,
    rms: RmsEngine,
    spectrogram: Option<MelSpectrogram>,
    spec_params: SpectrogramParams,
    rms_window: usize,
    colormap_name: String,
    db_floor: f64,
    db_ceil: f64,
    spec_image: SpectrogramImageCache,
    worker: ComputeWorker,
}

impl Default for TrackVisualizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackVisualizer {
    /// Create the visualizer and spawn its compute worker
    pub fn new() -> Self {
        Self {
            buffer: None,
            generation: 0,
            view: ViewModel::new(),
            peaks: PeakCache::new(),
            rms: RmsEngine::new(),
            spectrogram: None,
            spec_params: SpectrogramParams::default(),
            rms_window: 0,
            colormap_name: DEFAULT_COLORMAP.to_string(),
            db_floor: -80.0,
            db_ceil: 0.0,
            spec_image: SpectrogramImageCache::new(),
            worker: ComputeWorker::spawn(),
        }
    }

    // ── Loading ─────────────────────────────────────────────────────────

    /// Load a new track from per-channel sample data
    ///
    /// Validates the buffer, resets all view state and caches, and kicks
    /// off the background analysis. Markers remain available immediately
    /// through their lazy accessors; the worker's bundle replaces the lazy
    /// path once it arrives.
    pub fn load(&mut self, channels: Vec<Vec<Sample>>, sample_rate: u32) -> Result<(), BufferError> {
        let buffer = Arc::new(SampleBuffer::new(channels, sample_rate)?);
        log::debug!(
            "load gen={}: {} channels, {} samples at {} Hz",
            self.generation + 1,
            buffer.num_channels(),
            buffer.total_samples(),
            sample_rate
        );
        self.generation += 1;
        self.worker.cancel_all();
        self.view.reset(buffer.total_samples(), sample_rate);
        self.peaks.invalidate();
        self.rms.set_buffer(Some(buffer.clone()));
        self.spectrogram = None;
        self.spec_image.invalidate();
        self.worker
            .submit_load(self.generation, buffer.clone(), self.rms_window, self.spec_params);
        self.buffer = Some(buffer);
        Ok(())
    }

    /// Unload the current track and cancel outstanding work
    pub fn clear(&mut self) {
        self.generation += 1;
        self.worker.cancel_all();
        self.buffer = None;
        self.view.reset(0, 44_100);
        self.peaks.invalidate();
        self.rms.set_buffer(None);
        self.spectrogram = None;
        self.spec_image.invalidate();
    }

    /// Install completed background work; call once per tick
    pub fn poll_events(&mut self) -> Vec<TrackEvent> {
        let mut events = Vec::new();
        while let Some(result) = self.worker.try_recv() {
            match result {
                WorkerResult::Load(bundle) => {
                    if bundle.generation != self.generation {
                        log::debug!("discarding stale load bundle gen={}", bundle.generation);
                        continue;
                    }
                    let spec_current = bundle.params == self.spec_params;
                    self.rms.install_precomputed(
                        bundle.cumulative,
                        bundle.peak,
                        bundle.rms_max,
                        bundle.rms_window,
                    );
                    if spec_current {
                        self.spectrogram = bundle.spectrogram;
                        self.spec_image.invalidate();
                    } else if let Some(buffer) = &self.buffer {
                        // Parameters changed while the load was in flight
                        self.worker.submit_spectrogram(
                            self.generation,
                            buffer.clone(),
                            self.spec_params,
                        );
                    }
                    events.push(TrackEvent::LoadComplete);
                }
                WorkerResult::Spectrogram {
                    generation,
                    spectrogram,
                    params,
                } => {
                    if generation != self.generation || params != self.spec_params {
                        log::debug!("discarding stale spectrogram gen={}", generation);
                        continue;
                    }
                    self.spectrogram = spectrogram;
                    self.spec_image.invalidate();
                    events.push(TrackEvent::SpectrogramReady);
                }
            }
        }
        events
    }

    // ── Display parameters ──────────────────────────────────────────────

    /// Set the RMS window length in samples
    pub fn set_rms_window(&mut self, samples: usize) {
        self.rms_window = samples;
        self.rms.set_window(samples);
    }

    /// Change FFT size or window function; triggers a background recompute
    pub fn set_fft_params(&mut self, fft_size: usize, window: WindowKind) {
        let params = SpectrogramParams { fft_size, window };
        if params == self.spec_params {
            return;
        }
        self.spec_params = params;
        self.spectrogram = None;
        self.spec_image.invalidate();
        if let Some(buffer) = &self.buffer {
            self.worker
                .submit_spectrogram(self.generation, buffer.clone(), params);
        }
    }

    /// Select a registered colormap; unknown names are ignored
    pub fn set_colormap(&mut self, name: &str) {
        if colormap(name).is_some() {
            self.colormap_name = name.to_string();
        }
    }

    pub fn set_db_floor(&mut self, db: f64) {
        self.db_floor = db;
    }

    pub fn set_db_ceil(&mut self, db: f64) {
        self.db_ceil = db;
    }

    // ── Pull-based outputs, called on every redraw ──────────────────────

    /// Per-channel min/max peaks for the current view at `width` pixels
    pub fn get_peaks(&mut self, width: usize) -> &[ChannelPeaks] {
        let buffer = match &self.buffer {
            Some(b) => b.clone(),
            None => return &[],
        };
        let view = self.view.view_range();
        self.peaks.get_peaks(&buffer, view, width)
    }

    /// Per-channel and combined RMS envelopes for the current view
    pub fn get_rms_envelope(&mut self, width: usize) -> &RmsEnvelope {
        let view = self.view.view_range();
        self.rms.envelope(view, width)
    }

    pub fn get_peak_marker(&mut self) -> Option<PeakMarker> {
        self.rms.peak_marker()
    }

    pub fn get_rms_max_marker(&mut self) -> Option<RmsMaxMarker> {
        self.rms.rms_max_marker()
    }

    /// The colormapped spectrogram raster for the current views
    ///
    /// `None` while no spectrogram is available: audio shorter than one FFT
    /// frame, no track loaded, or a recompute still in flight.
    pub fn get_spectrogram_image(&mut self, width: u32, height: u32) -> Option<&RgbaImage> {
        let buffer = self.buffer.as_ref()?;
        let spectrogram = self.spectrogram.as_ref()?;
        self.spec_image.image(
            spectrogram,
            buffer.total_samples(),
            buffer.sample_rate(),
            self.view.view_range(),
            self.view.freq_view(),
            width,
            height,
            &self.colormap_name,
            self.db_floor,
            self.db_ceil,
        )
    }

    // ── View operations (§ zoom/scroll state machine) ───────────────────

    pub fn zoom_in(&mut self) {
        self.view.zoom_in();
    }

    pub fn zoom_out(&mut self) {
        self.view.zoom_out();
    }

    pub fn zoom_fit(&mut self) {
        self.view.zoom_fit();
    }

    pub fn scroll(&mut self, delta_samples: i64) {
        self.view.scroll(delta_samples);
    }

    pub fn freq_zoom(&mut self, factor: f64, anchor_mel: Option<f64>) {
        self.view.freq_zoom(factor, anchor_mel);
    }

    pub fn scroll_freq(&mut self, delta_mel: f64) {
        self.view.scroll_freq(delta_mel);
    }

    pub fn scale_up(&mut self) {
        self.view.scale_up();
    }

    pub fn scale_down(&mut self) {
        self.view.scale_down();
    }

    pub fn set_vertical_scale(&mut self, scale: f32) {
        self.view.set_vertical_scale(scale);
    }

    // ── State accessors ─────────────────────────────────────────────────

    /// The view model, for the pure coordinate transforms
    pub fn view_model(&self) -> &ViewModel {
        &self.view
    }

    pub fn buffer(&self) -> Option<&Arc<SampleBuffer>> {
        self.buffer.as_ref()
    }

    pub fn spectrogram_available(&self) -> bool {
        self.spectrogram.is_some()
    }

    pub fn spectrogram_params(&self) -> SpectrogramParams {
        self.spec_params
    }

    pub fn rms_window(&self) -> usize {
        self.rms_window
    }

    pub fn colormap_name(&self) -> &str {
        &self.colormap_name
    }
}
