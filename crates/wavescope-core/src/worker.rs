//! Background computation for track loading and spectrogram recompute
//!
//! Heavy analysis (full-file peak scan, cumulative sums, mel spectrogram)
//! can take hundreds of milliseconds on long files. Running it on the
//! interactive thread would stall every redraw, so the `ComputeWorker`
//! offloads it to a dedicated thread:
//!
//! 1. The owner submits a [`FullLoad`](Task::FullLoad) or
//!    [`Spectrogram`](Task::Spectrogram) task; submitting cancels any
//!    in-flight task of the same kind first.
//! 2. The worker computes the result, polling the task's cancel token
//!    between stages, and sends back an immutable bundle.
//! 3. The owner polls [`try_recv`](ComputeWorker::try_recv) on its tick and
//!    installs bundles whose generation still matches the active buffer.
//!
//! The worker never touches shared caches: it works only on its own `Arc`'d
//! inputs and hands back complete values, so the interactive thread remains
//! the sole writer of all cache state and no locks are needed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam::channel::{unbounded, Receiver, Sender, TryRecvError};

use crate::mel::{compute_mel_spectrogram, MelSpectrogram, SpectrogramParams};
use crate::rms::{cumulative_sums, find_peak, find_rms_max};
use crate::types::{PeakMarker, RmsMaxMarker, SampleBuffer};

/// Shared cancellation flag, polled cooperatively at stage boundaries
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Everything a full load produces, delivered as one immutable bundle
#[derive(Debug)]
pub struct LoadBundle {
    /// Load generation this bundle belongs to
    pub generation: u64,
    pub peak: Option<PeakMarker>,
    /// Per-channel cumulative sums of squared samples
    pub cumulative: Vec<Vec<f64>>,
    pub rms_max: Option<RmsMaxMarker>,
    /// RMS window the marker was computed with
    pub rms_window: usize,
    /// `None` when the audio is shorter than one FFT frame
    pub spectrogram: Option<MelSpectrogram>,
    /// Analysis parameters the spectrogram was computed with
    pub params: SpectrogramParams,
}

/// Completed background work
#[derive(Debug)]
pub enum WorkerResult {
    Load(LoadBundle),
    Spectrogram {
        generation: u64,
        spectrogram: Option<MelSpectrogram>,
        params: SpectrogramParams,
    },
}

enum Task {
    FullLoad {
        generation: u64,
        buffer: Arc<SampleBuffer>,
        rms_window: usize,
        params: SpectrogramParams,
        cancel: CancelToken,
    },
    Spectrogram {
        generation: u64,
        buffer: Arc<SampleBuffer>,
        params: SpectrogramParams,
        cancel: CancelToken,
    },
}

/// Background thread running load and spectrogram analysis
///
/// At most one task of each kind is outstanding: submitting a new one
/// cancels the previous token, and the cancelled task produces no result.
pub struct ComputeWorker {
    tx: Sender<Task>,
    rx: Receiver<WorkerResult>,
    load_cancel: Option<CancelToken>,
    spec_cancel: Option<CancelToken>,
    _handle: JoinHandle<()>,
}

impl ComputeWorker {
    /// Spawn the analysis thread
    pub fn spawn() -> Self {
        let (task_tx, task_rx) = unbounded::<Task>();
        let (result_tx, result_rx) = unbounded::<WorkerResult>();

        let handle = thread::Builder::new()
            .name("wavescope-compute".to_string())
            .spawn(move || worker_thread(task_rx, result_tx))
            .expect("failed to spawn compute worker thread");

        log::info!("compute worker thread started");

        Self {
            tx: task_tx,
            rx: result_rx,
            load_cancel: None,
            spec_cancel: None,
            _handle: handle,
        }
    }

    /// Submit a full-load analysis, cancelling any in-flight load
    pub fn submit_load(
        &mut self,
        generation: u64,
        buffer: Arc<SampleBuffer>,
        rms_window: usize,
        params: SpectrogramParams,
    ) {
        if let Some(previous) = self.load_cancel.take() {
            previous.cancel();
        }
        let cancel = CancelToken::new();
        self.load_cancel = Some(cancel.clone());
        let _ = self.tx.send(Task::FullLoad {
            generation,
            buffer,
            rms_window,
            params,
            cancel,
        });
    }

    /// Submit a spectrogram-only recompute, cancelling any in-flight one
    pub fn submit_spectrogram(
        &mut self,
        generation: u64,
        buffer: Arc<SampleBuffer>,
        params: SpectrogramParams,
    ) {
        if let Some(previous) = self.spec_cancel.take() {
            previous.cancel();
        }
        let cancel = CancelToken::new();
        self.spec_cancel = Some(cancel.clone());
        let _ = self.tx.send(Task::Spectrogram {
            generation,
            buffer,
            params,
            cancel,
        });
    }

    /// Cancel all outstanding work (track unload)
    pub fn cancel_all(&mut self) {
        if let Some(token) = self.load_cancel.take() {
            token.cancel();
        }
        if let Some(token) = self.spec_cancel.take() {
            token.cancel();
        }
    }

    /// Poll for a completed result (non-blocking)
    pub fn try_recv(&self) -> Option<WorkerResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                log::error!("compute worker thread disconnected unexpectedly");
                None
            }
        }
    }
}

fn worker_thread(rx: Receiver<Task>, tx: Sender<WorkerResult>) {
    log::debug!("compute worker thread starting");

    while let Ok(task) = rx.recv() {
        match task {
            Task::FullLoad {
                generation,
                buffer,
                rms_window,
                params,
                cancel,
            } => {
                if let Some(bundle) =
                    run_full_load(generation, &buffer, rms_window, params, &cancel)
                {
                    let _ = tx.send(WorkerResult::Load(bundle));
                }
            }
            Task::Spectrogram {
                generation,
                buffer,
                params,
                cancel,
            } => {
                if cancel.is_cancelled() {
                    continue;
                }
                let started = Instant::now();
                let spectrogram = compute_mel_spectrogram(&buffer, params);
                log::debug!(
                    "spectrogram recompute gen={} fft={} in {:?}",
                    generation,
                    params.fft_size,
                    started.elapsed()
                );
                if cancel.is_cancelled() {
                    continue;
                }
                let _ = tx.send(WorkerResult::Spectrogram {
                    generation,
                    spectrogram,
                    params,
                });
            }
        }
    }

    log::debug!("compute worker thread shutting down");
}

/// The staged full-load computation; returns `None` when cancelled
fn run_full_load(
    generation: u64,
    buffer: &Arc<SampleBuffer>,
    rms_window: usize,
    params: SpectrogramParams,
    cancel: &CancelToken,
) -> Option<LoadBundle> {
    let started = Instant::now();
    if cancel.is_cancelled() {
        return None;
    }

    let peak = find_peak(buffer);
    if cancel.is_cancelled() {
        return None;
    }

    let cumulative = cumulative_sums(buffer);
    if cancel.is_cancelled() {
        return None;
    }

    let rms_max = find_rms_max(buffer, &cumulative, rms_window);
    if cancel.is_cancelled() {
        return None;
    }

    let spectrogram = compute_mel_spectrogram(buffer, params);
    if cancel.is_cancelled() {
        return None;
    }

    log::debug!(
        "full load gen={} ({} ch, {} samples) in {:?}",
        generation,
        buffer.num_channels(),
        buffer.total_samples(),
        started.elapsed()
    );

    Some(LoadBundle {
        generation,
        peak,
        cumulative,
        rms_max,
        rms_window,
        spectrogram,
        params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn wait_for_result(worker: &ComputeWorker) -> Option<WorkerResult> {
        for _ in 0..500 {
            if let Some(result) = worker.try_recv() {
                return Some(result);
            }
            thread::sleep(Duration::from_millis(10));
        }
        None
    }

    fn test_buffer(n: usize) -> Arc<SampleBuffer> {
        let samples: Vec<f32> = (0..n).map(|i| ((i % 100) as f32 / 100.0) - 0.5).collect();
        Arc::new(SampleBuffer::new(vec![samples.clone(), samples], 44_100).unwrap())
    }

    #[test]
    fn full_load_delivers_complete_bundle() {
        let mut worker = ComputeWorker::spawn();
        let buffer = test_buffer(44_100);
        worker.submit_load(1, buffer.clone(), 4_410, SpectrogramParams::default());

        let result = wait_for_result(&worker).expect("worker produced no result");
        let bundle = match result {
            WorkerResult::Load(bundle) => bundle,
            other => panic!("expected load bundle, got {:?}", other),
        };
        assert_eq!(bundle.generation, 1);
        assert!(bundle.peak.is_some());
        assert_eq!(bundle.cumulative.len(), 2);
        assert_eq!(bundle.cumulative[0].len(), 44_101);
        assert!(bundle.rms_max.is_some());
        assert!(bundle.spectrogram.is_some());
    }

    #[test]
    fn resubmitting_cancels_previous_load() {
        let mut worker = ComputeWorker::spawn();
        let buffer = test_buffer(200_000);
        // Second submit lands before the worker dequeues the first on most
        // runs; either way only generation 2 may be the last delivery.
        worker.submit_load(1, buffer.clone(), 4_410, SpectrogramParams::default());
        worker.submit_load(2, buffer, 4_410, SpectrogramParams::default());

        let mut last_generation = 0;
        while let Some(result) = wait_for_result(&worker) {
            if let WorkerResult::Load(bundle) = result {
                assert!(bundle.generation > last_generation);
                last_generation = bundle.generation;
            }
            if last_generation == 2 {
                break;
            }
        }
        assert_eq!(last_generation, 2);
    }

    #[test]
    fn cancelled_task_emits_nothing() {
        let mut worker = ComputeWorker::spawn();
        let buffer = test_buffer(44_100);
        worker.submit_spectrogram(1, buffer, SpectrogramParams::default());
        worker.cancel_all();

        // The flag may have been set before or after the worker dequeued the
        // task; a cancelled dequeue produces no result at all.
        thread::sleep(Duration::from_millis(300));
        if let Some(WorkerResult::Spectrogram { generation, .. }) = worker.try_recv() {
            // Raced ahead of the cancel; the result must at least be tagged
            assert_eq!(generation, 1);
        }
    }

    #[test]
    fn spectrogram_task_reports_unavailable_for_short_audio() {
        let mut worker = ComputeWorker::spawn();
        let params = SpectrogramParams::default();
        let buffer = Arc::new(
            SampleBuffer::new(vec![vec![0.0; params.fft_size - 1]], 44_100).unwrap(),
        );
        worker.submit_spectrogram(7, buffer, params);
        match wait_for_result(&worker) {
            Some(WorkerResult::Spectrogram {
                generation,
                spectrogram,
                ..
            }) => {
                assert_eq!(generation, 7);
                assert!(spectrogram.is_none());
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
