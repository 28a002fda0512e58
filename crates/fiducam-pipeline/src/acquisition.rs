//! The per-camera acquisition loop.
//!
//! One [`AcquisitionLoop`] owns one camera's source and detectors and drives
//! them on a dedicated, named thread:
//!
//! ```text
//! Idle --start()--> Running --stop() / end of stream--> Stopped
//! ```
//!
//! `stop()` may be called from any thread. It is observed at the next
//! iteration boundary; an iteration that is still detecting when stop is
//! requested is abandoned without touching the store or the sink.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::config::LoopConfig;
use crate::pipeline::DetectionPipeline;
use crate::sink::{DisplaySink, NullSink};
use crate::source::{now_ms, FrameSource, ReadError};
use crate::store::LatestResultStore;

/// Pause between iterations of marker-detecting loops when none is configured.
pub const DEFAULT_MARKER_INTERVAL: Duration = Duration::from_millis(100);

/// Granularity at which pauses notice a stop request.
const PAUSE_SLICE: Duration = Duration::from_millis(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopPhase {
    Idle,
    Running,
    /// Terminal.
    Stopped,
}

/// Counters of a loop, readable while it runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Frames read and run through the detectors.
    pub frames: u64,
    pub transient_errors: u64,
    /// Corrupt frames and other failures that do not stop the loop.
    pub unexpected_errors: u64,
    /// Results written to the store and handed to the sink.
    pub published: u64,
}

#[derive(thiserror::Error, Debug)]
pub enum LoopError {
    #[error("acquisition loop is already running")]
    AlreadyStarted,
    #[error("acquisition loop has stopped and cannot be restarted")]
    AlreadyStopped,
    #[error("failed to spawn acquisition thread")]
    Spawn(#[from] io::Error),
}

struct Shared {
    phase: Mutex<LoopPhase>,
    stop: AtomicBool,
    /// Held while publishing. `stop()` raises the flag under it, so once
    /// `stop()` returns nothing else is published.
    publish_gate: Mutex<()>,
    stats: Mutex<LoopStats>,
}

// Loop state stays consistent across a panicking holder, so poison is ignored.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl Shared {
    fn request_stop(&self) {
        {
            let _gate = lock(&self.publish_gate);
            self.stop.store(true, Ordering::Release);
        }
        *lock(&self.phase) = LoopPhase::Stopped;
    }

    fn stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn record(&self, f: impl FnOnce(&mut LoopStats)) {
        f(&mut lock(&self.stats));
    }

    /// Sleep for `d`, waking early when a stop is requested.
    fn pause(&self, d: Duration) {
        let deadline = Instant::now() + d;
        while !self.stopping() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(PAUSE_SLICE));
        }
    }
}

/// Cloneable handle that stops a loop from another thread.
#[derive(Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.shared.request_stop();
    }
}

/// Everything the worker thread owns.
struct Worker {
    camera: String,
    source: Box<dyn FrameSource>,
    pipeline: DetectionPipeline,
    store: LatestResultStore,
    sink: Box<dyn DisplaySink>,
    interval: Duration,
    transient_delay: Duration,
}

/// Continuous read, detect, annotate and publish cycle for one camera.
pub struct AcquisitionLoop {
    camera: String,
    shared: Arc<Shared>,
    worker: Option<Worker>,
    handle: Option<JoinHandle<()>>,
}

impl AcquisitionLoop {
    /// Build an idle loop around an already opened source.
    pub fn new(
        camera: impl Into<String>,
        source: Box<dyn FrameSource>,
        pipeline: DetectionPipeline,
        store: LatestResultStore,
        config: &LoopConfig,
    ) -> Self {
        let camera = camera.into();
        let interval = match config.min_iteration_interval_ms {
            Some(ms) => Duration::from_millis(ms),
            None if pipeline.has_markers() => DEFAULT_MARKER_INTERVAL,
            None => Duration::ZERO,
        };
        let worker = Worker {
            camera: camera.clone(),
            source,
            pipeline,
            store,
            sink: Box::new(NullSink),
            interval,
            transient_delay: Duration::from_millis(config.transient_delay_ms),
        };
        Self {
            camera,
            shared: Arc::new(Shared {
                phase: Mutex::new(LoopPhase::Idle),
                stop: AtomicBool::new(false),
                publish_gate: Mutex::new(()),
                stats: Mutex::new(LoopStats::default()),
            }),
            worker: Some(worker),
            handle: None,
        }
    }

    /// Send annotated frames to `sink`. Only effective before `start`.
    pub fn with_sink(self, sink: impl DisplaySink + 'static) -> Self {
        self.with_boxed_sink(Box::new(sink))
    }

    pub fn with_boxed_sink(mut self, sink: Box<dyn DisplaySink>) -> Self {
        if let Some(worker) = self.worker.as_mut() {
            worker.sink = sink;
        }
        self
    }

    pub fn camera(&self) -> &str {
        &self.camera
    }

    pub fn phase(&self) -> LoopPhase {
        *lock(&self.shared.phase)
    }

    pub fn stats(&self) -> LoopStats {
        *lock(&self.shared.stats)
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Idle to Running: spawn the acquisition thread.
    pub fn start(&mut self) -> Result<(), LoopError> {
        {
            let mut phase = lock(&self.shared.phase);
            match *phase {
                LoopPhase::Running => return Err(LoopError::AlreadyStarted),
                LoopPhase::Stopped => return Err(LoopError::AlreadyStopped),
                LoopPhase::Idle => *phase = LoopPhase::Running,
            }
        }
        let Some(worker) = self.worker.take() else {
            return Err(LoopError::AlreadyStarted);
        };

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(format!("acq-{}", self.camera))
            .spawn(move || {
                worker.run(&shared);
                *lock(&shared.phase) = LoopPhase::Stopped;
            });
        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                *lock(&self.shared.phase) = LoopPhase::Stopped;
                Err(LoopError::Spawn(e))
            }
        }
    }

    /// Request the loop to stop. Idempotent; safe from any thread. After it
    /// returns, the store and the sink receive nothing more from this loop.
    pub fn stop(&self) {
        self.shared.request_stop();
    }

    /// Wait for the acquisition thread to finish and return the final counters.
    pub fn join(mut self) -> LoopStats {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("acquisition thread for {} panicked", self.camera);
            }
        }
        *lock(&self.shared.phase) = LoopPhase::Stopped;
        self.stats()
    }
}

impl Drop for AcquisitionLoop {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.shared.request_stop();
            let _ = handle.join();
        }
    }
}

impl Worker {
    fn run(mut self, shared: &Shared) {
        info!("{}: acquiring from {}", self.camera, self.source.describe());

        while !shared.stopping() {
            let started = Instant::now();

            match self.source.read_frame() {
                Ok(frame) => {
                    let outcome = self.pipeline.process(&frame);
                    shared.record(|s| s.frames += 1);
                    if outcome.rejected_symbols > 0 {
                        debug!("{}: {} non-text symbol(s) dropped", self.camera, outcome.rejected_symbols);
                    }

                    let gate = lock(&shared.publish_gate);
                    if shared.stopping() {
                        break;
                    }
                    let state = self.store.update(&self.camera, |s| outcome.apply(s, now_ms()));
                    self.sink.publish(&self.camera, outcome.annotated, &state);
                    drop(gate);
                    shared.record(|s| s.published += 1);
                }
                Err(ReadError::Transient(reason)) => {
                    debug!("{}: transient read error: {reason}", self.camera);
                    shared.record(|s| s.transient_errors += 1);
                    shared.pause(self.transient_delay);
                }
                Err(ReadError::Corrupt(reason)) => {
                    warn!("{}: {reason}", self.camera);
                    shared.record(|s| s.unexpected_errors += 1);
                }
                Err(ReadError::EndOfStream) => {
                    info!("{}: end of stream", self.camera);
                    break;
                }
            }

            shared.pause(self.interval.saturating_sub(started.elapsed()));
        }

        let stats = *lock(&shared.stats);
        info!(
            "{}: stopped after {} frame(s), {} transient, {} unexpected",
            self.camera, stats.frames, stats.transient_errors, stats.unexpected_errors
        );
    }
}
