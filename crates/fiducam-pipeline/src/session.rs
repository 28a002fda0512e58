//! Multi-camera sessions.

use crate::acquisition::{AcquisitionLoop, LoopError, LoopStats};
use crate::config::{CameraConfig, SessionConfig};
use crate::pipeline::DetectionPipeline;
use crate::sink::DisplaySink;
use crate::source::{open_source, FrameSource, SourceError};
use crate::store::LatestResultStore;

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("camera '{camera}': {error}")]
    Source {
        camera: String,
        #[source]
        error: SourceError,
    },
    #[error("camera '{camera}': {error}")]
    Loop {
        camera: String,
        #[source]
        error: LoopError,
    },
}

/// One running loop per configured camera, all writing to a shared store.
///
/// Every source is opened before any loop starts, so a camera that cannot be
/// opened fails the whole session and nothing runs.
pub struct Session {
    store: LatestResultStore,
    loops: Vec<AcquisitionLoop>,
}

impl Session {
    /// Open every camera's source and start its loop. `sink_for` is asked once
    /// per camera for the display collaborator of that camera.
    pub fn start<F>(config: &SessionConfig, sink_for: F) -> Result<Self, SessionError>
    where
        F: FnMut(&CameraConfig) -> Box<dyn DisplaySink>,
    {
        let mut sources = Vec::with_capacity(config.cameras.len());
        for cam in &config.cameras {
            let source = open_source(cam).map_err(|error| SessionError::Source {
                camera: cam.id.clone(),
                error,
            })?;
            sources.push(source);
        }
        Self::start_with_sources(config, sources, sink_for)
    }

    /// Start loops over already opened sources, one per camera in order.
    pub fn start_with_sources<F>(
        config: &SessionConfig,
        sources: Vec<Box<dyn FrameSource>>,
        mut sink_for: F,
    ) -> Result<Self, SessionError>
    where
        F: FnMut(&CameraConfig) -> Box<dyn DisplaySink>,
    {
        let store = LatestResultStore::new();
        let mut session = Self {
            store: store.clone(),
            loops: Vec::with_capacity(sources.len()),
        };

        for (cam, source) in config.cameras.iter().zip(sources) {
            let pipeline = DetectionPipeline::from_config(cam, config);
            let mut acq = AcquisitionLoop::new(&cam.id, source, pipeline, store.clone(), &config.loop_config)
                .with_boxed_sink(sink_for(cam));
            // Loops already running are stopped when `session` drops.
            acq.start().map_err(|error| SessionError::Loop {
                camera: cam.id.clone(),
                error,
            })?;
            session.loops.push(acq);
        }
        log::info!("session started with {} camera(s)", session.loops.len());
        Ok(session)
    }

    /// Shared latest-result register of all cameras.
    pub fn store(&self) -> &LatestResultStore {
        &self.store
    }

    pub fn cameras(&self) -> Vec<&str> {
        self.loops.iter().map(|l| l.camera()).collect()
    }

    pub fn loops(&self) -> &[AcquisitionLoop] {
        &self.loops
    }

    /// Exit signal: stop every loop.
    pub fn stop_all(&self) {
        for acq in &self.loops {
            acq.stop();
        }
    }

    /// Wait for every loop to finish (end of stream or stop).
    pub fn join(self) -> Vec<(String, LoopStats)> {
        self.loops
            .into_iter()
            .map(|acq| {
                let camera = acq.camera().to_owned();
                (camera, acq.join())
            })
            .collect()
    }
}
