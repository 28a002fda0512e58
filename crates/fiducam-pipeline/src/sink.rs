//! Display collaborators that receive annotated frames.
//!
//! A sink is the only thing an acquisition loop hands frames to. It always
//! receives an owned copy, so it can keep or forward the frame freely.

use std::fs;
use std::path::PathBuf;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use fiducam_core::Frame;

use crate::store::DetectionState;

pub trait DisplaySink: Send {
    /// Called once per processed frame with the annotated frame and the
    /// state just written to the store.
    fn publish(&mut self, camera: &str, frame: Frame, state: &DetectionState);
}

impl<F> DisplaySink for F
where
    F: FnMut(&str, Frame, &DetectionState) + Send,
{
    fn publish(&mut self, camera: &str, frame: Frame, state: &DetectionState) {
        self(camera, frame, state)
    }
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl DisplaySink for NullSink {
    fn publish(&mut self, _camera: &str, _frame: Frame, _state: &DetectionState) {}
}

/// One frame delivered through a [`ChannelSink`].
#[derive(Clone, Debug)]
pub struct Published {
    pub camera: String,
    pub frame: Frame,
    pub state: DetectionState,
}

/// Forwards frames to a bounded channel, dropping them while the consumer
/// is behind. A display should show the newest frame, not a backlog.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: Sender<Published>,
    dropped: u64,
}

impl ChannelSink {
    pub fn bounded(capacity: usize) -> (Self, Receiver<Published>) {
        let (tx, rx) = bounded(capacity.max(1));
        (Self { tx, dropped: 0 }, rx)
    }

    /// Frames dropped because the channel was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl DisplaySink for ChannelSink {
    fn publish(&mut self, camera: &str, frame: Frame, state: &DetectionState) {
        let item = Published {
            camera: camera.to_owned(),
            frame,
            state: state.clone(),
        };
        match self.tx.try_send(item) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.dropped += 1,
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

/// Writes annotated frames as PNG files.
///
/// By default every frame gets its own `{camera}_{n:06}.png`; with
/// [`DirectorySink::latest_only`] a single `{camera}.png` is overwritten.
#[derive(Clone, Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    latest_only: bool,
    counter: u64,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            latest_only: false,
            counter: 0,
        }
    }

    pub fn latest_only(mut self) -> Self {
        self.latest_only = true;
        self
    }

    fn path_for(&self, camera: &str) -> PathBuf {
        if self.latest_only {
            self.dir.join(format!("{camera}.png"))
        } else {
            self.dir.join(format!("{camera}_{:06}.png", self.counter))
        }
    }
}

impl DisplaySink for DirectorySink {
    fn publish(&mut self, camera: &str, frame: Frame, _state: &DetectionState) {
        if let Err(e) = fs::create_dir_all(&self.dir) {
            log::warn!("cannot create {}: {e}", self.dir.display());
            return;
        }
        let path = self.path_for(camera);
        self.counter += 1;
        if let Err(e) = frame.to_rgb_image().save(&path) {
            log::warn!("failed to write {}: {e}", path.display());
        }
    }
}
