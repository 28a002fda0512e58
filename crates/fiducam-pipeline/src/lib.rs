//! Acquisition side of fiducam: frame sources, the per-frame detection
//! pipeline, the acquisition loop and the latest-result store.
//!
//! ```text
//! FrameSource -> DetectionPipeline (locator / symbols / markers -> Annotator)
//!             -> LatestResultStore + DisplaySink
//! ```
//!
//! Each camera gets its own [`AcquisitionLoop`] on its own thread; a
//! [`Session`] builds them from a [`SessionConfig`].
//!
//! ```no_run
//! use fiducam_pipeline::{ChannelSink, Session, SessionConfig};
//!
//! let config = SessionConfig::load_json("session.json")?;
//! let (sink, frames) = ChannelSink::bounded(4);
//! let session = Session::start(&config, |_| Box::new(sink.clone()))?;
//! for published in frames.iter().take(100) {
//!     println!("{}: {:?}", published.camera, published.state);
//! }
//! session.stop_all();
//! session.join();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod acquisition;
mod annotate;
mod config;
mod pipeline;
mod session;
mod sink;
pub mod source;
mod store;

pub use acquisition::{
    AcquisitionLoop, LoopError, LoopPhase, LoopStats, StopHandle, DEFAULT_MARKER_INTERVAL,
};
pub use annotate::{Annotator, FrameDetections};
pub use config::{
    CameraConfig, ConfigError, DetectorSelection, LoopConfig, SessionConfig, SourceKind,
    SourceSpec,
};
pub use pipeline::{DetectionPipeline, FrameOutcome};
pub use session::{Session, SessionError};
pub use sink::{ChannelSink, DirectorySink, DisplaySink, NullSink, Published};
pub use source::{open_source, FrameSource, ReadError, SourceError};
pub use store::{DetectionState, LatestResultStore};
