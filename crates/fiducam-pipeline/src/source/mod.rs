//! Frame sources.
//!
//! A source is opened once (failing loudly with [`SourceError`]) and then
//! polled with [`FrameSource::read_frame`]. Read failures are split into
//! transient ones the caller skips, corrupt frames the caller counts, and the
//! end of a finite stream.

mod ffmpeg;
mod images;

pub use ffmpeg::{ffmpeg_args, FfmpegSource};
pub use images::ImageSource;

use crate::config::{CameraConfig, SourceKind, SourceSpec};
use fiducam_core::Frame;
use std::time::{SystemTime, UNIX_EPOCH};

/// Failure to open a source; fatal for the camera.
#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("source {origin} is unavailable: {reason}")]
    Unavailable { origin: String, reason: String },
    #[error("failed to spawn decoder process")]
    Spawn(#[from] std::io::Error),
}

impl SourceError {
    pub(crate) fn unavailable(origin: impl ToString, reason: impl Into<String>) -> Self {
        SourceError::Unavailable {
            origin: origin.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failure of a single read.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    /// The stream is finished; no further frames will arrive.
    #[error("end of stream")]
    EndOfStream,
    /// No frame this time; the next read may succeed.
    #[error("transient read failure: {0}")]
    Transient(String),
    /// A frame arrived but could not be turned into pixels.
    #[error("corrupt frame: {0}")]
    Corrupt(String),
}

/// A pull-based producer of frames for one camera.
pub trait FrameSource: Send {
    fn read_frame(&mut self) -> Result<Frame, ReadError>;

    /// Human-readable origin, for logs.
    fn describe(&self) -> String {
        "frame source".to_owned()
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read_frame(&mut self) -> Result<Frame, ReadError> {
        (**self).read_frame()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Open the source described by `config`, dispatching on its backend hint.
pub fn open_source(config: &CameraConfig) -> Result<Box<dyn FrameSource>, SourceError> {
    match (config.kind, &config.source) {
        (SourceKind::LocalImage, SourceSpec::Uri(path)) => {
            Ok(Box::new(ImageSource::open(path, config.repeat)?))
        }
        (SourceKind::LocalImage, SourceSpec::Index(_)) => Err(SourceError::unavailable(
            &config.source,
            "image sources need a file or directory path",
        )),
        _ => Ok(Box::new(FfmpegSource::spawn(config)?)),
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_kind_with_device_index_is_unavailable() {
        let cam = CameraConfig::new("c", SourceSpec::Index(0), SourceKind::LocalImage);
        let err = open_source(&cam).err().expect("error");
        assert!(matches!(err, SourceError::Unavailable { .. }));
        assert!(err.to_string().contains("#0"));
    }

    #[test]
    fn missing_video_file_is_unavailable() {
        let cam = CameraConfig::new(
            "c",
            SourceSpec::Uri("/no/such/clip.mp4".into()),
            SourceKind::LocalVideo,
        );
        assert!(matches!(open_source(&cam), Err(SourceError::Unavailable { .. })));
    }
}
