//! Camera and session configuration, loaded from JSON.

use fiducam_aruco::MarkerDetectorParams;
use fiducam_barcode::{LocatorParams, SymbolDecoderParams};
use fiducam_core::OverlayStyle;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Where frames come from: a device index or a URI / path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceSpec {
    Index(u32),
    Uri(String),
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpec::Index(i) => write!(f, "#{i}"),
            SourceSpec::Uri(uri) => f.write_str(uri),
        }
    }
}

/// Backend hint for opening a [`SourceSpec`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    #[default]
    #[serde(alias = "LOCAL_CAMERA_PORT")]
    LocalCamera,
    #[serde(alias = "WLAN_CAMERA_IP")]
    NetworkStream,
    LocalVideo,
    LocalImage,
}

/// Detectors run on every frame of a camera.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSelection {
    pub locator: bool,
    pub symbols: bool,
    pub markers: bool,
}

impl Default for DetectorSelection {
    fn default() -> Self {
        Self {
            locator: false,
            symbols: true,
            markers: false,
        }
    }
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

fn default_read_timeout_ms() -> u64 {
    1000
}

fn default_open_timeout_ms() -> u64 {
    10_000
}

/// One camera. Immutable once its acquisition loop is built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub id: String,
    pub source: SourceSpec,
    #[serde(default)]
    pub kind: SourceKind,
    /// Decoded frame size for streamed sources; image files keep their size.
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// How long one read waits before reporting a transient error.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// How long opening a streamed source waits for its first frame before
    /// the source counts as unavailable.
    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,
    /// Loop image sources forever instead of ending the stream.
    #[serde(default)]
    pub repeat: bool,
    #[serde(default)]
    pub detectors: DetectorSelection,
}

impl CameraConfig {
    pub fn new(id: impl Into<String>, source: SourceSpec, kind: SourceKind) -> Self {
        Self {
            id: id.into(),
            source,
            kind,
            width: default_width(),
            height: default_height(),
            read_timeout_ms: default_read_timeout_ms(),
            open_timeout_ms: default_open_timeout_ms(),
            repeat: false,
            detectors: DetectorSelection::default(),
        }
    }

    pub fn with_detectors(mut self, detectors: DetectorSelection) -> Self {
        self.detectors = detectors;
        self
    }
}

/// Pacing of the acquisition loops.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Minimum time between iteration starts. When unset, loops running the
    /// marker detector wait 100 ms and all others run back to back.
    pub min_iteration_interval_ms: Option<u64>,
    /// Pause after a transient read error.
    pub transient_delay_ms: u64,
    /// Draw an FPS line in the corner of annotated frames.
    pub status_overlay: bool,
}

/// Everything needed to run a multi-camera session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cameras: Vec<CameraConfig>,
    #[serde(rename = "loop")]
    pub loop_config: LoopConfig,
    pub locator: LocatorParams,
    pub symbols: SymbolDecoderParams,
    pub markers: MarkerDetectorParams,
    pub style: OverlayStyle,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cameras: vec![CameraConfig::new("cam0", SourceSpec::Index(0), SourceKind::LocalCamera)],
            loop_config: LoopConfig::default(),
            locator: LocatorParams::default(),
            symbols: SymbolDecoderParams::default(),
            markers: MarkerDetectorParams::default(),
            style: OverlayStyle::default(),
        }
    }
}

impl SessionConfig {
    /// Load and validate a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cameras.is_empty() {
            return Err(ConfigError::Invalid("no cameras configured".into()));
        }
        let mut seen = HashSet::new();
        for cam in &self.cameras {
            if cam.id.is_empty() {
                return Err(ConfigError::Invalid("camera id must not be empty".into()));
            }
            if !seen.insert(cam.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate camera id '{}'", cam.id)));
            }
            if cam.width == 0 || cam.height == 0 {
                return Err(ConfigError::Invalid(format!(
                    "camera '{}' has an empty frame size {}x{}",
                    cam.id, cam.width, cam.height
                )));
            }
            let d = cam.detectors;
            if !(d.locator || d.symbols || d.markers) {
                return Err(ConfigError::Invalid(format!("camera '{}' has no detectors enabled", cam.id)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_accepts_index_or_uri_and_legacy_kind_names() {
        let cam: CameraConfig = serde_json::from_str(
            r#"{"id": "door", "source": 2, "kind": "LOCAL_CAMERA_PORT"}"#,
        )
        .expect("json");
        assert_eq!(cam.source, SourceSpec::Index(2));
        assert_eq!(cam.kind, SourceKind::LocalCamera);
        assert_eq!((cam.width, cam.height, cam.read_timeout_ms), (640, 480, 1000));
        assert!(cam.detectors.symbols && !cam.detectors.markers);

        let cam: CameraConfig = serde_json::from_str(
            r#"{"id": "yard", "source": "rtsp://10.0.0.5/live", "kind": "WLAN_CAMERA_IP",
                "detectors": {"markers": true, "symbols": false}}"#,
        )
        .expect("json");
        assert_eq!(cam.source, SourceSpec::Uri("rtsp://10.0.0.5/live".into()));
        assert_eq!(cam.kind, SourceKind::NetworkStream);
        assert!(cam.detectors.markers && !cam.detectors.symbols);
    }

    #[test]
    fn session_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.json");
        let mut config = SessionConfig::default();
        config.loop_config.status_overlay = true;
        config.markers.working_width = Some(600);
        config.write_json(&path).expect("write");

        let raw = fs::read_to_string(&path).expect("read");
        assert!(raw.contains("\"loop\""));
        assert!(raw.contains("DICT_ARUCO_ORIGINAL"));
        assert_eq!(SessionConfig::load_json(&path).expect("load"), config);
    }

    #[test]
    fn validation_rejects_bad_sessions() {
        let mut config = SessionConfig::default();
        config.cameras.push(config.cameras[0].clone());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = SessionConfig::default();
        config.cameras[0].detectors = DetectorSelection {
            locator: false,
            symbols: false,
            markers: false,
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = SessionConfig {
            cameras: vec![],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = SessionConfig::load_json("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
