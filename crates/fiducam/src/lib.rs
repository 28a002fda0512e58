//! High-level facade crate for the `fiducam-*` workspace.
//!
//! This crate provides:
//! - stable re-exports of the detector and pipeline crates;
//! - one-shot helpers that run the configured detectors on a single image
//!   and return a serializable report plus the annotated frame.
//!
//! ## Quickstart
//!
//! ```no_run
//! use fiducam::detect::{detect_image_file, DetectOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let opts = DetectOptions::markers_only();
//! let (report, _annotated) = detect_image_file("frame.png", &opts)?;
//! for m in &report.markers {
//!     println!("marker {} at {:?}", m.id, m.centroid());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `fiducam::core`: frames, geometry, overlay primitives, logger.
//! - `fiducam::barcode`: gradient barcode locator and symbol decoder.
//! - `fiducam::aruco`: marker dictionaries, detection and rendering.
//! - `fiducam::pipeline`: frame sources, acquisition loops, sessions, store.
//! - `fiducam::detect`: single-image helpers.

pub use fiducam_aruco as aruco;
pub use fiducam_barcode as barcode;
pub use fiducam_core as core;
pub use fiducam_pipeline as pipeline;

pub use fiducam_aruco::{FiducialMarker, FiducialMarkerDetector, MarkerDetectorParams};
pub use fiducam_barcode::{DecodedSymbol, GradientBarcodeLocator, SymbolDecoder};
pub use fiducam_core::{BoundingQuad, Frame, PixelOrder};
pub use fiducam_pipeline::{
    AcquisitionLoop, CameraConfig, DetectionState, LatestResultStore, Session, SessionConfig,
};

pub mod detect;
