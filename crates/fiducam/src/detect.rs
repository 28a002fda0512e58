use std::path::Path;

use crate::aruco::{FiducialMarker, MarkerDetectorParams};
use crate::barcode::{DecodedSymbol, LocatorParams, SymbolDecoderParams};
use crate::core::{BoundingQuad, Frame, OverlayStyle, PixelOrder};
use crate::pipeline::DetectionPipeline;
use serde::{Deserialize, Serialize};

/// Errors produced by the single-image helpers.
#[derive(thiserror::Error, Debug)]
pub enum DetectError {
    #[error("failed to read image {path}")]
    Image {
        path: String,
        #[source]
        error: image::ImageError,
    },

    #[error("no detector selected")]
    NoDetectors,
}

/// Which detectors to run and how to tune them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectOptions {
    pub locator: Option<LocatorParams>,
    pub symbols: Option<SymbolDecoderParams>,
    pub markers: Option<MarkerDetectorParams>,
    pub style: OverlayStyle,
}

impl DetectOptions {
    /// All three detectors with default parameters.
    pub fn all() -> Self {
        Self {
            locator: Some(LocatorParams::default()),
            symbols: Some(SymbolDecoderParams::default()),
            markers: Some(MarkerDetectorParams::default()),
            style: OverlayStyle::default(),
        }
    }

    pub fn markers_only() -> Self {
        Self {
            markers: Some(MarkerDetectorParams::default()),
            ..Default::default()
        }
    }

    fn is_empty(&self) -> bool {
        self.locator.is_none() && self.symbols.is_none() && self.markers.is_none()
    }

    fn pipeline(&self) -> DetectionPipeline {
        let mut pipeline = DetectionPipeline::new(self.style.clone());
        if let Some(p) = &self.locator {
            pipeline = pipeline.with_locator(p.clone());
        }
        if let Some(p) = &self.symbols {
            pipeline = pipeline.with_symbols(p.clone());
        }
        if let Some(p) = &self.markers {
            pipeline = pipeline.with_markers(p.clone());
        }
        pipeline
    }
}

/// What the detectors found in one image, in working-frame pixels.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub width: u32,
    pub height: u32,
    pub barcode: Option<BoundingQuad>,
    pub symbols: Vec<DecodedSymbol>,
    pub markers: Vec<FiducialMarker>,
}

/// Load an image file as a BGR frame.
pub fn load_frame(path: impl AsRef<Path>) -> Result<Frame, DetectError> {
    let path = path.as_ref();
    let rgb = image::open(path)
        .map_err(|error| DetectError::Image {
            path: path.display().to_string(),
            error,
        })?
        .to_rgb8();
    Ok(Frame::from_rgb_image(&rgb).to_order(PixelOrder::Bgr))
}

/// Run the selected detectors once and annotate the result.
pub fn detect_frame(frame: &Frame, opts: &DetectOptions) -> Result<(DetectionReport, Frame), DetectError> {
    if opts.is_empty() {
        return Err(DetectError::NoDetectors);
    }
    let outcome = opts.pipeline().process(frame);
    let det = outcome.detections;
    let report = DetectionReport {
        width: outcome.annotated.width(),
        height: outcome.annotated.height(),
        barcode: det.barcode,
        symbols: det.symbols,
        markers: det.markers,
    };
    log::info!(
        "barcode: {}, symbols: {}, markers: {}",
        report.barcode.is_some(),
        report.symbols.len(),
        report.markers.len()
    );
    Ok((report, outcome.annotated))
}

pub fn detect_image_file(
    path: impl AsRef<Path>,
    opts: &DetectOptions,
) -> Result<(DetectionReport, Frame), DetectError> {
    detect_frame(&load_frame(path)?, opts)
}
