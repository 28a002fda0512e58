//! Per-frame composition of the detectors and the annotator.

use fiducam_aruco::{FiducialMarkerDetector, MarkerDetectorParams};
use fiducam_barcode::{
    GradientBarcodeLocator, LocatorParams, RxingScanner, SymbolDecoder, SymbolDecoderParams,
    SymbolScanner,
};
use fiducam_core::{Frame, OverlayStyle};

use crate::annotate::{Annotator, FrameDetections};
use crate::config::{CameraConfig, SessionConfig};
use crate::store::DetectionState;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Result of running the pipeline on one frame.
#[derive(Clone, Debug)]
pub struct FrameOutcome {
    pub detections: FrameDetections,
    /// Annotated copy of the input, resized and mirrored when the marker
    /// detector is configured to do so.
    pub annotated: Frame,
    /// Decoder's last announced `(payload, symbology)` after this frame.
    pub last_symbol: Option<(String, String)>,
    /// Symbols dropped because their payload was not text.
    pub rejected_symbols: usize,
}

impl FrameOutcome {
    /// Fold this frame into a camera's state. Markers overwrite the id only
    /// when one was seen, so the last id survives frames without markers.
    pub fn apply(&self, state: &mut DetectionState, now_ms: u64) {
        if let Some((payload, symbology)) = &self.last_symbol {
            state.last_payload.clone_from(payload);
            state.last_symbology.clone_from(symbology);
        }
        if let Some(marker) = self.detections.markers.first() {
            state.last_marker_id = i64::from(marker.id);
        }
        state.frames += 1;
        state.updated_at_ms = now_ms;
    }
}

/// The detectors of one camera, built once and reused for every frame.
pub struct DetectionPipeline {
    locator: Option<GradientBarcodeLocator>,
    symbols: Option<SymbolDecoder<Box<dyn SymbolScanner>>>,
    markers: Option<FiducialMarkerDetector>,
    annotator: Annotator,
    status_overlay: bool,
    last_timestamp_ms: Option<u64>,
}

impl Default for DetectionPipeline {
    fn default() -> Self {
        Self::new(OverlayStyle::default())
    }
}

impl DetectionPipeline {
    /// A pipeline with no detectors; add them with the `with_*` builders.
    pub fn new(style: OverlayStyle) -> Self {
        Self {
            locator: None,
            symbols: None,
            markers: None,
            annotator: Annotator::new(style),
            status_overlay: false,
            last_timestamp_ms: None,
        }
    }

    /// Detectors selected by `camera`, tuned by the session parameters.
    pub fn from_config(camera: &CameraConfig, session: &SessionConfig) -> Self {
        let sel = camera.detectors;
        let mut pipeline = Self::new(session.style.clone())
            .with_status_overlay(session.loop_config.status_overlay);
        if sel.locator {
            pipeline = pipeline.with_locator(session.locator.clone());
        }
        if sel.symbols {
            pipeline = pipeline.with_symbols(session.symbols.clone());
        }
        if sel.markers {
            pipeline = pipeline.with_markers(session.markers.clone());
        }
        pipeline
    }

    pub fn with_locator(mut self, params: LocatorParams) -> Self {
        self.locator = Some(GradientBarcodeLocator::new(params));
        self
    }

    pub fn with_symbols(self, params: SymbolDecoderParams) -> Self {
        self.with_symbol_scanner(Box::new(RxingScanner), params)
    }

    /// Decode symbols with a custom backend.
    pub fn with_symbol_scanner(mut self, scanner: Box<dyn SymbolScanner>, params: SymbolDecoderParams) -> Self {
        self.symbols = Some(SymbolDecoder::with_scanner(scanner, params));
        self
    }

    pub fn with_markers(mut self, params: MarkerDetectorParams) -> Self {
        let detector = FiducialMarkerDetector::new(params).with_style(self.annotator.style().clone());
        self.markers = Some(detector);
        self
    }

    pub fn with_status_overlay(mut self, enabled: bool) -> Self {
        self.status_overlay = enabled;
        self
    }

    pub fn has_markers(&self) -> bool {
        self.markers.is_some()
    }

    /// Run every configured detector on `frame` and annotate the result.
    ///
    /// The marker detector's working width applies to every detector. Its
    /// mirror applies to marker detection and the annotated frame only:
    /// symbols and the barcode region are found on the unmirrored image and
    /// their geometry is mirrored afterwards.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, frame), fields(width = frame.width(), height = frame.height()))
    )]
    pub fn process(&mut self, frame: &Frame) -> FrameOutcome {
        let upright = match &self.markers {
            Some(det) => det.resize(frame),
            None => frame.clone(),
        };
        let mirror = self
            .markers
            .as_ref()
            .is_some_and(|det| det.params().flip_horizontal);
        let width = upright.width();
        let gray = upright.to_gray();

        let mut detections = FrameDetections {
            barcode: self.locator.as_ref().and_then(|l| l.locate_gray(&gray)),
            ..Default::default()
        };

        let mut rejected_symbols = 0;
        let mut last_symbol = None;
        if let Some(decoder) = self.symbols.as_mut() {
            let scan = decoder.decode_gray(&gray);
            rejected_symbols = scan.rejected.len();
            detections.symbols = scan.symbols;
            last_symbol = decoder
                .last_payload()
                .zip(decoder.last_symbology())
                .map(|(p, s)| (p.to_owned(), s.name().to_owned()));
        }

        let working = if mirror {
            detections.barcode = detections.barcode.map(|q| q.mirrored_x(width));
            for symbol in &mut detections.symbols {
                symbol.rect = symbol.rect.mirrored_x(width);
            }
            upright.flipped_horizontal()
        } else {
            upright
        };

        if let Some(det) = &self.markers {
            let marker_gray = if mirror { working.to_gray() } else { gray };
            detections.markers = det.detect_gray(&marker_gray);
        }

        if self.status_overlay {
            detections.status = self.status_line(frame.timestamp_ms());
        }

        let annotated = self.annotator.annotate(&working, &detections);
        FrameOutcome {
            detections,
            annotated,
            last_symbol,
            rejected_symbols,
        }
    }

    /// Instantaneous frame rate from consecutive capture timestamps.
    fn status_line(&mut self, timestamp_ms: u64) -> Option<String> {
        if timestamp_ms == 0 {
            return None;
        }
        let prev = self.last_timestamp_ms.replace(timestamp_ms)?;
        let dt = timestamp_ms.checked_sub(prev).filter(|&dt| dt > 0)?;
        Some(format!("FPS {:.1}", 1000.0 / dt as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiducam_barcode::{RawSymbol, Symbology};
    use fiducam_core::{AxisRect, PixelOrder};
    use image::GrayImage;
    use nalgebra::Point2;

    struct Fixed(&'static str);

    impl SymbolScanner for Fixed {
        fn scan(&mut self, _gray: &GrayImage) -> Vec<RawSymbol> {
            vec![RawSymbol {
                payload: self.0.as_bytes().to_vec(),
                symbology: Symbology::Code128,
                points: vec![Point2::new(10.0, 40.0), Point2::new(90.0, 40.0)],
            }]
        }
    }

    /// Reports a symbol only when the top-left pixel is lit, as a stand-in
    /// for symbols that cannot be read mirrored.
    struct Upright;

    impl SymbolScanner for Upright {
        fn scan(&mut self, gray: &GrayImage) -> Vec<RawSymbol> {
            if gray.get_pixel(0, 0).0[0] < 128 {
                return Vec::new();
            }
            vec![RawSymbol {
                payload: b"UP".to_vec(),
                symbology: Symbology::Qr,
                points: vec![Point2::new(10.0, 40.0), Point2::new(90.0, 80.0)],
            }]
        }
    }

    fn black() -> Frame {
        Frame::filled(640, 480, PixelOrder::Bgr, [0, 0, 0]).expect("frame")
    }

    #[test]
    fn black_frame_yields_nothing_from_any_detector() {
        let mut pipeline = DetectionPipeline::default()
            .with_locator(LocatorParams::default())
            .with_symbols(SymbolDecoderParams::default())
            .with_markers(MarkerDetectorParams::default());
        let out = pipeline.process(&black());
        assert!(out.detections.is_empty());
        assert_eq!(out.last_symbol, None);
        assert_eq!(out.annotated.as_bytes(), black().as_bytes());
    }

    #[test]
    fn outcome_updates_state_and_keeps_last_marker() {
        let mut pipeline = DetectionPipeline::default()
            .with_symbol_scanner(Box::new(Fixed("ABC-1")), SymbolDecoderParams::default());
        let out = pipeline.process(&black());
        assert_eq!(out.detections.symbols.len(), 1);
        assert_eq!(out.last_symbol, Some(("ABC-1".into(), "CODE128".into())));

        let mut state = DetectionState {
            last_marker_id: 12,
            ..Default::default()
        };
        out.apply(&mut state, 1234);
        assert_eq!(state.last_payload, "ABC-1");
        assert_eq!(state.last_symbology, "CODE128");
        assert_eq!(state.last_marker_id, 12);
        assert_eq!((state.frames, state.updated_at_ms), (1, 1234));
    }

    #[test]
    fn marker_working_width_applies_to_annotated_frame() {
        let mut pipeline = DetectionPipeline::default().with_markers(MarkerDetectorParams {
            working_width: Some(320),
            ..Default::default()
        });
        assert!(pipeline.has_markers());
        let out = pipeline.process(&black());
        assert_eq!((out.annotated.width(), out.annotated.height()), (320, 240));
    }

    #[test]
    fn mirrored_markers_leave_symbols_readable() {
        let mut rgb = black().to_rgb_image();
        rgb.put_pixel(0, 0, image::Rgb([255, 255, 255]));
        let frame = black().replace_pixels(&rgb);

        let mut pipeline = DetectionPipeline::default()
            .with_symbol_scanner(Box::new(Upright), SymbolDecoderParams::default())
            .with_markers(MarkerDetectorParams {
                flip_horizontal: true,
                ..Default::default()
            });
        let out = pipeline.process(&frame);
        assert_eq!(out.detections.symbols.len(), 1);
        assert_eq!(out.detections.symbols[0].rect, AxisRect::new(550, 40, 80, 40));
        assert_eq!(out.annotated.rgb_at(639, 0), Some([255, 255, 255]));
        assert_eq!(out.last_symbol, Some(("UP".into(), "QRCODE".into())));
    }

    #[test]
    fn status_overlay_needs_two_timestamps() {
        let mut pipeline = DetectionPipeline::default()
            .with_symbol_scanner(Box::new(Fixed("X")), SymbolDecoderParams::default())
            .with_status_overlay(true);
        let first = pipeline.process(&black().with_timestamp(1_000));
        assert_eq!(first.detections.status, None);
        let second = pipeline.process(&black().with_timestamp(1_050));
        assert_eq!(second.detections.status.as_deref(), Some("FPS 20.0"));
    }
}
