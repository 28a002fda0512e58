//! Frame-level marker detection and marker overlays.

use crate::candidates::{find_candidates, Candidate, CandidateParams};
use crate::decode::{CellDecoder, DecodeParams};
use crate::{Dictionary, MarkerDictionary, Matcher};
use fiducam_core::overlay::{draw_dot, draw_polygon, draw_text};
use fiducam_core::{centroid, Frame, GrayImageView, OverlayStyle};
use image::{GrayImage, RgbImage};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Parameters of [`FiducialMarkerDetector`]. The dictionary is fixed when the
/// detector is built.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerDetectorParams {
    pub dictionary: MarkerDictionary,
    /// Resize frames to this width (aspect preserved) before detection.
    pub working_width: Option<u32>,
    /// Mirror frames horizontally before detection.
    pub flip_horizontal: bool,
    /// Clamped to the dictionary's correction capability.
    pub max_hamming: u8,
    pub candidates: CandidateParams,
    pub decode: DecodeParams,
}

/// One decoded marker in working-frame pixels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FiducialMarker {
    pub id: u32,
    /// TL, TR, BR, BL of the marker in its own (upright) orientation.
    pub corners: [Point2<f32>; 4],
    /// Quarter turns (clockwise) between the upright marker and the image.
    pub rotation: u8,
    pub hamming: u8,
    pub border_score: f32,
}

impl FiducialMarker {
    pub fn centroid(&self) -> Point2<f32> {
        centroid(&self.corners)
    }
}

/// Markers together with the working frame they were found in.
#[derive(Clone, Debug)]
pub struct MarkerDetection {
    pub markers: Vec<FiducialMarker>,
    /// Resized and/or mirrored copy of the input.
    pub working: Frame,
    /// Working width over input width.
    pub scale: f32,
}

/// Square fiducial marker detector bound to one dictionary.
#[derive(Clone, Debug)]
pub struct FiducialMarkerDetector {
    params: MarkerDetectorParams,
    matcher: Matcher,
    style: OverlayStyle,
}

impl Default for FiducialMarkerDetector {
    fn default() -> Self {
        Self::new(MarkerDetectorParams::default())
    }
}

impl FiducialMarkerDetector {
    pub fn new(mut params: MarkerDetectorParams) -> Self {
        let dict = params.dictionary.dictionary();
        params.max_hamming = params.max_hamming.min(dict.max_correction_bits);
        let matcher = Matcher::new(dict, params.max_hamming);
        Self {
            params,
            matcher,
            style: OverlayStyle::default(),
        }
    }

    pub fn with_style(mut self, style: OverlayStyle) -> Self {
        self.style = style;
        self
    }

    #[inline]
    pub fn params(&self) -> &MarkerDetectorParams {
        &self.params
    }

    #[inline]
    pub fn dictionary(&self) -> &Dictionary {
        self.matcher.dictionary()
    }

    /// Copy of `frame` at the configured working width, not mirrored.
    pub fn resize(&self, frame: &Frame) -> Frame {
        match self.params.working_width {
            Some(w) if w > 0 && w != frame.width() => frame.resized_to_width(w),
            _ => frame.clone(),
        }
    }

    /// Apply the configured resize and mirror to a copy of `frame`.
    pub fn prepare(&self, frame: &Frame) -> Frame {
        let resized = self.resize(frame);
        if self.params.flip_horizontal {
            resized.flipped_horizontal()
        } else {
            resized
        }
    }

    /// Markers and an annotated copy of the working frame. An empty list is
    /// the normal outcome for frames without markers.
    pub fn detect(&self, frame: &Frame) -> (Vec<FiducialMarker>, Frame) {
        let detection = self.detect_markers(frame);
        let mut canvas = detection.working.to_rgb_image();
        draw_markers(&mut canvas, &detection.markers, &self.style);
        let annotated = detection.working.replace_pixels(&canvas);
        (detection.markers, annotated)
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, frame), fields(width = frame.width(), height = frame.height()))
    )]
    pub fn detect_markers(&self, frame: &Frame) -> MarkerDetection {
        let working = self.prepare(frame);
        let scale = if frame.width() == 0 {
            1.0
        } else {
            working.width() as f32 / frame.width() as f32
        };
        let markers = self.detect_gray(&working.to_gray());
        MarkerDetection {
            markers,
            working,
            scale,
        }
    }

    /// Detect on an already prepared grayscale image; corners are in its pixels.
    pub fn detect_gray(&self, gray: &GrayImage) -> Vec<FiducialMarker> {
        let Some(mut decoder) = CellDecoder::new(&self.params.decode, self.dictionary().marker_size) else {
            return Vec::new();
        };
        let view = GrayImageView::from(gray);
        let candidates = find_candidates(gray, &self.params.candidates);

        let mut decoded: Vec<(&Candidate, FiducialMarker)> = Vec::new();
        for cand in &candidates {
            let Some(obs) = decoder.decode_quad(&view, &cand.corners) else {
                continue;
            };
            let Some(m) = self.matcher.match_code(obs.code) else {
                continue;
            };
            let r = m.rotation as usize;
            let c = &cand.corners;
            decoded.push((
                cand,
                FiducialMarker {
                    id: m.id,
                    corners: [c[r % 4], c[(r + 1) % 4], c[(r + 2) % 4], c[(r + 3) % 4]],
                    rotation: m.rotation,
                    hamming: m.hamming,
                    border_score: obs.border_score,
                },
            ));
        }
        let decoded_count = decoded.len();
        let out = merge_concentric(decoded, self.params.candidates.duplicate_center_rate);

        log::debug!(
            "{} marker candidates, {} decoded, {} markers",
            candidates.len(),
            decoded_count,
            out.len()
        );
        out
    }
}

/// Collapse decodes of one physical marker (several thresholds, or the
/// border and a nested quad) into the best one: lowest hamming distance,
/// then the longest outline. Markers at different places are all kept, even
/// when they share an id.
fn merge_concentric(mut decoded: Vec<(&Candidate, FiducialMarker)>, rate: f32) -> Vec<FiducialMarker> {
    decoded.sort_by(|(ca, a), (cb, b)| {
        a.hamming
            .cmp(&b.hamming)
            .then(cb.perimeter.total_cmp(&ca.perimeter))
    });
    let mut kept: Vec<(f32, FiducialMarker)> = Vec::with_capacity(decoded.len());
    for (cand, marker) in decoded {
        let side = cand.min_side();
        let center = marker.centroid();
        let duplicate = kept
            .iter()
            .any(|(s, k)| (k.centroid() - center).norm() < rate * side.min(*s));
        if !duplicate {
            kept.push((side, marker));
        }
    }
    kept.into_iter().map(|(_, m)| m).collect()
}

/// Outline, centroid dot and id label for each marker.
pub fn draw_markers(canvas: &mut RgbImage, markers: &[FiducialMarker], style: &OverlayStyle) {
    for m in markers {
        draw_polygon(canvas, &m.corners, style.marker_color, style.thickness);
        draw_dot(canvas, m.centroid(), style.centroid_radius, style.centroid_color);
        let tl = m.corners[0];
        draw_text(
            canvas,
            tl.x.round() as i32,
            tl.y.round() as i32 - 15,
            &m.id.to_string(),
            style.marker_color,
            style.font_scale,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiducam_core::PixelOrder;

    fn black_frame() -> Frame {
        Frame::filled(640, 480, PixelOrder::Bgr, [0, 0, 0]).expect("frame")
    }

    #[test]
    fn black_frame_has_no_markers() {
        let det = FiducialMarkerDetector::default();
        let (markers, annotated) = det.detect(&black_frame());
        assert!(markers.is_empty());
        assert_eq!(annotated.as_bytes(), black_frame().as_bytes());
    }

    #[test]
    fn prepare_resizes_and_mirrors() {
        let mut frame = black_frame();
        let mut rgb = frame.to_rgb_image();
        rgb.put_pixel(0, 0, image::Rgb([255, 255, 255]));
        frame = frame.replace_pixels(&rgb);

        let det = FiducialMarkerDetector::new(MarkerDetectorParams {
            working_width: Some(320),
            flip_horizontal: true,
            ..Default::default()
        });
        let detection = det.detect_markers(&frame);
        assert_eq!((detection.working.width(), detection.working.height()), (320, 240));
        approx::assert_relative_eq!(detection.scale, 0.5);

        let plain = FiducialMarkerDetector::new(MarkerDetectorParams {
            flip_horizontal: true,
            ..Default::default()
        });
        let mirrored = plain.prepare(&frame);
        assert_eq!(mirrored.rgb_at(639, 0), Some([255, 255, 255]));
    }

    #[test]
    fn hamming_is_clamped_to_dictionary() {
        let det = FiducialMarkerDetector::new(MarkerDetectorParams {
            max_hamming: 3,
            ..Default::default()
        });
        assert_eq!(det.params().max_hamming, 0);
    }

    #[test]
    fn params_deserialize_from_partial_json() {
        let params: MarkerDetectorParams =
            serde_json::from_str(r#"{"working_width": 600, "flip_horizontal": true}"#).expect("json");
        assert_eq!(params.working_width, Some(600));
        assert!(params.flip_horizontal);
        assert_eq!(params.dictionary, MarkerDictionary::ArucoOriginal);
        assert_eq!(params.candidates, CandidateParams::default());
    }

    #[test]
    fn draw_markers_paints_outline_and_centroid() {
        let mut canvas = RgbImage::new(100, 100);
        let marker = FiducialMarker {
            id: 7,
            corners: [
                Point2::new(30.0, 40.0),
                Point2::new(70.0, 40.0),
                Point2::new(70.0, 80.0),
                Point2::new(30.0, 80.0),
            ],
            rotation: 0,
            hamming: 0,
            border_score: 1.0,
        };
        let style = OverlayStyle::default();
        draw_markers(&mut canvas, &[marker], &style);
        assert_eq!(canvas.get_pixel(50, 40).0, style.marker_color);
        assert_eq!(canvas.get_pixel(50, 60).0, style.centroid_color);
        // The id label sits above the top-left corner.
        assert!((18..25).any(|y| (30..42).any(|x| canvas.get_pixel(x, y).0 == style.marker_color)));
    }
}
