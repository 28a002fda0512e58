//! Overlay of detection results on a frame copy.

use fiducam_aruco::{draw_markers, FiducialMarker};
use fiducam_barcode::DecodedSymbol;
use fiducam_core::overlay::{draw_polygon, draw_rect, draw_text, text_size};
use fiducam_core::{BoundingQuad, Frame, OverlayStyle};
use image::RgbImage;
use nalgebra::Point2;

/// Everything detected in one frame, in that frame's pixel coordinates.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameDetections {
    pub barcode: Option<BoundingQuad>,
    pub symbols: Vec<DecodedSymbol>,
    pub markers: Vec<FiducialMarker>,
    /// Free-form line drawn in the top-left corner.
    pub status: Option<String>,
}

impl FrameDetections {
    /// True when no detector found anything.
    pub fn is_empty(&self) -> bool {
        self.barcode.is_none() && self.symbols.is_empty() && self.markers.is_empty()
    }
}

/// Draws detections with per-detector colors.
///
/// [`Annotator::annotate`] always returns a new frame; the input is never
/// modified.
#[derive(Clone, Debug, Default)]
pub struct Annotator {
    style: OverlayStyle,
}

impl Annotator {
    pub fn new(style: OverlayStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    pub fn annotate(&self, frame: &Frame, detections: &FrameDetections) -> Frame {
        if detections.is_empty() && detections.status.is_none() {
            return frame.clone();
        }
        let mut canvas = frame.to_rgb_image();
        self.draw(&mut canvas, detections);
        frame.replace_pixels(&canvas)
    }

    /// Draw onto an existing canvas.
    pub fn draw(&self, canvas: &mut RgbImage, detections: &FrameDetections) {
        let s = &self.style;

        if let Some(quad) = &detections.barcode {
            let pts = quad.points.map(|p| Point2::new(p.x as f32, p.y as f32));
            draw_polygon(canvas, &pts, s.barcode_color, s.thickness);
        }

        for sym in &detections.symbols {
            draw_rect(canvas, sym.rect, s.symbol_color, s.thickness);
            let label = sym.label();
            let (_, text_h) = text_size(&label, s.font_scale);
            // Labels go 10 px above the box, or below it when that would
            // leave the frame.
            let mut baseline = sym.rect.y - 10;
            if baseline - (text_h as i32) < 0 {
                baseline = sym.rect.y + sym.rect.height as i32 + 10 + text_h as i32;
            }
            draw_text(canvas, sym.rect.x, baseline, &label, s.symbol_color, s.font_scale);
        }

        draw_markers(canvas, &detections.markers, s);

        if let Some(status) = &detections.status {
            draw_text(canvas, 30, 30, status, s.status_color, s.font_scale);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiducam_barcode::Symbology;
    use fiducam_core::{AxisRect, PixelOrder};

    fn gray_frame() -> Frame {
        Frame::filled(200, 120, PixelOrder::Bgr, [128, 128, 128]).expect("frame")
    }

    fn any_pixel(frame: &Frame, color: [u8; 3], xs: std::ops::Range<u32>, ys: std::ops::Range<u32>) -> bool {
        ys.clone()
            .any(|y| xs.clone().any(|x| frame.rgb_at(x, y) == Some(color)))
    }

    #[test]
    fn nothing_detected_returns_identical_copy() {
        let frame = gray_frame();
        let out = Annotator::default().annotate(&frame, &FrameDetections::default());
        assert_eq!(out, frame);
    }

    #[test]
    fn barcode_quad_is_green_and_input_untouched() {
        let frame = gray_frame();
        let before = frame.clone();
        let quad = BoundingQuad::from_unordered([
            Point2::new(20, 20),
            Point2::new(120, 20),
            Point2::new(120, 80),
            Point2::new(20, 80),
        ])
        .expect("quad");
        let det = FrameDetections {
            barcode: Some(quad),
            ..Default::default()
        };
        let out = Annotator::default().annotate(&frame, &det);
        assert_eq!(frame, before);
        assert_eq!(out.rgb_at(70, 20), Some([0, 255, 0]));
        assert_eq!(out.rgb_at(70, 50), Some([128, 128, 128]));
        assert_eq!(out.order(), PixelOrder::Bgr);
    }

    #[test]
    fn symbol_gets_red_box_and_label_above() {
        let det = FrameDetections {
            symbols: vec![DecodedSymbol {
                payload: b"TEST123".to_vec(),
                text: "TEST123".into(),
                symbology: Symbology::Qr,
                rect: AxisRect::new(40, 50, 60, 40),
            }],
            ..Default::default()
        };
        let out = Annotator::default().annotate(&gray_frame(), &det);
        let red = [255, 0, 0];
        assert_eq!(out.rgb_at(70, 50), Some(red));
        assert!(any_pixel(&out, red, 40..120, 30..41));
    }

    #[test]
    fn label_moves_below_box_at_top_edge() {
        let det = FrameDetections {
            symbols: vec![DecodedSymbol {
                payload: b"A".to_vec(),
                text: "A".into(),
                symbology: Symbology::Code128,
                rect: AxisRect::new(40, 4, 60, 20),
            }],
            ..Default::default()
        };
        let out = Annotator::default().annotate(&gray_frame(), &det);
        assert!(any_pixel(&out, [255, 0, 0], 40..120, 34..48));
    }

    #[test]
    fn status_line_is_drawn_top_left() {
        let det = FrameDetections {
            status: Some("FPS 30.0".into()),
            ..Default::default()
        };
        let out = Annotator::default().annotate(&gray_frame(), &det);
        assert!(any_pixel(&out, [255, 0, 0], 30..90, 16..31));
        assert!(!any_pixel(&out, [255, 0, 0], 0..200, 40..120));
    }
}
