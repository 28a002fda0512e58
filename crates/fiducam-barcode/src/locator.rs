//! Gradient-anisotropy barcode localization.
//!
//! A linear barcode is a dense patch of strong derivatives along one axis and
//! weak ones along the other. The locator turns that into a binary mask
//! (signed gradient difference, box blur, fixed threshold), fuses the bars
//! into a single blob with a wide closing element, knocks out small noise
//! with erosions and restores the blob with the same number of dilations.
//! The largest surviving blob is boxed with its minimum-area rectangle.

use fiducam_core::{close, dilate, erode, signed_area, BoundingQuad, Frame, StructuringElement};
use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::filter::box_filter;
use imageproc::geometry::min_area_rect;
use imageproc::gradients::{horizontal_scharr, vertical_scharr};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Tunables of the localization heuristic.
///
/// Defaults reproduce the classical recipe: 9x9 mean filter, threshold 225,
/// 21x7 closing element, four 3x3 erosions then four 3x3 dilations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorParams {
    /// Side of the square averaging window applied to the gradient image.
    pub blur_size: u32,
    /// Blurred gradient values at or above this become foreground.
    pub threshold: u8,
    /// Element used to bridge the gaps between bars.
    pub close_element: StructuringElement,
    pub erode_iterations: u32,
    pub dilate_iterations: u32,
    /// Blobs with an enclosed area at or below this (px²) are ignored.
    pub min_blob_area: f64,
}

impl Default for LocatorParams {
    fn default() -> Self {
        Self {
            blur_size: 9,
            threshold: 225,
            close_element: StructuringElement::rect(21, 7),
            erode_iterations: 4,
            dilate_iterations: 4,
            min_blob_area: 0.0,
        }
    }
}

/// Finds the bounding quad of the most barcode-like region in a frame.
#[derive(Clone, Debug, Default)]
pub struct GradientBarcodeLocator {
    params: LocatorParams,
}

impl GradientBarcodeLocator {
    pub fn new(params: LocatorParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &LocatorParams {
        &self.params
    }

    /// Rotated box around the largest striped blob, or `None` when the frame
    /// has no such region.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, frame), fields(width = frame.width(), height = frame.height()))
    )]
    pub fn locate(&self, frame: &Frame) -> Option<BoundingQuad> {
        self.locate_gray(&frame.to_gray())
    }

    pub fn locate_gray(&self, gray: &GrayImage) -> Option<BoundingQuad> {
        let mask = self.blob_mask(gray);

        let best = find_contours::<i32>(&mask)
            .into_iter()
            .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
            .map(|c| {
                let pts: Vec<Point2<i32>> = c.points.iter().map(|p| Point2::new(p.x, p.y)).collect();
                (signed_area(&pts).abs(), c)
            })
            .filter(|(area, _)| *area > self.params.min_blob_area)
            .max_by(|a, b| a.0.total_cmp(&b.0));

        let Some((area, contour)) = best else {
            log::trace!("no barcode blob");
            return None;
        };

        let rect = min_area_rect(&contour.points);
        let quad = BoundingQuad::from_unordered(rect.map(|p| Point2::new(p.x, p.y)));
        log::debug!(
            "barcode blob area {:.0} px² -> {:?}",
            area,
            quad.map(|q| q.points)
        );
        quad
    }

    /// Binary mask after gradient, blur, threshold and morphology (steps before
    /// contour extraction). Foreground is 255.
    pub fn blob_mask(&self, gray: &GrayImage) -> GrayImage {
        let p = &self.params;
        let gradient = gradient_difference(gray);

        let radius = p.blur_size / 2;
        let blurred = box_filter(&gradient, radius, radius);

        let mut mask = blurred;
        for px in mask.pixels_mut() {
            px.0[0] = if px.0[0] >= p.threshold { 255 } else { 0 };
        }

        let closed = close(&mask, p.close_element);
        let eroded = erode(&closed, StructuringElement::unit(), p.erode_iterations);
        dilate(&eroded, StructuringElement::unit(), p.dilate_iterations)
    }
}

/// `|Gx - Gy|` from 3x3 Scharr derivatives, saturated to 8 bits.
fn gradient_difference(gray: &GrayImage) -> GrayImage {
    let gx = horizontal_scharr(gray);
    let gy = vertical_scharr(gray);
    let mut out = GrayImage::new(gray.width(), gray.height());
    for ((dst, x), y) in out.pixels_mut().zip(gx.pixels()).zip(gy.pixels()) {
        let diff = (x.0[0] as i32 - y.0[0] as i32).unsigned_abs();
        *dst = Luma([diff.min(255) as u8]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiducam_core::PixelOrder;

    const W: u32 = 640;
    const H: u32 = 480;

    fn white() -> GrayImage {
        GrayImage::from_pixel(W, H, Luma([255]))
    }

    /// 2 px black/white bars filling `[x0, x0 + w) x [y0, y0 + h)`.
    fn striped(x0: u32, y0: u32, w: u32, h: u32, vertical_bars: bool) -> GrayImage {
        let mut img = white();
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                let k = if vertical_bars { x - x0 } else { y - y0 };
                if (k / 2) % 2 == 0 {
                    img.put_pixel(x, y, Luma([0]));
                }
            }
        }
        img
    }

    fn assert_region(quad: BoundingQuad, x0: u32, y0: u32, w: u32, h: u32) {
        let true_area = (w * h) as f64;
        let area = quad.area();
        assert!(
            (area - true_area).abs() / true_area < 0.2,
            "area {area} vs {true_area}"
        );
        let c = quad.centroid();
        let (cx, cy) = (x0 as f32 + w as f32 / 2.0, y0 as f32 + h as f32 / 2.0);
        assert!(
            (c.x - cx).abs() < 4.0 && (c.y - cy).abs() < 4.0,
            "centroid ({}, {}) vs ({cx}, {cy})",
            c.x,
            c.y
        );
        assert!(quad.is_simple());
    }

    #[test]
    fn black_frame_has_no_barcode() {
        let frame = Frame::filled(W, H, PixelOrder::Bgr, [0, 0, 0]).expect("frame");
        assert!(GradientBarcodeLocator::default().locate(&frame).is_none());
    }

    #[test]
    fn solid_shapes_are_not_barcodes() {
        let mut img = white();
        for y in 100..300 {
            for x in 150..450 {
                img.put_pixel(x, y, Luma([0]));
            }
        }
        assert!(GradientBarcodeLocator::default().locate_gray(&img).is_none());
    }

    #[test]
    fn vertical_bars_are_boxed() {
        let img = striped(200, 180, 200, 100, true);
        let quad = GradientBarcodeLocator::default()
            .locate_gray(&img)
            .expect("barcode region");
        assert_region(quad, 200, 180, 200, 100);
    }

    #[test]
    fn horizontal_bars_are_boxed() {
        let img = striped(260, 100, 120, 240, false);
        let quad = GradientBarcodeLocator::default()
            .locate_gray(&img)
            .expect("barcode region");
        assert_region(quad, 260, 100, 120, 240);
    }

    #[test]
    fn rotated_bars_get_a_tight_box() {
        // 200x100 vertical bars rotated by 25 degrees about the image center.
        let (cx, cy) = (W as f32 / 2.0, H as f32 / 2.0);
        let (sin, cos) = 25f32.to_radians().sin_cos();
        let mut img = white();
        for y in 0..H {
            for x in 0..W {
                let (dx, dy) = (x as f32 + 0.5 - cx, y as f32 + 0.5 - cy);
                let u = cos * dx + sin * dy + 100.0;
                let v = -sin * dx + cos * dy + 50.0;
                if (0.0..200.0).contains(&u) && (0.0..100.0).contains(&v) && (u as u32 / 2) % 2 == 0 {
                    img.put_pixel(x, y, Luma([0]));
                }
            }
        }
        let quad = GradientBarcodeLocator::default()
            .locate_gray(&img)
            .expect("barcode region");
        // An axis-aligned box around the rotated region would cover about twice the area.
        assert_region(quad, 220, 190, 200, 100);
    }

    #[test]
    fn largest_blob_wins() {
        let mut img = striped(60, 60, 80, 60, true);
        let big = striped(300, 200, 240, 160, true);
        for (x, y, px) in big.enumerate_pixels() {
            if px.0[0] == 0 {
                img.put_pixel(x, y, *px);
            }
        }
        let quad = GradientBarcodeLocator::default()
            .locate_gray(&img)
            .expect("barcode region");
        assert!(quad.centroid().x > 300.0);
    }

    #[test]
    fn frame_entry_point_matches_gray() {
        let img = striped(200, 180, 200, 100, true);
        let frame = Frame::from_gray_image(&img, PixelOrder::Bgr);
        let locator = GradientBarcodeLocator::default();
        assert_eq!(locator.locate(&frame), locator.locate_gray(&img));
    }

    #[test]
    fn params_fill_missing_fields_from_defaults() {
        let p: LocatorParams = serde_json::from_str(r#"{ "threshold": 200 }"#).expect("params");
        assert_eq!(p.threshold, 200);
        assert_eq!(p.blur_size, 9);
        assert_eq!(p.close_element, StructuringElement::rect(21, 7));
    }
}
