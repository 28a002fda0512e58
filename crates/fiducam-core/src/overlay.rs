//! Drawing primitives for annotated frames.
//!
//! All functions draw onto an `RgbImage` in place and clip at the image
//! border. Callers get an owned canvas from [`Frame::to_rgb_image`] and turn
//! it back into a frame with [`Frame::replace_pixels`], so the source frame
//! is never touched.
//!
//! [`Frame::to_rgb_image`]: crate::Frame::to_rgb_image
//! [`Frame::replace_pixels`]: crate::Frame::replace_pixels

use ::image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut,
};
use imageproc::rect::Rect;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::font::glyph_bits;
use crate::AxisRect;

/// Colors (RGB) and sizes used when annotating frames.
///
/// Every detector has its own stroke color: the barcode locator and marker
/// outlines are green, decoded symbols and marker centroids are red.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayStyle {
    pub barcode_color: [u8; 3],
    pub symbol_color: [u8; 3],
    pub marker_color: [u8; 3],
    pub centroid_color: [u8; 3],
    pub status_color: [u8; 3],
    /// Stroke width in pixels for outlines.
    pub thickness: u32,
    pub centroid_radius: i32,
    /// Text size; `0.5` draws 14 px tall capitals.
    pub font_scale: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            barcode_color: [0, 255, 0],
            symbol_color: [255, 0, 0],
            marker_color: [0, 255, 0],
            centroid_color: [255, 0, 0],
            status_color: [255, 0, 0],
            thickness: 2,
            centroid_radius: 4,
            font_scale: 0.5,
        }
    }
}

/// Closed polyline through `points`.
pub fn draw_polygon(canvas: &mut RgbImage, points: &[Point2<f32>], color: [u8; 3], thickness: u32) {
    let n = points.len();
    if n < 2 {
        return;
    }
    let t = thickness.max(1) as i32;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        // Thick strokes are the same segment offset over a t x t block.
        for dy in 0..t {
            for dx in 0..t {
                let (ox, oy) = ((dx - t / 2) as f32, (dy - t / 2) as f32);
                draw_line_segment_mut(canvas, (a.x + ox, a.y + oy), (b.x + ox, b.y + oy), Rgb(color));
            }
        }
    }
}

/// Hollow axis-aligned box growing inwards with `thickness`.
pub fn draw_rect(canvas: &mut RgbImage, rect: AxisRect, color: [u8; 3], thickness: u32) {
    for i in 0..thickness.max(1) {
        let (w, h) = (rect.width.saturating_sub(2 * i), rect.height.saturating_sub(2 * i));
        if w == 0 || h == 0 {
            break;
        }
        let r = Rect::at(rect.x + i as i32, rect.y + i as i32).of_size(w, h);
        draw_hollow_rect_mut(canvas, r, Rgb(color));
    }
}

pub fn draw_dot(canvas: &mut RgbImage, center: Point2<f32>, radius: i32, color: [u8; 3]) {
    let c = (center.x.round() as i32, center.y.round() as i32);
    draw_filled_circle_mut(canvas, c, radius.max(1), Rgb(color));
}

#[inline]
fn glyph_scale(font_scale: f32) -> u32 {
    ((font_scale * 4.0).round() as u32).max(1)
}

/// Width and height in pixels of `text` at `font_scale`.
pub fn text_size(text: &str, font_scale: f32) -> (u32, u32) {
    let s = glyph_scale(font_scale);
    let n = text.chars().count() as u32;
    (n * 6 * s, 7 * s)
}

/// Draw `text` with its bottom-left corner at `(x, y)`.
///
/// Characters without a glyph are drawn as a hollow box.
pub fn draw_text(canvas: &mut RgbImage, x: i32, y: i32, text: &str, color: [u8; 3], font_scale: f32) {
    let s = glyph_scale(font_scale);
    let top = y - 7 * s as i32;
    let mut pen = x;
    for ch in text.chars() {
        match glyph_bits(ch) {
            Some(rows) => {
                for (row, bits) in rows.iter().enumerate() {
                    for col in 0..5 {
                        if (bits >> (4 - col)) & 1 == 1 {
                            let px = pen + (col * s) as i32;
                            let py = top + (row as u32 * s) as i32;
                            draw_filled_rect_mut(canvas, Rect::at(px, py).of_size(s, s), Rgb(color));
                        }
                    }
                }
            }
            None => {
                let r = Rect::at(pen, top).of_size(5 * s, 7 * s);
                draw_hollow_rect_mut(canvas, r, Rgb(color));
            }
        }
        pen += 6 * s as i32;
    }
}
