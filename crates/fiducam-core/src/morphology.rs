//! Rectangular grayscale morphology on top of `imageproc::morphology`.
//!
//! Pixels outside the image never take part in the min/max: an erosion does
//! not eat into blobs touching the border and a dilation does not grow from
//! it.

use ::image::{GrayImage, Luma};
use imageproc::morphology::{grayscale_close, grayscale_dilate, grayscale_erode, Mask};
use serde::{Deserialize, Serialize};

/// Largest side accepted by [`Mask::from_image`].
const MAX_SIDE: u32 = 511;

/// Rectangular structuring element anchored at its center
/// (`width / 2`, `height / 2`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuringElement {
    pub width: u32,
    pub height: u32,
}

impl StructuringElement {
    pub const fn rect(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// The 3x3 square used when no element is given.
    pub const fn unit() -> Self {
        Self::rect(3, 3)
    }

    /// Sides clamped to `1..=511`.
    fn sides(&self) -> (u32, u32) {
        (self.width.clamp(1, MAX_SIDE), self.height.clamp(1, MAX_SIDE))
    }

    pub fn mask(&self) -> Mask {
        let (w, h) = self.sides();
        let footprint = GrayImage::from_pixel(w, h, Luma([255]));
        // Sides are at most 511, so the halves fit in a u8.
        Mask::from_image(&footprint, (w / 2) as u8, (h / 2) as u8)
    }
}

impl Default for StructuringElement {
    fn default() -> Self {
        Self::unit()
    }
}

/// Local maximum over `se`, repeated `iterations` times.
pub fn dilate(img: &GrayImage, se: StructuringElement, iterations: u32) -> GrayImage {
    let mask = se.mask();
    let mut out = img.clone();
    for _ in 0..iterations {
        out = grayscale_dilate(&out, &mask);
    }
    out
}

/// Local minimum over `se`, repeated `iterations` times.
pub fn erode(img: &GrayImage, se: StructuringElement, iterations: u32) -> GrayImage {
    let mask = se.mask();
    let mut out = img.clone();
    for _ in 0..iterations {
        out = grayscale_erode(&out, &mask);
    }
    out
}

/// Dilation followed by erosion with the same element: fills gaps narrower
/// than the element.
pub fn close(img: &GrayImage, se: StructuringElement) -> GrayImage {
    grayscale_close(img, &se.mask())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(w: u32, h: u32) -> GrayImage {
        GrayImage::new(w, h)
    }

    fn count_set(img: &GrayImage) -> usize {
        img.as_raw().iter().filter(|&&v| v > 0).count()
    }

    #[test]
    fn dilate_grows_single_pixel_to_element() {
        let mut img = blank(30, 20);
        img.put_pixel(15, 10, Luma([255]));
        let out = dilate(&img, StructuringElement::rect(21, 7), 1);
        assert_eq!(count_set(&out), 21 * 7);
        assert_eq!(out.get_pixel(5, 7).0[0], 255);
        assert_eq!(out.get_pixel(25, 13).0[0], 255);
        assert_eq!(out.get_pixel(26, 13).0[0], 0);
    }

    #[test]
    fn erode_removes_specks_but_not_border_blobs() {
        let mut img = blank(20, 20);
        img.put_pixel(10, 10, Luma([255]));
        for y in 0..6 {
            for x in 0..6 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        let out = erode(&img, StructuringElement::unit(), 1);
        assert_eq!(out.get_pixel(10, 10).0[0], 0);
        // The corner blob only loses its inner rim.
        assert_eq!(out.get_pixel(0, 0).0[0], 255);
        assert_eq!(out.get_pixel(4, 4).0[0], 255);
        assert_eq!(out.get_pixel(5, 5).0[0], 0);
    }

    #[test]
    fn close_bridges_gaps_between_bars() {
        // Two vertical bars separated by a 6 px gap.
        let mut img = blank(40, 20);
        for y in 5..15 {
            for x in (10..14).chain(20..24) {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        let out = close(&img, StructuringElement::rect(21, 7));
        for x in 10..24 {
            assert_eq!(out.get_pixel(x, 10).0[0], 255, "gap at x={x}");
        }
        assert_eq!(out.get_pixel(30, 10).0[0], 0);
    }

    #[test]
    fn oversized_elements_are_clamped() {
        let se = StructuringElement::rect(4000, 0);
        assert_eq!(se.sides(), (511, 1));
        let img = blank(8, 8);
        assert_eq!(dilate(&img, se, 1), img);
    }
}
