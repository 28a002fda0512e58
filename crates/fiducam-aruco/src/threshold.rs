//! Thresholding utilities for candidate search and bit decoding.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::integral_image::{integral_image, sum_image_pixels};

/// Compute Otsu threshold from a set of sample intensities.
pub(crate) fn otsu_threshold_from_samples(samples: &[u8]) -> u8 {
    if samples.is_empty() {
        return 127;
    }

    let (min_v, max_v) = samples
        .iter()
        .fold((255u8, 0u8), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if min_v == max_v {
        return min_v;
    }

    let mut hist = [0u32; 256];
    for &v in samples {
        hist[v as usize] += 1;
    }
    if hist.iter().filter(|&&h| h > 0).count() <= 2 {
        return ((min_v as u16 + max_v as u16) / 2) as u8;
    }

    let total = samples.len() as f64;
    let sum_total: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &h)| i as f64 * h as f64)
        .sum();

    let mut sum_b = 0f64;
    let mut w_b = 0f64;
    let mut best_var = -1f64;
    let mut best_t = 127u8;

    for (t, &h) in hist.iter().enumerate() {
        w_b += h as f64;
        if w_b < 1.0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f < 1.0 {
            break;
        }

        sum_b += t as f64 * h as f64;
        let m_b = sum_b / w_b;
        let m_f = (sum_total - sum_b) / w_f;

        let var_between = w_b * w_f * (m_b - m_f) * (m_b - m_f);
        if var_between > best_var {
            best_var = var_between;
            best_t = t as u8;
        }
    }

    best_t
}

/// Summed-area table as produced by `imageproc`: one zero row and column in
/// front of the image.
pub(crate) type Integral = ImageBuffer<Luma<u64>, Vec<u64>>;

pub(crate) fn integral(img: &GrayImage) -> Integral {
    integral_image::<_, u64>(img)
}

/// Mean over the window of half-size `r` centred on `(x, y)`, clipped to
/// the image.
fn window_mean(integral: &Integral, x: u32, y: u32, r: u32) -> f32 {
    // The table is one pixel larger than the image on each axis.
    let (w, h) = (integral.width() - 1, integral.height() - 1);
    let (x0, y0) = (x.saturating_sub(r), y.saturating_sub(r));
    let (x1, y1) = ((x + r).min(w - 1), (y + r).min(h - 1));
    let sum = sum_image_pixels(integral, x0, y0, x1, y1)[0];
    sum as f32 / ((x1 - x0 + 1) * (y1 - y0 + 1)) as f32
}

/// Inverted adaptive mean threshold: a pixel becomes 255 when it is at least
/// `c` darker than the mean of its `window × window` neighbourhood.
///
/// `imageproc::contrast::adaptive_threshold` has no offset, hence this one.
pub(crate) fn adaptive_threshold_inv(img: &GrayImage, integral: &Integral, window: u32, c: f32) -> GrayImage {
    let r = window.max(3) / 2;
    let mut out = GrayImage::new(img.width(), img.height());
    for (x, y, p) in img.enumerate_pixels() {
        if p.0[0] as f32 <= window_mean(integral, x, y, r) - c {
            out.put_pixel(x, y, Luma([255]));
        }
    }
    out
}
