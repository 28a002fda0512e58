//! Quad candidates from adaptive thresholding and contour approximation.

use crate::threshold::{adaptive_threshold_inv, integral};
use fiducam_core::{is_convex, signed_area};
use image::GrayImage;
use imageproc::contours::find_contours;
use imageproc::geometry::approximate_polygon_dp;
use imageproc::point::Point;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Candidate search parameters. Rates are relative to the larger image
/// dimension or to the contour length.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateParams {
    /// Adaptive threshold window sizes, one binarisation per entry.
    pub threshold_windows: Vec<u32>,
    /// A pixel is foreground when it is this much darker than its window mean.
    pub threshold_constant: f32,
    pub min_perimeter_rate: f32,
    pub max_perimeter_rate: f32,
    /// Polygon approximation tolerance per contour point.
    pub approx_accuracy_rate: f32,
    /// Shortest allowed quad side per contour point.
    pub min_corner_distance_rate: f32,
    /// Corners closer than this to the image border are rejected.
    pub min_border_distance: u32,
    /// Two quads whose corners all lie within this fraction of the shorter
    /// side of each other are the same candidate.
    pub duplicate_corner_rate: f32,
    /// Decoded markers whose centres are closer than this fraction of the
    /// shorter side are one marker seen twice.
    pub duplicate_center_rate: f32,
}

impl Default for CandidateParams {
    fn default() -> Self {
        Self {
            threshold_windows: vec![3, 13, 23],
            threshold_constant: 7.0,
            min_perimeter_rate: 0.03,
            max_perimeter_rate: 4.0,
            approx_accuracy_rate: 0.03,
            min_corner_distance_rate: 0.05,
            min_border_distance: 3,
            duplicate_corner_rate: 0.1,
            duplicate_center_rate: 0.25,
        }
    }
}

/// Convex quad, clockwise in image coordinates, starting at the corner
/// nearest to the image origin.
#[derive(Clone, Debug)]
pub(crate) struct Candidate {
    pub corners: [Point2<f32>; 4],
    pub perimeter: f32,
}

impl Candidate {
    pub fn min_side(&self) -> f32 {
        (0..4)
            .map(|i| (self.corners[(i + 1) % 4] - self.corners[i]).norm())
            .fold(f32::INFINITY, f32::min)
    }
}

pub(crate) fn find_candidates(gray: &GrayImage, params: &CandidateParams) -> Vec<Candidate> {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return Vec::new();
    }
    let max_dim = w.max(h) as f32;
    let min_len = (params.min_perimeter_rate * max_dim).max(4.0);
    let max_len = params.max_perimeter_rate * max_dim;

    let table = integral(gray);
    let mut out = Vec::new();

    for &window in &params.threshold_windows {
        let bin = adaptive_threshold_inv(gray, &table, window, params.threshold_constant);
        for contour in find_contours::<i32>(&bin) {
            let n = contour.points.len() as f32;
            if n < min_len || n > max_len {
                continue;
            }
            let poly = simplify_contour(&contour.points, n * params.approx_accuracy_rate);
            let Some(candidate) = quad_candidate(&poly, n, w, h, params) else {
                continue;
            };
            out.push(candidate);
        }
    }

    log::trace!("{} raw marker candidates", out.len());
    dedup_candidates(out, params.duplicate_corner_rate)
}

/// Closed Douglas-Peucker simplification of a contour.
pub(crate) fn simplify_contour(points: &[Point<i32>], epsilon: f32) -> Vec<Point2<f32>> {
    if points.len() < 3 {
        return points.iter().map(|p| Point2::new(p.x as f32, p.y as f32)).collect();
    }
    approximate_polygon_dp(points, f64::from(epsilon).max(f64::EPSILON), true)
        .into_iter()
        .map(|p| Point2::new(p.x as f32, p.y as f32))
        .collect()
}

fn quad_candidate(
    poly: &[Point2<f32>],
    contour_len: f32,
    width: u32,
    height: u32,
    params: &CandidateParams,
) -> Option<Candidate> {
    if poly.len() != 4 || !is_convex(poly) {
        return None;
    }
    let mut corners = [poly[0], poly[1], poly[2], poly[3]];
    if signed_area(&corners) < 0.0 {
        corners.reverse();
    }
    let start = (0..4)
        .min_by(|&a, &b| (corners[a].x + corners[a].y).total_cmp(&(corners[b].x + corners[b].y)))
        .unwrap_or(0);
    corners.rotate_left(start);

    let perimeter: f32 = (0..4).map(|i| (corners[(i + 1) % 4] - corners[i]).norm()).sum();
    let candidate = Candidate { corners, perimeter };

    let min_side = params.min_corner_distance_rate * contour_len;
    if candidate.min_side() < min_side {
        return None;
    }

    let d = params.min_border_distance as f32;
    let inside = candidate
        .corners
        .iter()
        .all(|p| p.x >= d && p.y >= d && p.x <= width as f32 - 1.0 - d && p.y <= height as f32 - 1.0 - d);
    inside.then_some(candidate)
}

/// Largest corner displacement between two quads over the four cyclic
/// pairings of their corners.
pub(crate) fn corner_distance(a: &[Point2<f32>; 4], b: &[Point2<f32>; 4]) -> f32 {
    (0..4)
        .map(|shift| {
            (0..4)
                .map(|i| (a[i] - b[(i + shift) % 4]).norm())
                .fold(0.0f32, f32::max)
        })
        .fold(f32::INFINITY, f32::min)
}

/// Keep the longest of every group of quads tracing the same edge. Nested
/// quads, such as a marker border and the quiet zone around it, are kept
/// apart because their corners do not coincide.
fn dedup_candidates(mut candidates: Vec<Candidate>, rate: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.perimeter.total_cmp(&a.perimeter));
    let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for c in candidates {
        let duplicate = kept
            .iter()
            .any(|k| corner_distance(&k.corners, &c.corners) < rate * c.min_side().min(k.min_side()));
        if !duplicate {
            kept.push(c);
        }
    }
    kept
}
