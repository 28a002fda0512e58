//! Bit sampling of a marker quad through its perspective map.

use crate::threshold::otsu_threshold_from_samples;
use fiducam_core::{GrayImageView, Homography};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Decoder configuration for reading marker bits out of a candidate quad.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeParams {
    /// Marker border width in cells.
    pub border_bits: usize,
    /// Fraction of the quad side to ignore near its edges.
    pub inset_frac: f32,
    /// Require border-black ratio >= this.
    pub min_border_score: f32,
    /// Also try white-on-black markers.
    pub detect_inverted: bool,
    /// Quads whose shortest side spans fewer pixels per cell are skipped.
    pub min_cell_px: f32,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            border_bits: 1,
            inset_frac: 0.0,
            min_border_score: 0.8,
            detect_inverted: false,
            min_cell_px: 2.0,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct MarkerObservation {
    /// Observed inner bits (row-major, black=1).
    pub code: u64,
    pub border_score: f32,
    pub inverted: bool,
}

/// Sample positions in the canonical square `[0, cells]²`.
struct SampleGrid {
    cells: usize,
    points: Vec<Point2<f32>>, // row-major: cy * cells + cx
    threshold_points: Vec<Point2<f32>>,
}

impl SampleGrid {
    fn new(params: &DecodeParams, bits: usize) -> Option<Self> {
        let cells = bits + 2 * params.border_bits;
        if bits == 0 || bits * bits > 64 {
            return None;
        }

        let full = cells as f32;
        let inset = (params.inset_frac.clamp(0.0, 0.25)) * full;
        let side = full - 2.0 * inset;
        let step = side / full;

        let mut points = Vec::with_capacity(cells * cells);
        for cy in 0..cells {
            for cx in 0..cells {
                points.push(Point2::new(
                    inset + (cx as f32 + 0.5) * step,
                    inset + (cy as f32 + 0.5) * step,
                ));
            }
        }

        Some(Self {
            cells,
            points,
            threshold_points: build_threshold_points(inset, side, cells),
        })
    }
}

/// Reusable decoder for one dictionary size.
pub(crate) struct CellDecoder {
    params: DecodeParams,
    bits: usize,
    grid: SampleGrid,
    scratch_bits: Vec<u8>,
    scratch_thr: Vec<u8>,
}

impl CellDecoder {
    pub(crate) fn new(params: &DecodeParams, bits: usize) -> Option<Self> {
        let grid = SampleGrid::new(params, bits)?;
        let scratch_bits = Vec::with_capacity(grid.points.len());
        let scratch_thr = Vec::with_capacity(grid.threshold_points.len());
        Some(Self {
            params: params.clone(),
            bits,
            grid,
            scratch_bits,
            scratch_thr,
        })
    }

    /// Read the bit grid inside `quad` (TL, TR, BR, BL in image pixels).
    pub(crate) fn decode_quad(
        &mut self,
        img: &GrayImageView<'_>,
        quad: &[Point2<f32>; 4],
    ) -> Option<MarkerObservation> {
        let min_side = (0..4)
            .map(|i| (quad[(i + 1) % 4] - quad[i]).norm())
            .fold(f32::INFINITY, f32::min);
        if min_side < self.params.min_cell_px * self.grid.cells as f32 {
            return None;
        }
        let h = Homography::square_to_quad(self.grid.cells as f32, quad)?;

        self.scratch_bits.clear();
        for p in &self.grid.points {
            let q = h.apply(*p);
            let v = sample_mean_3x3(img, q.x, q.y)?;
            self.scratch_bits.push(v);
        }

        self.scratch_thr.clear();
        for p in &self.grid.threshold_points {
            let q = h.apply(*p);
            if let Some(v) = sample_mean_3x3(img, q.x, q.y) {
                self.scratch_thr.push(v);
            }
        }

        decode_samples(
            &self.scratch_bits,
            &self.scratch_thr,
            self.grid.cells,
            self.bits,
            &self.params,
        )
    }
}

fn decode_samples(
    samples: &[u8],
    thr_samples: &[u8],
    cells: usize,
    bits: usize,
    params: &DecodeParams,
) -> Option<MarkerObservation> {
    if samples.len() != cells * cells {
        return None;
    }

    let thr = if thr_samples.is_empty() {
        otsu_threshold_from_samples(samples)
    } else {
        otsu_threshold_from_samples(thr_samples)
    };

    let border = params.border_bits;
    let polarities: &[bool] = if params.detect_inverted { &[false, true] } else { &[false] };
    let mut best: Option<MarkerObservation> = None;

    for &inverted in polarities {
        let mut border_ok = 0u32;
        let mut border_total = 0u32;
        let mut code: u64 = 0;

        for cy in 0..cells {
            for cx in 0..cells {
                let is_black = (samples[cy * cells + cx] <= thr) != inverted;
                let is_border =
                    border > 0 && (cx < border || cy < border || cx + border >= cells || cy + border >= cells);
                if is_border {
                    border_total += 1;
                    border_ok += is_black as u32;
                } else if is_black {
                    code |= 1u64 << ((cy - border) * bits + (cx - border));
                }
            }
        }

        let border_score = if border_total > 0 {
            border_ok as f32 / border_total as f32
        } else {
            1.0
        };
        if border_score < params.min_border_score {
            continue;
        }
        if best.is_none_or(|b| border_score > b.border_score) {
            best = Some(MarkerObservation {
                code,
                border_score,
                inverted,
            });
        }
    }

    best
}

fn build_threshold_points(start: f32, side: f32, cells: usize) -> Vec<Point2<f32>> {
    const THRESH_SUBDIV: usize = 3;
    let grid = cells * THRESH_SUBDIV;
    let step = side / grid as f32;
    let mut points = Vec::with_capacity(grid * grid);
    for ty in 0..grid {
        for tx in 0..grid {
            points.push(Point2::new(
                start + (tx as f32 + 0.5) * step,
                start + (ty as f32 + 0.5) * step,
            ));
        }
    }
    points
}

fn sample_mean_3x3(img: &GrayImageView<'_>, x: f32, y: f32) -> Option<u8> {
    let ix = x.floor() as i32;
    let iy = y.floor() as i32;
    let mut sum = 0u32;
    for dy in -1..=1 {
        for dx in -1..=1 {
            sum += img.get(ix + dx, iy + dy)? as u32;
        }
    }
    Some((sum / 9) as u8)
}
