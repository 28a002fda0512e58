//! Dictionary matching and rotation helpers.

use crate::Dictionary;

/// A dictionary match for an observed marker code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Match {
    /// Marker id in the dictionary.
    pub id: u32,
    /// Rotation `0..=3` such that `observed_code == rotate(dict_code, rotation)`.
    pub rotation: u8,
    /// Hamming distance between observed and dictionary code (after rotation).
    pub hamming: u8,
}

/// Brute-force matcher over all ids and rotations of a fixed dictionary.
#[derive(Clone, Debug)]
pub struct Matcher {
    dict: Dictionary,
    max_hamming: u8,
    rotated: Vec<[u64; 4]>,
}

impl Matcher {
    /// Build a matcher for the given dictionary and Hamming threshold.
    pub fn new(dict: Dictionary, max_hamming: u8) -> Self {
        let bits = dict.bit_count();
        assert!(
            bits <= 64,
            "marker_size {} implies {} bits > 64 (unsupported)",
            dict.marker_size,
            bits
        );
        let n = dict.marker_size;
        let rotated = dict
            .codes
            .iter()
            .map(|&base| [0u8, 1, 2, 3].map(|rot| rotate_code_u64(base, n, rot)))
            .collect();
        Self {
            dict,
            max_hamming,
            rotated,
        }
    }

    #[inline]
    pub fn dictionary(&self) -> &Dictionary {
        &self.dict
    }

    #[inline]
    pub fn max_hamming(&self) -> u8 {
        self.max_hamming
    }

    /// Find the best match within `max_hamming`.
    ///
    /// Rotations are searched in the outer loop so an exact upright match
    /// wins over an exact match of a rotated id.
    pub fn match_code(&self, observed: u64) -> Option<Match> {
        let mut best: Option<Match> = None;

        for rot in 0..4usize {
            for (id, rots) in self.rotated.iter().enumerate() {
                let h = (observed ^ rots[rot]).count_ones() as u8;
                if h > self.max_hamming {
                    continue;
                }
                let m = Match {
                    id: id as u32,
                    rotation: rot as u8,
                    hamming: h,
                };
                if h == 0 {
                    return Some(m);
                }
                if best.is_none_or(|prev| m.hamming < prev.hamming) {
                    best = Some(m);
                }
            }
        }

        best
    }
}

/// Rotate a code stored in row-major bits (`idx = y * n + x`) by
/// `rot` quarter turns clockwise.
pub fn rotate_code_u64(code: u64, n: usize, rot: u8) -> u64 {
    let rot = rot & 3;
    if rot == 0 {
        return code;
    }

    let mut out = 0u64;
    for y in 0..n {
        for x in 0..n {
            let (sx, sy) = match rot {
                1 => (y, n - 1 - x),
                2 => (n - 1 - x, n - 1 - y),
                _ => (n - 1 - y, x),
            };
            out |= ((code >> (sy * n + sx)) & 1) << (y * n + x);
        }
    }
    out
}
