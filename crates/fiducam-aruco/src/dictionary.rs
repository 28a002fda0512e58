//! Dictionary metadata and packed marker codes.

use serde::{Deserialize, Serialize};

/// A fixed ArUco-style dictionary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dictionary {
    /// Human-readable name (for debugging/logging).
    pub name: &'static str,
    /// Marker side length (number of inner bits per side).
    pub marker_size: usize,
    /// Maximum error-correcting Hamming distance supported by the dictionary.
    pub max_correction_bits: u8,
    /// One `u64` per marker id, encoding the inner `marker_size × marker_size` bits.
    ///
    /// Bits are stored in row-major order with **black = 1**.
    pub codes: Vec<u64>,
}

impl Dictionary {
    /// Total number of inner bits per marker.
    #[inline]
    pub fn bit_count(&self) -> usize {
        self.marker_size * self.marker_size
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Inner bit at `(x, y)` of marker `id`; `true` is black.
    pub fn bit(&self, id: u32, x: usize, y: usize) -> Option<bool> {
        let code = *self.codes.get(id as usize)?;
        (x < self.marker_size && y < self.marker_size)
            .then(|| (code >> (y * self.marker_size + x)) & 1 == 1)
    }
}

/// Selects one of the predefined dictionaries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkerDictionary {
    #[default]
    #[serde(rename = "DICT_ARUCO_ORIGINAL")]
    ArucoOriginal,
}

impl MarkerDictionary {
    pub fn name(self) -> &'static str {
        match self {
            MarkerDictionary::ArucoOriginal => "DICT_ARUCO_ORIGINAL",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "DICT_ARUCO_ORIGINAL" => Some(MarkerDictionary::ArucoOriginal),
            _ => None,
        }
    }

    pub fn dictionary(self) -> Dictionary {
        match self {
            MarkerDictionary::ArucoOriginal => aruco_original(),
        }
    }
}

/// Look up a predefined dictionary by its OpenCV-style name.
pub fn builtin_dictionary(name: &str) -> Option<Dictionary> {
    MarkerDictionary::from_name(name).map(MarkerDictionary::dictionary)
}

/// Row patterns of the original ArUco markers; a set bit is a white cell.
const ARUCO_ORIGINAL_WORDS: [u8; 4] = [0x10, 0x17, 0x09, 0x0e];

/// Each of the five rows carries two bits of the id, most significant first.
fn aruco_original_code(id: u32) -> u64 {
    let mut code = 0u64;
    for y in 0..5 {
        let word = ARUCO_ORIGINAL_WORDS[((id >> (2 * (4 - y))) & 3) as usize];
        for x in 0..5 {
            if (word >> (4 - x)) & 1 == 0 {
                code |= 1 << (y * 5 + x);
            }
        }
    }
    code
}

fn aruco_original() -> Dictionary {
    Dictionary {
        name: MarkerDictionary::ArucoOriginal.name(),
        marker_size: 5,
        max_correction_bits: 0,
        codes: (0..1024).map(aruco_original_code).collect(),
    }
}
