//! Square fiducial marker detection.
//!
//! The detector follows the usual ArUco recipe:
//! - adaptive thresholding at a few window sizes,
//! - contour extraction and polygon approximation down to convex quads,
//! - perspective sampling of each quad into a bit grid (border + payload),
//! - dictionary lookup over the four rotations,
//! - merging of decodes that describe the same physical marker.
//!
//! Dictionaries are fixed per detector instance. The only built-in one is the
//! original ArUco dictionary (1024 ids, 5x5 bits), generated from its row
//! words instead of being stored as a table.

mod candidates;
mod decode;
mod detector;
mod dictionary;
mod matcher;
mod render;
mod threshold;

pub use candidates::CandidateParams;
pub use decode::DecodeParams;
pub use detector::{
    draw_markers, FiducialMarker, FiducialMarkerDetector, MarkerDetection, MarkerDetectorParams,
};
pub use dictionary::{builtin_dictionary, Dictionary, MarkerDictionary};
pub use matcher::{rotate_code_u64, Match, Matcher};
pub use render::render_marker;
