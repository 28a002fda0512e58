//! Core types shared by the fiducam detectors and acquisition pipeline.
//!
//! Nothing in here knows about barcodes or markers. The crate owns the
//! [`Frame`] model handed between pipeline stages, geometric primitives,
//! a bounds-checked grayscale view, binary morphology, the
//! drawing helpers used for annotated frames, and the process logger.

mod font;
mod frame;
mod geometry;
mod gray;
mod homography;
mod logger;
mod morphology;
pub mod overlay;

pub use frame::{Frame, FrameError, PixelOrder};
pub use geometry::{centroid, is_convex, signed_area, AxisRect, BoundingQuad};
pub use gray::GrayImageView;
pub use homography::{homography_from_4pt, Homography};
pub use morphology::{close, dilate, erode, StructuringElement};
pub use overlay::OverlayStyle;

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
