//! Captured video frames.
//!
//! A [`Frame`] is an immutable 3-channel pixel grid. Every transformation
//! (grayscale, resize, mirror, reorder) returns a new frame or image, so a
//! frame handed to a display collaborator is always a copy and never aliases
//! the buffer a pipeline stage is still reading.

use ::image::{imageops, GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

/// Channel order of a packed 3-channel frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelOrder {
    /// Blue, green, red. What most capture backends deliver.
    #[default]
    Bgr,
    Rgb,
}

impl PixelOrder {
    /// Byte offsets of (red, green, blue) inside one pixel.
    #[inline]
    fn rgb_offsets(self) -> [usize; 3] {
        match self {
            PixelOrder::Bgr => [2, 1, 0],
            PixelOrder::Rgb => [0, 1, 2],
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("invalid frame dimensions (width={width}, height={height})")]
    Dimensions { width: u32, height: u32 },

    #[error("row stride {stride} is shorter than {min} bytes")]
    Stride { stride: usize, min: usize },

    #[error("invalid frame buffer length (expected at least {expected} bytes, got {got})")]
    BufferSize { expected: usize, got: usize },
}

/// A 3-channel, 8-bit frame with an explicit row stride.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    stride: usize,
    order: PixelOrder,
    timestamp_ms: u64,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap a tightly packed buffer (`stride == 3 * width`).
    pub fn new(width: u32, height: u32, order: PixelOrder, data: Vec<u8>) -> Result<Self, FrameError> {
        Self::with_stride(width, height, width as usize * 3, order, data)
    }

    /// Wrap a buffer whose rows may carry trailing padding.
    pub fn with_stride(
        width: u32,
        height: u32,
        stride: usize,
        order: PixelOrder,
        data: Vec<u8>,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::Dimensions { width, height });
        }
        let min = width as usize * 3;
        if stride < min {
            return Err(FrameError::Stride { stride, min });
        }
        // The last row does not need its padding.
        let expected = stride * (height as usize - 1) + min;
        if data.len() < expected {
            return Err(FrameError::BufferSize {
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            stride,
            order,
            timestamp_ms: 0,
            data,
        })
    }

    /// A frame with every pixel set to `rgb`.
    pub fn filled(width: u32, height: u32, order: PixelOrder, rgb: [u8; 3]) -> Result<Self, FrameError> {
        let [r, g, b] = rgb;
        let px = match order {
            PixelOrder::Bgr => [b, g, r],
            PixelOrder::Rgb => [r, g, b],
        };
        let data = px
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self::new(width, height, order, data)
    }

    pub fn from_rgb_image(img: &RgbImage) -> Self {
        Self {
            width: img.width(),
            height: img.height(),
            stride: img.width() as usize * 3,
            order: PixelOrder::Rgb,
            timestamp_ms: 0,
            data: img.as_raw().clone(),
        }
    }

    /// Replicate a grayscale image into all three channels.
    pub fn from_gray_image(img: &GrayImage, order: PixelOrder) -> Self {
        let data = img.as_raw().iter().flat_map(|&v| [v, v, v]).collect();
        Self {
            width: img.width(),
            height: img.height(),
            stride: img.width() as usize * 3,
            order,
            timestamp_ms: 0,
            data,
        }
    }

    pub fn with_timestamp(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    pub fn order(&self) -> PixelOrder {
        self.order
    }

    #[inline]
    pub fn channels(&self) -> u8 {
        3
    }

    /// Capture time in milliseconds since the Unix epoch (0 if unknown).
    #[inline]
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    /// Raw bytes including any row padding.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize * 3]
    }

    /// Pixel at `(x, y)` as `[r, g, b]`, regardless of storage order.
    pub fn rgb_at(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let px = &self.row(y)[x as usize * 3..x as usize * 3 + 3];
        let [ri, gi, bi] = self.order.rgb_offsets();
        Some([px[ri], px[gi], px[bi]])
    }

    /// Packed RGB copy of this frame.
    pub fn to_rgb_image(&self) -> RgbImage {
        let [ri, gi, bi] = self.order.rgb_offsets();
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize * 3);
        for y in 0..self.height {
            for px in self.row(y).chunks_exact(3) {
                out.extend_from_slice(&[px[ri], px[gi], px[bi]]);
            }
        }
        RgbImage::from_raw(self.width, self.height, out)
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }

    /// Single-channel intensity using BT.601 luma weights in 14-bit fixed point.
    pub fn to_gray(&self) -> GrayImage {
        const R: u32 = 4899;
        const G: u32 = 9617;
        const B: u32 = 1868;
        let [ri, gi, bi] = self.order.rgb_offsets();
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize);
        for y in 0..self.height {
            for px in self.row(y).chunks_exact(3) {
                let v = px[ri] as u32 * R + px[gi] as u32 * G + px[bi] as u32 * B;
                out.push(((v + (1 << 13)) >> 14) as u8);
            }
        }
        GrayImage::from_raw(self.width, self.height, out)
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }

    /// Copy of this frame in the requested channel order.
    pub fn to_order(&self, order: PixelOrder) -> Frame {
        if order == self.order {
            return self.clone();
        }
        let mut data = Vec::with_capacity(self.width as usize * self.height as usize * 3);
        for y in 0..self.height {
            for px in self.row(y).chunks_exact(3) {
                data.extend_from_slice(&[px[2], px[1], px[0]]);
            }
        }
        Frame {
            width: self.width,
            height: self.height,
            stride: self.width as usize * 3,
            order,
            timestamp_ms: self.timestamp_ms,
            data,
        }
    }

    /// Resize to `width` pixels wide, keeping the aspect ratio.
    pub fn resized_to_width(&self, width: u32) -> Frame {
        if width == 0 || width == self.width {
            return self.clone();
        }
        let scale = width as f64 / self.width as f64;
        let height = ((self.height as f64 * scale).round() as u32).max(1);
        let resized = imageops::resize(
            &self.to_rgb_image(),
            width,
            height,
            imageops::FilterType::Triangle,
        );
        self.replace_pixels(&resized)
    }

    /// Mirror around the vertical axis.
    pub fn flipped_horizontal(&self) -> Frame {
        let flipped = imageops::flip_horizontal(&self.to_rgb_image());
        self.replace_pixels(&flipped)
    }

    /// New frame with `rgb`'s pixels, keeping this frame's order and timestamp.
    pub fn replace_pixels(&self, rgb: &RgbImage) -> Frame {
        Frame::from_rgb_image(rgb)
            .to_order(self.order)
            .with_timestamp(self.timestamp_ms)
    }
}
