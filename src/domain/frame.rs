//! Pixel layout conversions between the image decoder and the detector.
//!
//! Decoders hand back RGB rows while the detector consumes frames in the
//! reversed-channel (BGR, OpenCV-style) convention it was trained with. The
//! frame is kept as an `(height, width, 3)` array so the conversion is a pure
//! axis reversal.

use image::RgbImage;
use ndarray::{s, Array3, ArrayView3};

use super::errors::{DomainError, DomainResult};

/// Reverses the channel axis: RGB array in, BGR array out, same shape.
///
/// Every channel is kept; only their order changes.
pub fn rgb_to_bgr(rgb: ArrayView3<'_, u8>) -> Array3<u8> {
    rgb.slice(s![.., .., ..;-1]).to_owned()
}

/// A decoded image in `(height, width, 3)` BGR layout.
#[derive(Debug, Clone, PartialEq)]
pub struct BgrFrame {
    pixels: Array3<u8>,
}

impl BgrFrame {
    pub fn from_rgb_image(rgb: RgbImage) -> DomainResult<Self> {
        let (w, h) = rgb.dimensions();
        let rgb = Array3::from_shape_vec((h as usize, w as usize, 3), rgb.into_raw())
            .map_err(|e| DomainError::Decode(format!("unexpected pixel buffer: {e}")))?;
        Ok(Self { pixels: rgb_to_bgr(rgb.view()) })
    }

    pub fn width(&self) -> u32 {
        self.pixels.shape()[1] as u32
    }

    pub fn height(&self) -> u32 {
        self.pixels.shape()[0] as u32
    }

    pub fn pixels(&self) -> ArrayView3<'_, u8> {
        self.pixels.view()
    }

    /// Back to the RGB ordering expected by `image` resizing and by the
    /// network input.
    pub fn to_rgb_image(&self) -> DomainResult<RgbImage> {
        let raw: Vec<u8> = self.pixels.slice(s![.., .., ..;-1]).iter().copied().collect();
        RgbImage::from_raw(self.width(), self.height(), raw)
            .ok_or_else(|| DomainError::OperationFailed("frame buffer size mismatch".into()))
    }
}
