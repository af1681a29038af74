//! Host-side RGB images and PNG I/O.

use crate::error::{Result, RuinaError};
use std::path::Path;

/// `height × width × 3` row-major RGB pixels as `f32`.
///
/// Values are raw `[0, 255]` until normalized; the type does not track which.
#[derive(Clone, Debug, PartialEq)]
pub struct RgbImage32 {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl RgbImage32 {
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> Self {
        assert_eq!(
            data.len(),
            width * height * 3,
            "RGB buffer must hold width * height * 3 values"
        );
        Self {
            width,
            height,
            data,
        }
    }

    pub fn filled(width: usize, height: usize, rgb: [f32; 3]) -> Self {
        let data = rgb.iter().copied().cycle().take(width * height * 3).collect();
        Self::new(width, height, data)
    }

    /// `[height, width]`, the order image tensors use.
    pub fn dims(&self) -> [usize; 2] {
        [self.height, self.width]
    }

    pub fn pixel(&self, x: usize, y: usize) -> [f32; 3] {
        let i = (y * self.width + x) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, rgb: [f32; 3]) {
        let i = (y * self.width + x) * 3;
        self.data[i..i + 3].copy_from_slice(&rgb);
    }

    /// Error unless `other` has the same width and height.
    pub fn ensure_same_dims(&self, other: &RgbImage32) -> Result<()> {
        if self.dims() == other.dims() {
            Ok(())
        } else {
            Err(RuinaError::ShapeMismatch {
                expected: self.dims().to_vec(),
                actual: other.dims().to_vec(),
            })
        }
    }
}

/// Decode any PNG into three 8-bit channels widened to `f32`.
pub fn load_png(path: impl AsRef<Path>) -> Result<RgbImage32> {
    let rgb = image::open(path.as_ref())?.to_rgb8();
    let (width, height) = (rgb.width() as usize, rgb.height() as usize);
    let data = rgb.into_raw().into_iter().map(f32::from).collect();
    Ok(RgbImage32::new(width, height, data))
}

/// Write pixels in `[0, 255]` (clamped and rounded) as an 8-bit PNG.
pub fn save_png(img: &RgbImage32, path: impl AsRef<Path>) -> Result<()> {
    let bytes: Vec<u8> = img
        .data
        .iter()
        .map(|&v| v.round().clamp(0.0, 255.0) as u8)
        .collect();
    let buffer = image::RgbImage::from_raw(img.width as u32, img.height as u32, bytes)
        .ok_or_else(|| RuinaError::Serialization("pixel buffer does not match image size".into()))?;
    if let Some(parent) = path.as_ref().parent() {
        std::fs::create_dir_all(parent)?;
    }
    buffer.save(path.as_ref())?;
    Ok(())
}

/// Place images left to right; all must share a height.
pub fn hstack(images: &[RgbImage32]) -> Result<RgbImage32> {
    let Some(first) = images.first() else {
        return Ok(RgbImage32::new(0, 0, Vec::new()));
    };
    let height = first.height;
    if let Some(bad) = images.iter().find(|img| img.height != height) {
        return Err(RuinaError::ShapeMismatch {
            expected: vec![height, bad.width],
            actual: bad.dims().to_vec(),
        });
    }
    let width: usize = images.iter().map(|img| img.width).sum();
    let mut data = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        for img in images {
            let row = y * img.width * 3;
            data.extend_from_slice(&img.data[row..row + img.width * 3]);
        }
    }
    Ok(RgbImage32::new(width, height, data))
}
