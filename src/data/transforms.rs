//! Resizing, augmentation and tensor conversion for image tuples.
//!
//! Every function taking several images applies the same geometric change to
//! all of them, so inputs and targets stay aligned.

use super::image::RgbImage32;
use crate::error::{Result, RuinaError};
use crate::tensor::{RawTensor, Tensor, with_rng};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Pixel value mapped to zero by [`normalize`].
pub const PIXEL_CENTER: f32 = 127.5;

/// Normalize data in-place: (x - mean) / std
pub fn normalize(data: &mut [f32], mean: f32, std: f32) {
    for x in data.iter_mut() {
        *x = (*x - mean) / std;
    }
}

/// Inverse of [`normalize`].
pub fn denormalize(data: &mut [f32], mean: f32, std: f32) {
    for x in data.iter_mut() {
        *x = *x * std + mean;
    }
}

/// Map raw `[0, 255]` pixels to `[-1, 1]`.
pub fn to_unit_range(img: &mut RgbImage32) {
    normalize(&mut img.data, PIXEL_CENTER, PIXEL_CENTER);
}

/// Map `[-1, 1]` back to `[0, 255]`.
pub fn to_pixel_range(img: &mut RgbImage32) {
    denormalize(&mut img.data, PIXEL_CENTER, PIXEL_CENTER);
}

/// Spatial size fed to the networks plus the jitter upscale factor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageGeometry {
    pub width: usize,
    pub height: usize,
    /// Images are enlarged by this factor before cropping back to size.
    pub resize_factor: f32,
}

impl Default for ImageGeometry {
    fn default() -> Self {
        Self {
            width: 512,
            height: 256,
            resize_factor: 1.1,
        }
    }
}

impl ImageGeometry {
    /// `(width, height)` of the enlarged image.
    pub fn enlarged(&self) -> (usize, usize) {
        let scale = |d: usize| ((d as f32 * self.resize_factor).round() as usize).max(d);
        (scale(self.width), scale(self.height))
    }
}

/// Nearest-neighbour resize with half-pixel centres.
pub fn resize_nearest(img: &RgbImage32, width: usize, height: usize) -> RgbImage32 {
    if img.width == width && img.height == height {
        return img.clone();
    }
    let src = |dst: usize, from: usize, to: usize| {
        let s = ((dst as f32 + 0.5) * from as f32 / to as f32).floor() as usize;
        s.min(from - 1)
    };
    let mut data = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        let sy = src(y, img.height, height);
        for x in 0..width {
            let sx = src(x, img.width, width);
            data.extend_from_slice(&img.pixel(sx, sy));
        }
    }
    RgbImage32::new(width, height, data)
}

/// Window of `width × height` starting at `(x0, y0)`.
pub fn crop(img: &RgbImage32, x0: usize, y0: usize, width: usize, height: usize) -> RgbImage32 {
    assert!(
        x0 + width <= img.width && y0 + height <= img.height,
        "crop window exceeds image bounds"
    );
    let mut data = Vec::with_capacity(width * height * 3);
    for y in y0..y0 + height {
        let row = (y * img.width + x0) * 3;
        data.extend_from_slice(&img.data[row..row + width * 3]);
    }
    RgbImage32::new(width, height, data)
}

pub fn flip_horizontal(img: &RgbImage32) -> RgbImage32 {
    let mut out = img.clone();
    for y in 0..img.height {
        for x in 0..img.width {
            out.set_pixel(img.width - 1 - x, y, img.pixel(x, y));
        }
    }
    out
}

fn ensure_aligned(images: &[RgbImage32]) -> Result<()> {
    match images.split_first() {
        Some((first, rest)) => rest.iter().try_for_each(|img| first.ensure_same_dims(img)),
        None => Ok(()),
    }
}

/// Training augmentation: enlarge, crop back to size at one random offset
/// shared by every image, then mirror all of them with probability 0.5.
pub fn random_jitter(images: &[RgbImage32], geometry: &ImageGeometry) -> Result<Vec<RgbImage32>> {
    ensure_aligned(images)?;
    let (w, h) = geometry.enlarged();
    let resized: Vec<RgbImage32> = images.iter().map(|img| resize_nearest(img, w, h)).collect();
    let (x0, y0, flip) = with_rng(|rng| {
        (
            rng.random_range(0..=w - geometry.width),
            rng.random_range(0..=h - geometry.height),
            rng.random_bool(0.5),
        )
    });
    Ok(resized
        .iter()
        .map(|img| {
            let cropped = crop(img, x0, y0, geometry.width, geometry.height);
            if flip { flip_horizontal(&cropped) } else { cropped }
        })
        .collect())
}

/// Deterministic counterpart of [`random_jitter`]: enlarge and take the centre.
pub fn center_resize(images: &[RgbImage32], geometry: &ImageGeometry) -> Result<Vec<RgbImage32>> {
    ensure_aligned(images)?;
    let (w, h) = geometry.enlarged();
    let (x0, y0) = ((w - geometry.width) / 2, (h - geometry.height) / 2);
    Ok(images
        .iter()
        .map(|img| crop(&resize_nearest(img, w, h), x0, y0, geometry.width, geometry.height))
        .collect())
}

/// Stack same-sized images into a `[B, 3, H, W]` tensor (HWC to CHW).
pub fn to_tensor(images: &[RgbImage32]) -> Result<Tensor> {
    let first = images
        .first()
        .ok_or_else(|| RuinaError::EmptyDataset("image batch".into()))?;
    ensure_aligned(images)?;
    let (h, w) = (first.height, first.width);
    let plane = h * w;
    let mut data = vec![0.0; images.len() * 3 * plane];
    for (b, img) in images.iter().enumerate() {
        let base = b * 3 * plane;
        for (p, rgb) in img.data.chunks_exact(3).enumerate() {
            for (c, &v) in rgb.iter().enumerate() {
                data[base + c * plane + p] = v;
            }
        }
    }
    Ok(RawTensor::new(data, &[images.len(), 3, h, w], false))
}

/// Split a `[B, 3, H, W]` tensor back into images.
pub fn from_tensor(t: &Tensor) -> Result<Vec<RgbImage32>> {
    let t = t.borrow();
    let &[batch, 3, h, w] = t.shape.as_slice() else {
        return Err(RuinaError::ShapeMismatch {
            expected: vec![0, 3, 0, 0],
            actual: t.shape.clone(),
        });
    };
    let plane = h * w;
    let values = &t.data;
    Ok((0..batch)
        .map(|b| {
            let base = b * 3 * plane;
            let data = (0..plane)
                .flat_map(|p| (0..3).map(move |c| values[base + c * plane + p]))
                .collect();
            RgbImage32::new(w, h, data)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{TensorOps, manual_seed};
    use approx::assert_relative_eq;

    fn gradient(width: usize, height: usize) -> RgbImage32 {
        let data = (0..width * height)
            .flat_map(|i| {
                let v = (i % 256) as f32;
                [v, 255.0 - v, (i / width) as f32]
            })
            .collect();
        RgbImage32::new(width, height, data)
    }

    #[test]
    fn test_normalize() {
        let mut data = vec![0.0, 127.5, 255.0];
        normalize(&mut data, PIXEL_CENTER, PIXEL_CENTER);
        assert_eq!(data, vec![-1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_unit_range_round_trip() {
        let original = gradient(5, 4);
        let mut img = original.clone();
        to_unit_range(&mut img);
        assert!(img.data.iter().all(|v| (-1.0..=1.0).contains(v)));
        to_pixel_range(&mut img);
        for (a, b) in img.data.iter().zip(&original.data) {
            assert_relative_eq!(a, b, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_resize_nearest_doubles_pixels() {
        let img = gradient(2, 1);
        let big = resize_nearest(&img, 4, 2);
        assert_eq!(big.pixel(0, 0), img.pixel(0, 0));
        assert_eq!(big.pixel(1, 1), img.pixel(0, 0));
        assert_eq!(big.pixel(3, 0), img.pixel(1, 0));
    }

    #[test]
    fn test_flip_is_involution() {
        let img = gradient(3, 2);
        assert_eq!(flip_horizontal(&flip_horizontal(&img)), img);
        assert_eq!(flip_horizontal(&img).pixel(0, 1), img.pixel(2, 1));
    }

    #[test]
    fn test_random_jitter_keeps_tuple_aligned() {
        manual_seed(7);
        let geometry = ImageGeometry {
            width: 8,
            height: 4,
            resize_factor: 1.5,
        };
        let a = gradient(8, 4);
        for _ in 0..10 {
            let out = random_jitter(&[a.clone(), a.clone()], &geometry).unwrap();
            assert_eq!(out[0].dims(), [4, 8]);
            assert_eq!(out[0], out[1]);
        }
    }

    #[test]
    fn test_center_resize_without_enlarging_is_identity() {
        let geometry = ImageGeometry {
            width: 6,
            height: 4,
            resize_factor: 1.0,
        };
        let img = gradient(6, 4);
        assert_eq!(center_resize(&[img.clone()], &geometry).unwrap()[0], img);
    }

    #[test]
    fn test_tensor_layout() {
        let a = gradient(3, 2);
        let b = RgbImage32::filled(3, 2, [1.0, 2.0, 3.0]);
        let t = to_tensor(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(t.shape(), vec![2, 3, 2, 3]);
        // channel 1 of image 1 is constant 2
        assert!(t.borrow().data[6 * 3 + 6..6 * 3 + 12].iter().all(|&v| v == 2.0));
        assert_eq!(from_tensor(&t).unwrap(), vec![a, b]);
    }

    #[test]
    fn test_to_tensor_rejects_mixed_sizes() {
        let err = to_tensor(&[gradient(2, 2), gradient(3, 2)]);
        assert!(matches!(err, Err(RuinaError::ShapeMismatch { .. })));
        assert!(to_tensor(&[]).is_err());
    }
}
