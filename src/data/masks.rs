//! Masks derived from segmented images.

use super::image::RgbImage32;
use crate::error::Result;

/// Fill colour marking regions that differ between two segmentations.
pub const PINK: [f32; 3] = [255.0, 0.0, 255.0];

/// White wherever `img` has any non-black pixel, black elsewhere.
pub fn binary_mask(img: &RgbImage32) -> RgbImage32 {
    let data = img
        .data
        .chunks_exact(3)
        .flat_map(|rgb| {
            let v = if rgb.iter().sum::<f32>() == 0.0 { 0.0 } else { 255.0 };
            [v; 3]
        })
        .collect();
    RgbImage32::new(img.width, img.height, data)
}

/// `fill` where `ruins` and `reference` agree on every channel, [`PINK`]
/// where they differ.
///
/// Used with segmented ruins and segmented temple to mark the missing parts
/// of the true-colour temple image.
pub fn pink_mask(ruins: &RgbImage32, reference: &RgbImage32, fill: &RgbImage32) -> Result<RgbImage32> {
    ruins.ensure_same_dims(reference)?;
    ruins.ensure_same_dims(fill)?;
    let data = ruins
        .data
        .chunks_exact(3)
        .zip(reference.data.chunks_exact(3))
        .zip(fill.data.chunks_exact(3))
        .flat_map(|((a, b), f)| if a == b { [f[0], f[1], f[2]] } else { PINK })
        .collect();
    Ok(RgbImage32::new(fill.width, fill.height, data))
}
