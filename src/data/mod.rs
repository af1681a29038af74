pub mod dataset;
pub mod image;
pub mod loader;
pub mod masks;
pub mod transforms;

pub use dataset::{Dataset, DatasetKind, DatasetOptions, ImageSource, SampleSource};
pub use image::{RgbImage32, hstack, load_png, save_png};
pub use loader::{Batch, BatchLoader};
pub use masks::{binary_mask, pink_mask};
pub use transforms::{ImageGeometry, from_tensor, normalize, random_jitter, to_tensor};
