use super::dataset::SampleSource;
use super::image::RgbImage32;
use super::transforms::{ImageGeometry, center_resize, random_jitter, to_tensor, to_unit_range};
use crate::error::{Result, RuinaError};
use crate::tensor::Tensor;

/// Generator inputs (one tensor per head) and the target, each `[B, 3, H, W]`
/// in `[-1, 1]`.
pub struct Batch {
    pub inputs: Vec<Tensor>,
    pub target: Tensor,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.target.borrow().shape[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decodes and batches samples on demand.
///
/// Training loaders re-sample the augmentation every time a sample is drawn;
/// evaluation loaders resize deterministically. The last batch may be short.
pub struct BatchLoader<'a> {
    samples: &'a [SampleSource],
    batch_size: usize,
    geometry: ImageGeometry,
    augment: bool,
    cursor: usize,
}

impl<'a> BatchLoader<'a> {
    pub fn new(samples: &'a [SampleSource], batch_size: usize, geometry: ImageGeometry, augment: bool) -> Self {
        assert!(batch_size > 0, "batch size must be positive");
        Self {
            samples,
            batch_size,
            geometry,
            augment,
            cursor: 0,
        }
    }

    pub fn num_batches(&self) -> usize {
        self.samples.len().div_ceil(self.batch_size)
    }

    /// Start over from the first sample.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    fn prepare(&self, sample: &SampleSource) -> Result<Vec<RgbImage32>> {
        let images = sample.load()?;
        let mut images = if self.augment {
            random_jitter(&images, &self.geometry)?
        } else {
            center_resize(&images, &self.geometry)?
        };
        images.iter_mut().for_each(to_unit_range);
        Ok(images)
    }

    fn load_batch(&self, samples: &[SampleSource]) -> Result<Batch> {
        // roles[r][b]: image r of sample b
        let mut roles: Vec<Vec<RgbImage32>> = Vec::new();
        for sample in samples {
            let images = self.prepare(sample)?;
            if roles.is_empty() {
                roles.resize_with(images.len(), || Vec::with_capacity(samples.len()));
            }
            for (role, img) in roles.iter_mut().zip(images) {
                role.push(img);
            }
        }
        let mut tensors = roles.iter().map(|imgs| to_tensor(imgs)).collect::<Result<Vec<_>>>()?;
        let target = tensors
            .pop()
            .ok_or_else(|| RuinaError::EmptyDataset("batch".into()))?;
        Ok(Batch {
            inputs: tensors,
            target,
        })
    }
}

impl Iterator for BatchLoader<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.samples.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.samples.len());
        let chunk = &self.samples[self.cursor..end];
        self.cursor = end;
        Some(self.load_batch(chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::ImageSource;
    use crate::data::image::save_png;
    use crate::tensor::TensorOps;

    fn write_samples(dir: &std::path::Path, n: usize) -> Vec<SampleSource> {
        (0..n)
            .map(|i| {
                let input = dir.join(format!("in{i}.png"));
                let target = dir.join(format!("out{i}.png"));
                save_png(&RgbImage32::filled(8, 4, [0.0; 3]), &input).unwrap();
                save_png(&RgbImage32::filled(8, 4, [255.0; 3]), &target).unwrap();
                SampleSource {
                    inputs: vec![ImageSource::File(input)],
                    target: ImageSource::File(target),
                }
            })
            .collect()
    }

    #[test]
    fn test_batches_and_reset() {
        let dir = tempfile::tempdir().unwrap();
        let samples = write_samples(dir.path(), 3);
        let geometry = ImageGeometry {
            width: 8,
            height: 4,
            resize_factor: 1.25,
        };
        let mut loader = BatchLoader::new(&samples, 2, geometry, true);
        assert_eq!(loader.num_batches(), 2);

        let first = loader.next().unwrap().unwrap();
        assert_eq!(first.inputs.len(), 1);
        assert_eq!(first.inputs[0].shape(), vec![2, 3, 4, 8]);
        assert!(first.inputs[0].borrow().data.iter().all(|&v| v == -1.0));
        assert!(first.target.borrow().data.iter().all(|&v| v == 1.0));

        assert_eq!(loader.next().unwrap().unwrap().len(), 1);
        assert!(loader.next().is_none());
        loader.reset();
        assert_eq!(loader.count(), 2);
    }

    #[test]
    fn test_missing_file_surfaces_error() {
        let samples = vec![SampleSource {
            inputs: vec![ImageSource::File("/nope/a.png".into())],
            target: ImageSource::File("/nope/b.png".into()),
        }];
        let mut loader = BatchLoader::new(&samples, 1, ImageGeometry::default(), false);
        assert!(loader.next().unwrap().is_err());
    }
}
