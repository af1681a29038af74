use crate::nn::{
    BatchNorm2d, Conv2d, ConvTranspose2d, Dropout, InstanceNorm2d, LeakyReLU, Module, ReLU,
    Sequential,
};
use serde::{Deserialize, Serialize};

/// Negative slope of every LeakyReLU in the encoder paths.
pub const LEAKY_SLOPE: f32 = 0.3;

/// Dropout rate of the decoder blocks that apply dropout.
pub const DECODER_DROPOUT: f32 = 0.5;

/// Padding giving "same" geometry for the stride-2 blocks: a 4×4 kernel
/// halves the resolution in `downsample` and doubles it in `upsample`.
pub fn same_padding(kernel: usize) -> usize {
    (kernel - 1) / 2
}

/// Normalization applied inside the building blocks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormKind {
    #[serde(alias = "batchnorm")]
    Batch,
    #[default]
    #[serde(alias = "instancenorm")]
    Instance,
}

impl NormKind {
    pub fn layer(self, channels: usize) -> Box<dyn Module> {
        match self {
            NormKind::Batch => Box::new(BatchNorm2d::new(channels)),
            NormKind::Instance => Box::new(InstanceNorm2d::new(channels)),
        }
    }
}

/// Encoder block: conv (stride 2, no bias) → optional norm → LeakyReLU.
pub fn downsample(in_channels: usize, filters: usize, kernel: usize, norm: Option<NormKind>) -> Sequential {
    Sequential::builder()
        .add_named(
            "conv",
            Box::new(Conv2d::new(
                in_channels,
                filters,
                kernel,
                2,
                same_padding(kernel),
                false,
            )),
        )
        .add_optional(norm.map(|n| n.layer(filters)))
        .add_unnamed(Box::new(LeakyReLU::new(LEAKY_SLOPE)))
        .build()
}

/// Decoder block: transposed conv (stride 2, no bias) → norm → optional
/// dropout → ReLU.
pub fn upsample(
    in_channels: usize,
    filters: usize,
    kernel: usize,
    norm: NormKind,
    apply_dropout: bool,
) -> Sequential {
    Sequential::builder()
        .add_named(
            "deconv",
            Box::new(ConvTranspose2d::new(
                in_channels,
                filters,
                kernel,
                2,
                same_padding(kernel),
                false,
            )),
        )
        .add_named("norm", norm.layer(filters))
        .add_optional(apply_dropout.then(|| Box::new(Dropout::new(DECODER_DROPOUT)) as Box<dyn Module>))
        .add_unnamed(Box::new(ReLU))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RawTensor;
    use crate::tensor::TensorOps;

    #[test]
    fn test_downsample_halves() {
        let block = downsample(3, 8, 4, Some(NormKind::Instance));
        let y = block.forward(&RawTensor::randn(&[2, 3, 16, 32]));
        assert_eq!(y.shape(), vec![2, 8, 8, 16]);
        // conv weight + norm scale/offset
        assert_eq!(block.parameters().len(), 3);
    }

    #[test]
    fn test_downsample_without_norm() {
        let block = downsample(3, 8, 4, None);
        assert_eq!(block.len(), 2);
        assert_eq!(block.parameters().len(), 1);
    }

    #[test]
    fn test_upsample_doubles() {
        let mut block = upsample(8, 4, 4, NormKind::Batch, true);
        block.eval();
        let y = block.forward(&RawTensor::randn(&[1, 8, 2, 4]));
        assert_eq!(y.shape(), vec![1, 4, 4, 8]);
        assert!(y.borrow().data.iter().all(|&v| v >= 0.0));
        assert_eq!(block.len(), 4);
    }

    #[test]
    fn test_norm_kind_parses_aliases() {
        let a: NormKind = serde_yaml::from_str("batchnorm").unwrap();
        let b: NormKind = serde_yaml::from_str("instance").unwrap();
        assert_eq!(a, NormKind::Batch);
        assert_eq!(b, NormKind::Instance);
    }
}
