//! U-Net generator with skip connections and one or more input heads.

use super::blocks::{NormKind, downsample, same_padding, upsample};
use crate::error::{Result, RuinaError};
use crate::io::{StateDict, merge_prefixed, sub_state};
use crate::nn::{ConvTranspose2d, Module, Sequential};
use crate::tensor::{RawTensor, Tensor, TensorOps};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Number of conditioning images, concatenated channel-wise.
    pub heads: usize,
    /// Channels of each head.
    pub in_channels: usize,
    pub out_channels: usize,
    /// Encoder widths, shallowest first. The decoder mirrors all but the last.
    pub filters: Vec<usize>,
    pub kernel: usize,
    pub norm: NormKind,
    /// How many of the deepest decoder blocks apply dropout.
    pub dropout_stages: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            heads: 1,
            in_channels: 3,
            out_channels: 3,
            filters: vec![64, 128, 256, 512, 512, 512, 512, 512],
            kernel: 4,
            norm: NormKind::Instance,
            dropout_stages: 3,
        }
    }
}

impl GeneratorConfig {
    pub fn depth(&self) -> usize {
        self.filters.len()
    }

    /// Input height and width must both be multiples of this.
    pub fn size_multiple(&self) -> usize {
        1 << self.depth()
    }

    /// Channels of the skip tensor concatenated after decoder block `stage`.
    pub fn skip_channels(&self, stage: usize) -> usize {
        self.filters[self.depth() - 2 - stage]
    }

    /// Output channels of decoder block `stage`.
    pub fn decoder_channels(&self, stage: usize) -> usize {
        self.skip_channels(stage)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(RuinaError::InvalidConfig(msg));
        if self.heads == 0 {
            return invalid("generator needs at least one input head".into());
        }
        if self.depth() < 2 {
            return invalid(format!(
                "generator needs at least two encoder stages, got {}",
                self.depth()
            ));
        }
        if self.filters.contains(&0) || self.in_channels == 0 || self.out_channels == 0 {
            return invalid("channel counts must be positive".into());
        }
        if self.kernel < 2 || self.kernel % 2 != 0 {
            return invalid(format!(
                "kernel must be even for stride-2 same padding, got {}",
                self.kernel
            ));
        }
        Ok(())
    }
}

/// Encoder stack of `depth` downsample blocks, `depth - 1` upsample blocks each
/// followed by a skip concatenation, and a final transposed conv with tanh.
pub struct Generator {
    config: GeneratorConfig,
    down: Vec<Sequential>,
    up: Vec<Sequential>,
    last: ConvTranspose2d,
}

impl Generator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        config.validate()?;
        let k = config.kernel;
        let depth = config.depth();

        let mut in_ch = config.heads * config.in_channels;
        let mut down = Vec::with_capacity(depth);
        for (i, &filters) in config.filters.iter().enumerate() {
            let norm = (i > 0).then_some(config.norm);
            down.push(downsample(in_ch, filters, k, norm));
            in_ch = filters;
        }

        let mut up = Vec::with_capacity(depth - 1);
        for stage in 0..depth - 1 {
            let filters = config.decoder_channels(stage);
            let dropout = stage < config.dropout_stages;
            up.push(upsample(in_ch, filters, k, config.norm, dropout));
            in_ch = filters + config.skip_channels(stage);
        }

        let last = ConvTranspose2d::new(in_ch, config.out_channels, k, 2, same_padding(k), true);

        let generator = Self {
            config,
            down,
            up,
            last,
        };
        debug!(
            depth,
            heads = generator.config.heads,
            parameters = generator.num_parameters(),
            "built generator"
        );
        Ok(generator)
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Reject batches whose layout the network cannot process.
    pub fn check_input(&self, heads: &[Tensor]) -> Result<()> {
        if heads.len() != self.config.heads {
            return Err(RuinaError::InvalidConfig(format!(
                "generator expects {} input heads, got {}",
                self.config.heads,
                heads.len()
            )));
        }
        let m = self.config.size_multiple();
        for head in heads {
            let shape = head.shape();
            let ok = shape.len() == 4
                && shape[1] == self.config.in_channels
                && shape[2] % m == 0
                && shape[3] % m == 0
                && shape[2] > 0
                && shape[3] > 0;
            if !ok {
                let mut expected = shape.clone();
                if expected.len() == 4 {
                    expected[1] = self.config.in_channels;
                    expected[2] = shape[2].div_ceil(m).max(1) * m;
                    expected[3] = shape[3].div_ceil(m).max(1) * m;
                }
                return Err(RuinaError::ShapeMismatch {
                    expected,
                    actual: shape,
                });
            }
        }
        Ok(())
    }

    /// Run the U-Net on `heads`, each `[B, in_channels, H, W]`.
    ///
    /// # Panics
    /// On a head count or spatial size the network cannot process; see
    /// [`Generator::check_input`].
    pub fn forward_heads(&self, heads: &[Tensor]) -> Tensor {
        assert_eq!(
            heads.len(),
            self.config.heads,
            "generator expects {} input heads",
            self.config.heads
        );
        let mut x = if heads.len() == 1 {
            heads[0].clone()
        } else {
            RawTensor::concat(heads, 1)
        };

        let mut skips = Vec::with_capacity(self.down.len());
        for block in &self.down {
            x = block.forward(&x);
            skips.push(x.clone());
        }
        // deepest activation is the bottleneck, not a skip
        skips.pop();

        for (block, skip) in self.up.iter().zip(skips.iter().rev()) {
            x = block.forward(&x);
            x = RawTensor::concat(&[x, skip.clone()], 1);
        }

        self.last.forward(&x).tanh()
    }
}

impl Module for Generator {
    fn forward(&self, x: &Tensor) -> Tensor {
        self.forward_heads(std::slice::from_ref(x))
    }

    fn parameters(&self) -> Vec<Tensor> {
        self.down
            .iter()
            .chain(&self.up)
            .flat_map(|block| block.parameters())
            .chain(self.last.parameters())
            .collect()
    }

    fn state_dict(&self) -> StateDict {
        let mut state = StateDict::new();
        for (i, block) in self.down.iter().enumerate() {
            merge_prefixed(&mut state, &format!("down{i}"), block.state_dict());
        }
        for (i, block) in self.up.iter().enumerate() {
            merge_prefixed(&mut state, &format!("up{i}"), block.state_dict());
        }
        merge_prefixed(&mut state, "last", self.last.state_dict());
        state
    }

    fn load_state_dict(&mut self, state: &StateDict) {
        for (i, block) in self.down.iter_mut().enumerate() {
            block.load_state_dict(&sub_state(state, &format!("down{i}")));
        }
        for (i, block) in self.up.iter_mut().enumerate() {
            block.load_state_dict(&sub_state(state, &format!("up{i}")));
        }
        self.last.load_state_dict(&sub_state(state, "last"));
    }

    fn train(&mut self, mode: bool) {
        for block in self.down.iter_mut().chain(self.up.iter_mut()) {
            block.train(mode);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::manual_seed;

    fn tiny(heads: usize) -> GeneratorConfig {
        GeneratorConfig {
            heads,
            filters: vec![4, 8, 8],
            dropout_stages: 1,
            ..GeneratorConfig::default()
        }
    }

    #[test]
    fn test_default_matches_pix2pix_layout() {
        let c = GeneratorConfig::default();
        assert_eq!(c.depth(), 8);
        let decoder: Vec<usize> = (0..7).map(|s| c.decoder_channels(s)).collect();
        assert_eq!(decoder, vec![512, 512, 512, 512, 256, 128, 64]);
        assert_eq!(c.size_multiple(), 256);
    }

    #[test]
    fn test_output_matches_target_shape() {
        manual_seed(0);
        let g = Generator::new(tiny(1)).unwrap();
        let x = RawTensor::randn(&[2, 3, 8, 16]);
        let y = g.forward(&x);
        assert_eq!(y.shape(), vec![2, 3, 8, 16]);
        assert!(y.borrow().data.iter().all(|v| v.abs() <= 1.0));
    }

    #[test]
    fn test_two_heads_concatenate() {
        let g = Generator::new(tiny(2)).unwrap();
        let a = RawTensor::randn(&[1, 3, 8, 8]);
        let b = RawTensor::randn(&[1, 3, 8, 8]);
        assert!(g.check_input(&[a.clone(), b.clone()]).is_ok());
        assert_eq!(g.forward_heads(&[a, b]).shape(), vec![1, 3, 8, 8]);
    }

    #[test]
    fn test_check_input_rejects_bad_sizes() {
        let g = Generator::new(tiny(1)).unwrap();
        let odd = RawTensor::zeros(&[1, 3, 12, 8]);
        assert!(matches!(
            g.check_input(&[odd]),
            Err(RuinaError::ShapeMismatch { .. })
        ));
        let ok = RawTensor::zeros(&[1, 3, 8, 8]);
        assert!(g.check_input(&[ok.clone(), ok]).is_err());
    }

    #[test]
    fn test_invalid_configs() {
        for bad in [
            GeneratorConfig {
                heads: 0,
                ..tiny(1)
            },
            GeneratorConfig {
                filters: vec![4],
                ..tiny(1)
            },
            GeneratorConfig {
                kernel: 3,
                ..tiny(1)
            },
        ] {
            assert!(Generator::new(bad).is_err());
        }
    }

    #[test]
    fn test_state_dict_keys_and_round_trip() {
        let a = Generator::new(tiny(1)).unwrap();
        let mut b = Generator::new(tiny(1)).unwrap();
        let state = a.state_dict();
        assert!(state.contains_key("down0.conv.weight"));
        assert!(state.contains_key("up0.deconv.weight"));
        assert!(state.contains_key("last.bias"));
        b.load_state_dict(&state);
        assert_eq!(b.state_dict(), state);
    }
}
