//! PatchGAN discriminator over `(condition, candidate)` pairs.

use super::blocks::{LEAKY_SLOPE, NormKind, downsample};
use crate::error::{Result, RuinaError};
use crate::io::StateDict;
use crate::nn::{Conv2d, LeakyReLU, Module, Sequential, Sigmoid, ZeroPad2d};
use crate::tensor::{RawTensor, Tensor};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What the score map holds, which decides the cross-entropy form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScoreKind {
    Logits,
    Probabilities,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscriminatorConfig {
    /// Channels of the conditioning image(s).
    pub in_channels: usize,
    /// Channels of the real or generated candidate.
    pub target_channels: usize,
    pub base_filters: usize,
    /// Number of stride-2 encoder blocks (3 or 4 in practice).
    pub downsample_layers: usize,
    pub kernel: usize,
    pub norm: NormKind,
    /// End in a sigmoid and report probabilities instead of logits.
    pub sigmoid_output: bool,
}

impl Default for DiscriminatorConfig {
    fn default() -> Self {
        Self {
            in_channels: 3,
            target_channels: 3,
            base_filters: 64,
            downsample_layers: 3,
            kernel: 4,
            norm: NormKind::Instance,
            sigmoid_output: false,
        }
    }
}

impl DiscriminatorConfig {
    /// Width of encoder block `i`: doubles per block, capped at 8× the base.
    pub fn filters(&self, i: usize) -> usize {
        self.base_filters << i.min(3)
    }

    /// Side of the score map for an input side of `size`.
    pub fn patch_side(&self, size: usize) -> Option<usize> {
        let reduced = size >> self.downsample_layers;
        // two (pad 1, kernel k, stride 1) convs each shrink by k - 3
        reduced.checked_sub(2 * (self.kernel - 3)).filter(|&s| s > 0)
    }

    pub fn validate(&self) -> Result<()> {
        if self.downsample_layers == 0 {
            return Err(RuinaError::InvalidConfig(
                "discriminator needs at least one encoder block".into(),
            ));
        }
        if self.base_filters == 0 || self.in_channels == 0 || self.target_channels == 0 {
            return Err(RuinaError::InvalidConfig(
                "channel counts must be positive".into(),
            ));
        }
        if self.kernel < 4 || self.kernel % 2 != 0 {
            return Err(RuinaError::InvalidConfig(format!(
                "discriminator kernel must be even and at least 4, got {}",
                self.kernel
            )));
        }
        Ok(())
    }
}

pub struct Discriminator {
    config: DiscriminatorConfig,
    net: Sequential,
}

impl Discriminator {
    pub fn new(config: DiscriminatorConfig) -> Result<Self> {
        config.validate()?;
        let k = config.kernel;

        let mut builder = Sequential::builder();
        let mut in_ch = config.in_channels + config.target_channels;
        for i in 0..config.downsample_layers {
            let filters = config.filters(i);
            let norm = (i > 0).then_some(config.norm);
            builder = builder.add_named(format!("down{i}"), Box::new(downsample(in_ch, filters, k, norm)));
            in_ch = filters;
        }

        let mid = config.filters(config.downsample_layers);
        let net = builder
            .add_unnamed(Box::new(ZeroPad2d::new(1)))
            .add_named("conv", Box::new(Conv2d::new(in_ch, mid, k, 1, 0, false)))
            .add_named("norm", config.norm.layer(mid))
            .add_unnamed(Box::new(LeakyReLU::new(LEAKY_SLOPE)))
            .add_unnamed(Box::new(ZeroPad2d::new(1)))
            .add_named("last", Box::new(Conv2d::new(mid, 1, k, 1, 0, true)))
            .add_optional(config.sigmoid_output.then(|| Box::new(Sigmoid) as Box<dyn Module>))
            .build();

        let discriminator = Self { config, net };
        debug!(
            layers = discriminator.config.downsample_layers,
            parameters = discriminator.num_parameters(),
            "built discriminator"
        );
        Ok(discriminator)
    }

    pub fn config(&self) -> &DiscriminatorConfig {
        &self.config
    }

    pub fn score_kind(&self) -> ScoreKind {
        if self.config.sigmoid_output {
            ScoreKind::Probabilities
        } else {
            ScoreKind::Logits
        }
    }

    /// Score map `[B, 1, h, w]` for how real `candidate` looks given `condition`.
    pub fn judge(&self, condition: &Tensor, candidate: &Tensor) -> Tensor {
        self.net
            .forward(&RawTensor::concat(&[condition.clone(), candidate.clone()], 1))
    }
}

impl Module for Discriminator {
    /// Scores an already concatenated `(condition, candidate)` tensor.
    fn forward(&self, x: &Tensor) -> Tensor {
        self.net.forward(x)
    }

    fn parameters(&self) -> Vec<Tensor> {
        self.net.parameters()
    }

    fn state_dict(&self) -> StateDict {
        self.net.state_dict()
    }

    fn load_state_dict(&mut self, state: &StateDict) {
        self.net.load_state_dict(state);
    }

    fn train(&mut self, mode: bool) {
        self.net.train(mode);
    }
}
