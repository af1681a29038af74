//! Run settings loaded from YAML, and the builders that turn them into models,
//! datasets and a trainer.

use crate::data::{DatasetKind, DatasetOptions, ImageGeometry};
use crate::error::{Result, RuinaError};
use crate::gan::{
    Discriminator, DiscriminatorConfig, Generator, GeneratorConfig, LambdaSchedule, LossStrategy,
    NormKind,
};
use crate::train::{TrainerOptions, TrainingVariant};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Training recipe.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// One generator pass per step.
    #[default]
    Pix2pix,
    /// Adds a second generator pass on the first output.
    #[serde(alias = "model0", alias = "double-pass")]
    DoublePass,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    // training
    pub model: ModelKind,
    pub norm_type: NormKind,
    pub epochs: usize,
    pub log_dir: PathBuf,
    pub log_images: bool,
    pub n_samples: usize,
    pub frequency: usize,
    pub save: bool,
    pub restore: bool,
    /// Where checkpoints are written and restored from.
    pub checkpoint_dir: PathBuf,
    pub lambda: LambdaSchedule,
    pub second_pass_lambda: f32,
    pub learning_rate: f32,
    pub beta1: f32,
    pub accuracy_threshold: f32,
    pub seed: u64,

    // dataset
    pub dataset: DatasetKind,
    pub dataset_dir: PathBuf,
    pub temples: Vec<usize>,
    pub split: f32,
    pub batch_size: usize,
    pub repeat: usize,
    pub img_height: usize,
    pub img_width: usize,
    pub resize_factor: f32,

    // networks
    pub generator_filters: Vec<usize>,
    pub discriminator_filters: usize,
    pub discriminator_layers: usize,
    pub sigmoid_output: bool,
}

impl Default for Settings {
    fn default() -> Self {
        let geometry = ImageGeometry::default();
        Self {
            model: ModelKind::Pix2pix,
            norm_type: NormKind::Instance,
            epochs: 5,
            log_dir: PathBuf::from("logs/"),
            log_images: true,
            n_samples: 4,
            frequency: 1,
            save: false,
            restore: false,
            checkpoint_dir: PathBuf::from("checkpoints/"),
            lambda: LambdaSchedule::default(),
            second_pass_lambda: 1.25,
            learning_rate: 2e-4,
            beta1: 0.5,
            accuracy_threshold: 0.5,
            seed: 0,
            dataset: DatasetKind::ColorAssisted,
            dataset_dir: PathBuf::from("dataset/"),
            temples: vec![0, 1],
            split: 0.2,
            batch_size: 1,
            repeat: 2,
            img_height: geometry.height,
            img_width: geometry.width,
            resize_factor: geometry.resize_factor,
            generator_filters: GeneratorConfig::default().filters,
            discriminator_filters: 64,
            discriminator_layers: 3,
            sigmoid_output: false,
        }
    }
}

impl Settings {
    /// Parse YAML; missing keys take their defaults.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(RuinaError::InvalidConfig(msg));
        if self.epochs == 0 {
            return invalid("epochs must be at least 1".into());
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be at least 1".into());
        }
        if !(0.0..1.0).contains(&self.split) {
            return invalid(format!("split must lie in [0, 1), got {}", self.split));
        }
        if self.temples.is_empty() {
            return invalid("at least one temple is required".into());
        }
        if !(self.resize_factor >= 1.0) {
            return invalid(format!(
                "resize_factor must be at least 1, got {}",
                self.resize_factor
            ));
        }
        if !(self.learning_rate > 0.0) {
            return invalid(format!("learning_rate must be positive, got {}", self.learning_rate));
        }
        let generator = self.generator_config();
        generator.validate()?;
        let discriminator = self.discriminator_config();
        discriminator.validate()?;
        let multiple = generator.size_multiple();
        if self.img_height % multiple != 0 || self.img_width % multiple != 0 {
            return invalid(format!(
                "image size {}x{} must be divisible by {multiple} for a generator of depth {}",
                self.img_width,
                self.img_height,
                generator.depth()
            ));
        }
        if discriminator.patch_side(self.img_height).is_none()
            || discriminator.patch_side(self.img_width).is_none()
        {
            return invalid(format!(
                "image size {}x{} is too small for a discriminator with {} downsampling layers",
                self.img_width, self.img_height, discriminator.downsample_layers
            ));
        }
        Ok(())
    }

    pub fn geometry(&self) -> ImageGeometry {
        ImageGeometry {
            width: self.img_width,
            height: self.img_height,
            resize_factor: self.resize_factor,
        }
    }

    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            heads: self.dataset.heads(),
            filters: self.generator_filters.clone(),
            norm: self.norm_type,
            ..GeneratorConfig::default()
        }
    }

    pub fn discriminator_config(&self) -> DiscriminatorConfig {
        DiscriminatorConfig {
            base_filters: self.discriminator_filters,
            downsample_layers: self.discriminator_layers,
            norm: self.norm_type,
            sigmoid_output: self.sigmoid_output,
            ..DiscriminatorConfig::default()
        }
    }

    pub fn build_models(&self) -> Result<(Generator, Discriminator)> {
        Ok((
            Generator::new(self.generator_config())?,
            Discriminator::new(self.discriminator_config())?,
        ))
    }

    pub fn dataset_options(&self) -> DatasetOptions {
        DatasetOptions {
            kind: self.dataset,
            root: self.dataset_dir.clone(),
            temples: self.temples.clone(),
            split: self.split,
            repeat: self.repeat,
            seed: self.seed,
        }
    }

    pub fn loss_strategy(&self, discriminator: &Discriminator) -> LossStrategy {
        LossStrategy::pix2pix(discriminator.score_kind(), self.lambda)
    }

    pub fn variant(&self) -> TrainingVariant {
        match self.model {
            ModelKind::Pix2pix => TrainingVariant::SinglePass,
            ModelKind::DoublePass => TrainingVariant::TwoPass {
                second_pass_lambda: self.second_pass_lambda,
            },
        }
    }

    pub fn trainer_options(&self) -> TrainerOptions {
        TrainerOptions {
            epochs: self.epochs,
            batch_size: self.batch_size,
            geometry: self.geometry(),
            learning_rate: self.learning_rate,
            beta1: self.beta1,
            accuracy_threshold: self.accuracy_threshold,
            log_dir: Some(self.log_dir.clone()),
            log_images: self.log_images,
            n_samples: self.n_samples,
            frequency: self.frequency,
            checkpoint_dir: self.save.then(|| self.checkpoint_dir.clone()),
            ..TrainerOptions::default()
        }
    }
}
