//! Conditional GAN: U-Net generator, PatchGAN discriminator and their losses.

pub mod blocks;
pub mod discriminator;
pub mod generator;
pub mod loss;

pub use blocks::NormKind;
pub use discriminator::{Discriminator, DiscriminatorConfig, ScoreKind};
pub use generator::{Generator, GeneratorConfig};
pub use loss::{GeneratorLoss, LambdaSchedule, LossStrategy};
