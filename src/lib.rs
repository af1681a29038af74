//! Conditional image-to-image GANs for reconstructing temple imagery from
//! ruined or segmented inputs.
//!
//! The crate carries its own small reverse-mode tensor engine ([`tensor`],
//! [`autograd`], [`ops`], [`nn`]) and builds on it a U-Net generator, a
//! PatchGAN discriminator, their losses, the dataset pipeline and the
//! adversarial training loop.
//!
//! ```no_run
//! use ruina::config::Settings;
//! use ruina::data::Dataset;
//! use ruina::train::Trainer;
//!
//! # fn main() -> ruina::Result<()> {
//! let settings = Settings::load("settings.yaml")?;
//! let dataset = Dataset::discover(&settings.dataset_options())?;
//! let (generator, discriminator) = settings.build_models()?;
//! let strategy = settings.loss_strategy(&discriminator);
//! let mut trainer = Trainer::new(
//!     generator,
//!     discriminator,
//!     strategy,
//!     settings.variant(),
//!     settings.trainer_options(),
//! );
//! let reports = trainer.fit(dataset.train(), dataset.validation())?;
//! println!("final generator loss {}", reports[reports.len() - 1].train.gen_loss);
//! # Ok(())
//! # }
//! ```

pub mod autograd;
pub mod config;
pub mod data;
pub mod error;
pub mod gan;
pub mod io;
pub mod logging;
pub mod nn;
pub mod ops;
pub mod tensor;
pub mod train;
pub mod utils;

pub use autograd::{GradFn, grad, no_grad};
pub use error::{Result, RuinaError};
pub use io::{StateDict, TensorData, load_state_dict, save_state_dict};
pub use nn::{Adam, Module};
pub use tensor::{
    RawTensor, Tensor, TensorOps, check_gradients, check_gradients_simple, manual_seed, ones, randn,
    zeros,
};
