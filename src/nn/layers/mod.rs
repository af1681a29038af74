pub mod activation;
pub mod batchnorm;
pub mod conv;
pub mod conv_transpose;
pub mod dropout;
pub mod instancenorm;
pub mod sequential;
pub mod sequential_builder;
pub mod zero_pad;

pub use activation::{LeakyReLU, ReLU, Sigmoid, Tanh};
pub use batchnorm::BatchNorm2d;
pub use conv::Conv2d;
pub use conv_transpose::ConvTranspose2d;
pub use dropout::Dropout;
pub use instancenorm::InstanceNorm2d;
pub use sequential::Sequential;
pub use sequential_builder::SequentialBuilder;
pub use zero_pad::ZeroPad2d;
