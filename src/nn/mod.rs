use crate::io::StateDict;
use crate::tensor::Tensor;

pub mod layers;
pub mod optim;

pub use layers::{
    BatchNorm2d, Conv2d, ConvTranspose2d, Dropout, InstanceNorm2d, LeakyReLU, ReLU, Sequential,
    SequentialBuilder, Sigmoid, Tanh, ZeroPad2d,
};
pub use optim::Adam;

pub trait Module {
    fn forward(&self, x: &Tensor) -> Tensor;
    fn parameters(&self) -> Vec<Tensor>;

    // State dict methods
    fn state_dict(&self) -> StateDict;
    fn load_state_dict(&mut self, state: &StateDict);

    /// Total number of learnable scalars.
    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.borrow().data.len()).sum()
    }

    /// Switch between training and evaluation modes.
    /// Important for layers like `BatchNorm` and Dropout.
    fn train(&mut self, _mode: bool) {}
    fn eval(&mut self) {
        self.train(false);
    }
}
