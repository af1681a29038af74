//! Parameter-free element-wise activations.

use crate::io::StateDict;
use crate::nn::Module;
use crate::tensor::{Tensor, TensorOps};

macro_rules! stateless_module {
    ($name:ident, |$self_:ident, $x:ident| $body:expr) => {
        impl Module for $name {
            fn forward(&$self_, $x: &Tensor) -> Tensor {
                $body
            }

            fn parameters(&self) -> Vec<Tensor> {
                vec![]
            }

            fn state_dict(&self) -> StateDict {
                StateDict::new()
            }

            fn load_state_dict(&mut self, _state: &StateDict) {}
        }
    };
}

pub struct ReLU;

/// `x` for positive inputs, `alpha * x` otherwise.
pub struct LeakyReLU {
    pub alpha: f32,
}

impl LeakyReLU {
    pub const fn new(alpha: f32) -> Self {
        Self { alpha }
    }
}

pub struct Tanh;

pub struct Sigmoid;

stateless_module!(ReLU, |self, x| x.relu());
stateless_module!(LeakyReLU, |self, x| x.leaky_relu(self.alpha));
stateless_module!(Tanh, |self, x| x.tanh());
stateless_module!(Sigmoid, |self, x| x.sigmoid());
