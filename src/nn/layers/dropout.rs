use crate::io::StateDict;
use crate::nn::Module;
use crate::tensor::{RawTensor, Tensor, TensorOps};
use rand::Rng;

/// Inverted dropout: in training, zero each element with probability `p`
/// and scale survivors by `1 / (1 - p)`. Identity in eval mode.
pub struct Dropout {
    p: f32,
    training: bool,
}

impl Dropout {
    /// # Panics
    /// dropout prob must be in \[0,1)
    #[must_use]
    pub fn new(p: f32) -> Self {
        assert!(
            (0.0..1.0).contains(&p),
            "Dropout probability must be in [0, 1)"
        );
        Self { p, training: true }
    }
}

impl Module for Dropout {
    fn forward(&self, x: &Tensor) -> Tensor {
        if !self.training || self.p == 0.0 {
            return x.clone();
        }

        let keep_prob = 1.0 - self.p;
        let scale = 1.0 / keep_prob;
        let shape = x.shape();
        let size: usize = shape.iter().product();

        let mask: Vec<f32> = crate::tensor::with_rng(|rng| {
            (0..size)
                .map(|_| {
                    if rng.random::<f32>() < keep_prob {
                        scale
                    } else {
                        0.0
                    }
                })
                .collect()
        });

        x.elem_mul(&RawTensor::from_vec(mask, &shape))
    }

    fn parameters(&self) -> Vec<Tensor> {
        vec![]
    }

    fn state_dict(&self) -> StateDict {
        StateDict::new()
    }

    fn load_state_dict(&mut self, _state: &StateDict) {
        // Stateless
    }

    fn train(&mut self, mode: bool) {
        self.training = mode;
    }
}
