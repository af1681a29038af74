use crate::io::StateDict;
use crate::nn::Module;
use crate::tensor::{Tensor, TensorOps};

/// Zero-pad the two spatial dimensions of a `[B, C, H, W]` tensor.
pub struct ZeroPad2d {
    padding: usize,
}

impl ZeroPad2d {
    pub const fn new(padding: usize) -> Self {
        Self { padding }
    }
}

impl Module for ZeroPad2d {
    fn forward(&self, x: &Tensor) -> Tensor {
        let p = self.padding;
        x.pad(&[(0, 0), (0, 0), (p, p), (p, p)])
    }

    fn parameters(&self) -> Vec<Tensor> {
        vec![]
    }

    fn state_dict(&self) -> StateDict {
        StateDict::new()
    }

    fn load_state_dict(&mut self, _state: &StateDict) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RawTensor;

    #[test]
    fn test_pads_spatial_dims_only() {
        let x = RawTensor::ones(&[2, 3, 4, 5]);
        let y = ZeroPad2d::new(1).forward(&x);
        assert_eq!(y.shape(), vec![2, 3, 6, 7]);
        assert_eq!(y.sum().item(), 2.0 * 3.0 * 20.0);
    }
}
