use crate::io::{StateDict, load_entries, state_dict_from};
use crate::nn::Module;
use crate::tensor::{RawTensor, Tensor, TensorOps};

/// Instance normalization: each `(sample, channel)` plane is normalized over
/// its own `H × W` values, then scaled and shifted per channel.
///
/// No running statistics, so train and eval behave identically.
pub struct InstanceNorm2d {
    num_features: usize,
    eps: f32,
    scale: Tensor,  // [C], init N(1, 0.02)
    offset: Tensor, // [C], init 0
}

impl InstanceNorm2d {
    pub fn new(num_features: usize) -> Self {
        Self::new_with_eps(num_features, 1e-5)
    }

    pub fn new_with_eps(num_features: usize, eps: f32) -> Self {
        let scale = RawTensor::parameter(&[num_features], 1.0, 0.02);
        let offset = RawTensor::zeros(&[num_features]);
        offset.borrow_mut().requires_grad = true;
        InstanceNorm2d {
            num_features,
            eps,
            scale,
            offset,
        }
    }
}

impl Module for InstanceNorm2d {
    fn forward(&self, x: &Tensor) -> Tensor {
        let (b, c, h, w) = {
            let s = x.borrow();
            assert_eq!(s.shape.len(), 4, "InstanceNorm2d expected 4D input (B,C,H,W)");
            (s.shape[0], s.shape[1], s.shape[2], s.shape[3])
        };
        assert_eq!(c, self.num_features, "Channel mismatch");

        let planes = x.reshape(&[b * c, h * w]);
        let mean = planes.mean_dim(1, true);
        let diff = planes.sub(&mean);
        let var = diff.elem_mul(&diff).mean_dim(1, true);
        let normalized = diff
            .div(&var.add_scalar(self.eps).sqrt())
            .reshape(&[b, c, h, w]);

        normalized
            .elem_mul(&self.scale.reshape(&[1, c, 1, 1]))
            .add(&self.offset.reshape(&[1, c, 1, 1]))
    }

    fn parameters(&self) -> Vec<Tensor> {
        vec![self.scale.clone(), self.offset.clone()]
    }

    fn state_dict(&self) -> StateDict {
        state_dict_from(&[("scale", &self.scale), ("offset", &self.offset)])
    }

    fn load_state_dict(&mut self, state: &StateDict) {
        load_entries(state, &[("scale", &self.scale), ("offset", &self.offset)]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::check_gradients_simple;
    use approx::assert_relative_eq;

    #[test]
    fn test_each_plane_is_normalized() {
        let norm = InstanceNorm2d::new(2);
        norm.scale.borrow_mut().data = vec![1.0, 1.0];
        let x = RawTensor::from_vec(
            vec![1.0, 3.0, 5.0, 7.0, -4.0, 0.0, 4.0, 8.0],
            &[1, 2, 2, 2],
        );
        let y = norm.forward(&x);
        let d = y.borrow().data.clone();
        for plane in d.chunks(4) {
            let mean = plane.iter().sum::<f32>() / 4.0;
            let var = plane.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / 4.0;
            assert_relative_eq!(mean, 0.0, epsilon = 1e-5);
            assert_relative_eq!(var, 1.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_scale_initialised_near_one() {
        let norm = InstanceNorm2d::new(64);
        assert!(norm.scale.borrow().data.iter().all(|v| (v - 1.0).abs() < 0.2));
        assert!(norm.offset.borrow().data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_instancenorm_gradient() {
        let norm = InstanceNorm2d::new(2);
        let x = RawTensor::new(
            vec![0.3, -1.2, 0.8, 1.9, -0.5, 0.4, 2.1, -1.7],
            &[1, 2, 2, 2],
            true,
        );
        let w = RawTensor::from_vec(vec![1.0, -0.5, 2.0, 0.3, -1.0, 0.7, 0.2, 1.5], &[1, 2, 2, 2]);
        assert!(check_gradients_simple(&x, |t| norm.forward(t).elem_mul(&w).sum()));
    }
}
