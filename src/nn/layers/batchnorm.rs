use crate::io::{StateDict, load_entries, state_dict_from};
use crate::nn::Module;
use crate::tensor::{RawTensor, Tensor, TensorOps};

/// Batch normalization over `(B, H, W)` per channel.
///
/// Defaults: eps 1e-3 and a running-stat update of
/// `0.99 * running + 0.01 * batch`.
pub struct BatchNorm2d {
    num_features: usize,
    eps: f32,
    momentum: f32,
    training: bool,
    // Parameters (Learnable)
    gamma: Tensor,
    beta: Tensor,
    // Buffers (Non-learnable)
    running_mean: Tensor,
    running_var: Tensor,
}

impl BatchNorm2d {
    pub fn new(num_features: usize) -> Self {
        Self::new_with_params(num_features, 1e-3, 0.01)
    }

    pub fn new_with_params(num_features: usize, eps: f32, momentum: f32) -> Self {
        let gamma = RawTensor::ones(&[num_features]);
        gamma.borrow_mut().requires_grad = true;

        let beta = RawTensor::zeros(&[num_features]);
        beta.borrow_mut().requires_grad = true;

        BatchNorm2d {
            num_features,
            eps,
            momentum,
            training: true,
            gamma,
            beta,
            running_mean: RawTensor::zeros(&[num_features]),
            running_var: RawTensor::ones(&[num_features]),
        }
    }

    fn update_running_stats(&self, batch_mean: &Tensor, batch_var: &Tensor) {
        let m = self.momentum;
        let mut rm = self.running_mean.borrow_mut();
        let mut rv = self.running_var.borrow_mut();
        let bm = batch_mean.borrow();
        let bv = batch_var.borrow();
        for i in 0..self.num_features {
            rm.data[i] = (1.0 - m) * rm.data[i] + m * bm.data[i];
            rv.data[i] = (1.0 - m) * rv.data[i] + m * bv.data[i];
        }
    }
}

impl Module for BatchNorm2d {
    fn forward(&self, x: &Tensor) -> Tensor {
        let (b, c, h, w) = {
            let s = x.borrow();
            assert_eq!(s.shape.len(), 4, "BatchNorm2d expected 4D input (B,C,H,W)");
            (s.shape[0], s.shape[1], s.shape[2], s.shape[3])
        };
        assert_eq!(c, self.num_features, "Channel mismatch");

        // (B, C, H, W) -> (C, B, H, W) -> (C, B*H*W)
        let x_flat = x.permute(&[1, 0, 2, 3]).reshape(&[c, b * h * w]);

        let (mean, var) = if self.training {
            let batch_mean = x_flat.mean_dim(1, true); // (C, 1)
            let diff = x_flat.sub(&batch_mean);
            let batch_var = diff.elem_mul(&diff).mean_dim(1, true); // biased
            self.update_running_stats(&batch_mean, &batch_var);
            (batch_mean, batch_var)
        } else {
            (
                self.running_mean.reshape(&[c, 1]),
                self.running_var.reshape(&[c, 1]),
            )
        };

        let x_norm = x_flat.sub(&mean).div(&var.add_scalar(self.eps).sqrt());
        let out_flat = x_norm
            .elem_mul(&self.gamma.reshape(&[c, 1]))
            .add(&self.beta.reshape(&[c, 1]));

        out_flat.reshape(&[c, b, h, w]).permute(&[1, 0, 2, 3])
    }

    fn parameters(&self) -> Vec<Tensor> {
        vec![self.gamma.clone(), self.beta.clone()]
    }

    fn train(&mut self, mode: bool) {
        self.training = mode;
    }

    fn state_dict(&self) -> StateDict {
        state_dict_from(&[
            ("gamma", &self.gamma),
            ("beta", &self.beta),
            ("running_mean", &self.running_mean),
            ("running_var", &self.running_var),
        ])
    }

    fn load_state_dict(&mut self, state: &StateDict) {
        load_entries(
            state,
            &[
                ("gamma", &self.gamma),
                ("beta", &self.beta),
                ("running_mean", &self.running_mean),
                ("running_var", &self.running_var),
            ],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::check_gradients_simple;
    use approx::assert_relative_eq;

    #[test]
    fn test_train_output_is_normalized_per_channel() {
        let bn = BatchNorm2d::new(2);
        let x = RawTensor::from_vec(
            vec![1.0, 2.0, 3.0, 4.0, 10.0, 20.0, 30.0, 40.0],
            &[2, 2, 1, 2],
        );
        let y = bn.forward(&x);
        let d = y.borrow().data.clone();
        // channel 0 = {1, 2, 10, 20}
        let ch0 = [d[0], d[1], d[4], d[5]];
        let mean: f32 = ch0.iter().sum::<f32>() / 4.0;
        assert_relative_eq!(mean, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_running_stats_update_and_eval() {
        let mut bn = BatchNorm2d::new(1);
        let x = RawTensor::from_vec(vec![2.0, 4.0, 6.0, 8.0], &[1, 1, 2, 2]);
        let _ = bn.forward(&x);
        let rm = bn.running_mean.borrow().data[0];
        assert_relative_eq!(rm, 0.01 * 5.0, epsilon = 1e-6);

        bn.eval();
        let before = bn.running_mean.borrow().data.clone();
        let _ = bn.forward(&x);
        assert_eq!(bn.running_mean.borrow().data, before);
    }

    #[test]
    fn test_batchnorm_gradient() {
        let bn = BatchNorm2d::new(2);
        let x = RawTensor::new(
            (0..16).map(|i| ((i * 7) % 11) as f32 * 0.3 - 1.4).collect(),
            &[2, 2, 2, 2],
            true,
        );
        let w = RawTensor::from_vec((0..16).map(|i| ((i * 5) % 7) as f32 - 3.0).collect(), &[2, 2, 2, 2]);
        assert!(check_gradients_simple(&x, |t| bn.forward(t).elem_mul(&w).sum()));
    }
}
