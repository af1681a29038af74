use crate::io::{StateDict, load_entries, state_dict_from};
use crate::nn::Module;
use crate::nn::layers::conv::INIT_STD;
use crate::tensor::{RawTensor, Tensor, TensorOps};

/// Transposed 2D convolution (also called deconvolution)
///
/// Used for upsampling in the generator's decoder.
/// The operation is the gradient of Conv2d with respect to its input.
///
/// Output size: `H_out` = (`H_in` - 1) * stride + kernel - 2*padding
pub struct ConvTranspose2d {
    weight: Tensor,       // [in_channels, out_channels, kernel, kernel]
    bias: Option<Tensor>, // [out_channels]
    stride: usize,
    padding: usize,
}

impl ConvTranspose2d {
    pub fn new(
        in_ch: usize,
        out_ch: usize,
        kernel: usize,
        stride: usize,
        padding: usize,
        use_bias: bool,
    ) -> Self {
        let weight = RawTensor::parameter(&[in_ch, out_ch, kernel, kernel], 0.0, INIT_STD);
        let bias = use_bias.then(|| {
            let b = RawTensor::zeros(&[out_ch]);
            b.borrow_mut().requires_grad = true;
            b
        });
        ConvTranspose2d {
            weight,
            bias,
            stride,
            padding,
        }
    }

    pub fn out_channels(&self) -> usize {
        self.weight.borrow().shape[1]
    }
}

impl Module for ConvTranspose2d {
    fn forward(&self, x: &Tensor) -> Tensor {
        let y = RawTensor::conv_transpose2d(x, &self.weight, self.stride, self.padding);
        match &self.bias {
            Some(b) => y.add(&b.reshape(&[1, self.out_channels(), 1, 1])),
            None => y,
        }
    }

    fn parameters(&self) -> Vec<Tensor> {
        let mut params = vec![self.weight.clone()];
        params.extend(self.bias.iter().cloned());
        params
    }

    fn state_dict(&self) -> StateDict {
        let mut entries = vec![("weight", &self.weight)];
        if let Some(b) = &self.bias {
            entries.push(("bias", b));
        }
        state_dict_from(&entries)
    }

    fn load_state_dict(&mut self, state: &StateDict) {
        load_entries(state, &[("weight", &self.weight)]);
        if let Some(b) = &self.bias {
            load_entries(state, &[("bias", b)]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{check_gradients, manual_seed};

    #[test]
    fn test_conv_transpose_doubles_resolution() {
        let layer = ConvTranspose2d::new(4, 2, 4, 2, 1, true);
        let x = RawTensor::randn(&[1, 4, 3, 5]);
        assert_eq!(layer.forward(&x).shape(), vec![1, 2, 6, 10]);
        assert_eq!(layer.parameters().len(), 2);
    }

    #[test]
    fn test_conv_transpose_input_gradient() {
        manual_seed(5);
        let layer = ConvTranspose2d::new(2, 2, 4, 2, 1, true);
        let x = RawTensor::randn(&[1, 2, 2, 2]);
        x.borrow_mut().requires_grad = true;
        // linear in x, so central differences are exact up to rounding
        let w = RawTensor::randn(&[1, 2, 4, 4]);
        let (max_error, _, passed) =
            check_gradients(&x, |t| layer.forward(t).elem_mul(&w).sum(), 1e-2, 5e-2);
        assert!(passed, "max error {max_error}");
    }

    #[test]
    fn test_state_dict_round_trip() {
        let a = ConvTranspose2d::new(2, 3, 4, 2, 1, false);
        let mut b = ConvTranspose2d::new(2, 3, 4, 2, 1, false);
        b.load_state_dict(&a.state_dict());
        assert_eq!(a.state_dict(), b.state_dict());
    }
}
