use crate::io::{StateDict, load_entries, state_dict_from};
use crate::nn::Module;
use crate::tensor::{RawTensor, Tensor, TensorOps};

/// Standard deviation of the normal weight init used by every conv layer.
pub const INIT_STD: f32 = 0.02;

pub struct Conv2d {
    weight: Tensor,       // [out_channels, in_channels, kernel, kernel]
    bias: Option<Tensor>, // [out_channels]
    stride: usize,
    padding: usize,
}

impl Conv2d {
    /// Square-kernel convolution with weights drawn from N(0, 0.02).
    pub fn new(
        in_ch: usize,
        out_ch: usize,
        kernel: usize,
        stride: usize,
        padding: usize,
        use_bias: bool,
    ) -> Self {
        let weight = RawTensor::parameter(&[out_ch, in_ch, kernel, kernel], 0.0, INIT_STD);
        let bias = use_bias.then(|| {
            let b = RawTensor::zeros(&[out_ch]);
            b.borrow_mut().requires_grad = true;
            b
        });
        Conv2d {
            weight,
            bias,
            stride,
            padding,
        }
    }

    pub fn out_channels(&self) -> usize {
        self.weight.borrow().shape[0]
    }
}

impl Module for Conv2d {
    fn forward(&self, x: &Tensor) -> Tensor {
        let y = RawTensor::conv2d(x, &self.weight, self.stride, self.padding);
        match &self.bias {
            Some(b) => y.add(&b.reshape(&[1, self.out_channels(), 1, 1])),
            None => y,
        }
    }

    fn parameters(&self) -> Vec<Tensor> {
        let mut p = vec![self.weight.clone()];
        p.extend(self.bias.iter().cloned());
        p
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
