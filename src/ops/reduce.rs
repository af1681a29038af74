use crate::autograd::GradFn;
use crate::{RawTensor, Tensor};

/// Reduction operations
///
/// Either collapse every dimension to a `[1]` scalar or a single dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,  // Σ(x) - gradient broadcasts ones
    Mean, // mean(x) - gradient broadcasts 1/n
}

/// View of a shape around one reduced dimension: `[outer, n, inner]`.
#[derive(Clone, Copy)]
struct Axis {
    outer: usize,
    n: usize,
    inner: usize,
}

impl Axis {
    fn new(shape: &[usize], dim: usize) -> Self {
        assert!(
            dim < shape.len(),
            "Reduction dim {dim} out of range for shape {shape:?}"
        );
        Self {
            outer: shape[..dim].iter().product(),
            n: shape[dim],
            inner: shape[dim + 1..].iter().product(),
        }
    }
}

/// Gradient function for reductions
///
/// The output gradient is broadcast back over the reduced elements, scaled
/// by `1/n` for means.
pub struct ReduceGradFn {
    input_len: usize,
    axis: Option<Axis>,
    scale: f32,
}

impl GradFn for ReduceGradFn {
    fn backward(&self, out_grad: &[f32], _parents: &[Tensor]) -> Vec<Option<Vec<f32>>> {
        let grad = match self.axis {
            None => vec![out_grad[0] * self.scale; self.input_len],
            Some(Axis { outer, n, inner }) => {
                let mut grad = vec![0.0; self.input_len];
                for o in 0..outer {
                    for k in 0..n {
                        let dst = (o * n + k) * inner;
                        let src = o * inner;
                        for i in 0..inner {
                            grad[dst + i] = out_grad[src + i] * self.scale;
                        }
                    }
                }
                grad
            }
        };
        vec![Some(grad)]
    }
}

// ===== REDUCE OPERATIONS =====

impl RawTensor {
    /// Apply a reduction that collapses the tensor to a `[1]` scalar
    pub fn reduce_op(self_t: &Tensor, op: ReduceOp) -> Tensor {
        let (value, len) = {
            let s = self_t.borrow();
            let sum: f32 = s.data.iter().sum();
            let len = s.data.len();
            match op {
                ReduceOp::Sum => (sum, len),
                ReduceOp::Mean => (sum / len as f32, len),
            }
        };
        let scale = match op {
            ReduceOp::Sum => 1.0,
            ReduceOp::Mean => 1.0 / len as f32,
        };
        Self::from_op(
            vec![value],
            &[1],
            vec![self_t.clone()],
            ReduceGradFn {
                input_len: len,
                axis: None,
                scale,
            },
        )
    }

    /// Reduce along `dim`; `keepdim` leaves a size-1 dimension in its place.
    pub fn reduce_dim(self_t: &Tensor, op: ReduceOp, dim: usize, keepdim: bool) -> Tensor {
        let (data, out_shape, axis, len) = {
            let s = self_t.borrow();
            let axis = Axis::new(&s.shape, dim);
            let scale = match op {
                ReduceOp::Sum => 1.0,
                ReduceOp::Mean => 1.0 / axis.n as f32,
            };
            let mut out = vec![0.0; axis.outer * axis.inner];
            for o in 0..axis.outer {
                for k in 0..axis.n {
                    let src = (o * axis.n + k) * axis.inner;
                    let dst = o * axis.inner;
                    for i in 0..axis.inner {
                        out[dst + i] += s.data[src + i];
                    }
                }
            }
            out.iter_mut().for_each(|v| *v *= scale);

            let mut out_shape = s.shape.clone();
            if keepdim {
                out_shape[dim] = 1;
            } else {
                out_shape.remove(dim);
                if out_shape.is_empty() {
                    out_shape.push(1);
                }
            }
            (out, out_shape, axis, s.data.len())
        };
        let scale = match op {
            ReduceOp::Sum => 1.0,
            ReduceOp::Mean => 1.0 / axis.n as f32,
        };
        Self::from_op(
            data,
            &out_shape,
            vec![self_t.clone()],
            ReduceGradFn {
                input_len: len,
                axis: Some(axis),
                scale,
            },
        )
    }

    pub fn sum(self_t: &Tensor) -> Tensor {
        Self::reduce_op(self_t, ReduceOp::Sum)
    }
    pub fn mean(self_t: &Tensor) -> Tensor {
        Self::reduce_op(self_t, ReduceOp::Mean)
    }
    pub fn sum_dim(self_t: &Tensor, dim: usize, keepdim: bool) -> Tensor {
        Self::reduce_dim(self_t, ReduceOp::Sum, dim, keepdim)
    }
    pub fn mean_dim(self_t: &Tensor, dim: usize, keepdim: bool) -> Tensor {
        Self::reduce_dim(self_t, ReduceOp::Mean, dim, keepdim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{TensorOps, check_gradients_simple};
    use approx::assert_relative_eq;

    #[test]
    fn test_mean_and_sum() {
        let x = RawTensor::from_vec(vec![1.0, 2.0, 3.0, 6.0], &[2, 2]);
        assert_relative_eq!(x.sum().item(), 12.0);
        assert_relative_eq!(x.mean().item(), 3.0);
    }

    #[test]
    fn test_mean_dim_shapes() {
        let x = RawTensor::from_vec((0..24).map(|v| v as f32).collect(), &[2, 3, 4]);
        let m = x.mean_dim(1, true);
        assert_eq!(m.shape(), vec![2, 1, 4]);
        // first column: mean(0, 4, 8) = 4
        assert_relative_eq!(m.borrow().data[0], 4.0);
        let s = x.sum_dim(2, false);
        assert_eq!(s.shape(), vec![2, 3]);
        assert_relative_eq!(s.borrow().data[0], 6.0);
    }

    #[test]
    fn test_reduce_dim_gradients() {
        let x = RawTensor::new(
            vec![0.1, -0.4, 0.8, 1.3, -0.2, 0.5, 0.9, -1.1],
            &[2, 2, 2],
            true,
        );
        let w = RawTensor::from_vec(vec![1.0, -2.0, 3.0, 0.5], &[2, 2]);
        assert!(check_gradients_simple(&x, |t| t.mean_dim(1, false).elem_mul(&w).sum()));
        assert!(check_gradients_simple(&x, |t| t.sum_dim(0, false).elem_mul(&w).sum()));
    }
}
