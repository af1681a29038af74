use crate::autograd::GradFn;
use crate::ops::binary::compute_strides;
use crate::{RawTensor, Tensor};

/// Movement operations: rearrange elements without arithmetic
#[derive(Clone, Debug)]
pub enum MovementOp {
    Reshape,                              // Change shape, preserve order
    Permute { axes: Vec<usize> },         // Reorder axes
    Pad { padding: Vec<(usize, usize)> }, // Add zeros around edges
}

/// Gradient function for single-input movement operations
///
/// Each backward undoes the forward rearrangement on the gradient.
pub struct MovementGradFn {
    op: MovementOp,
    original_shape: Vec<usize>,
}

impl GradFn for MovementGradFn {
    fn backward(&self, out_grad: &[f32], _parents: &[Tensor]) -> Vec<Option<Vec<f32>>> {
        let grad = match &self.op {
            MovementOp::Reshape => out_grad.to_vec(),
            MovementOp::Permute { axes } => {
                let index = permute_index(&self.original_shape, axes);
                let mut grad = vec![0.0; out_grad.len()];
                for (o, &src) in index.iter().enumerate() {
                    grad[src] = out_grad[o];
                }
                grad
            }
            MovementOp::Pad { padding } => pad_index(&self.original_shape, padding)
                .into_iter()
                .map(|dst| out_grad[dst])
                .collect(),
        };
        vec![Some(grad)]
    }
}

/// For each output position of `permute(shape, axes)`, its flat index in the input.
fn permute_index(shape: &[usize], axes: &[usize]) -> Vec<usize> {
    let in_strides = compute_strides(shape);
    let out_shape: Vec<usize> = axes.iter().map(|&a| shape[a]).collect();
    let out_strides = compute_strides(&out_shape);
    let size: usize = shape.iter().product();

    (0..size)
        .map(|o| {
            axes.iter()
                .enumerate()
                .map(|(d, &a)| ((o / out_strides[d]) % out_shape[d]) * in_strides[a])
                .sum()
        })
        .collect()
}

/// For each input position, its flat index in the zero-padded output.
fn pad_index(shape: &[usize], padding: &[(usize, usize)]) -> Vec<usize> {
    let new_shape: Vec<usize> = shape
        .iter()
        .zip(padding)
        .map(|(d, (l, r))| d + l + r)
        .collect();
    let in_strides = compute_strides(shape);
    let out_strides = compute_strides(&new_shape);
    let size: usize = shape.iter().product();

    (0..size)
        .map(|i| {
            (0..shape.len())
                .map(|d| ((i / in_strides[d]) % shape[d] + padding[d].0) * out_strides[d])
                .sum()
        })
        .collect()
}

/// Gradient function for concatenation: slices the output gradient back apart.
pub struct ConcatGradFn {
    dim: usize,
    sizes: Vec<usize>,
    outer: usize,
    inner: usize,
}

impl GradFn for ConcatGradFn {
    fn backward(&self, out_grad: &[f32], parents: &[Tensor]) -> Vec<Option<Vec<f32>>> {
        let total: usize = self.sizes.iter().sum();
        let mut offset = 0;
        let mut grads = Vec::with_capacity(parents.len());
        for (parent, &n) in parents.iter().zip(&self.sizes) {
            if parent.borrow().requires_grad {
                let mut g = Vec::with_capacity(self.outer * n * self.inner);
                for o in 0..self.outer {
                    let start = (o * total + offset) * self.inner;
                    g.extend_from_slice(&out_grad[start..start + n * self.inner]);
                }
                grads.push(Some(g));
            } else {
                grads.push(None);
            }
            offset += n;
        }
        debug_assert_eq!(offset, total, "concat dim {} sizes out of sync", self.dim);
        grads
    }
}

impl RawTensor {
    /// Reshape tensor to new dimensions (total elements must match)
    pub fn reshape(self_t: &Tensor, new_shape: &[usize]) -> Tensor {
        let (data, old_shape) = {
            let s = self_t.borrow();
            (s.data.clone(), s.shape.clone())
        };
        let new_size: usize = new_shape.iter().product();
        assert_eq!(
            data.len(),
            new_size,
            "Cannot reshape {old_shape:?} into {new_shape:?}"
        );
        Self::from_op(
            data,
            new_shape,
            vec![self_t.clone()],
            MovementGradFn {
                op: MovementOp::Reshape,
                original_shape: old_shape,
            },
        )
    }

    /// Reorder axes; `axes[d]` names the input axis that becomes output axis `d`.
    pub fn permute(self_t: &Tensor, axes: &[usize]) -> Tensor {
        let (data, old_shape, new_shape) = {
            let s = self_t.borrow();
            assert_eq!(
                axes.len(),
                s.shape.len(),
                "Permute axes {axes:?} do not match rank of {:?}",
                s.shape
            );
            let new_shape: Vec<usize> = axes.iter().map(|&a| s.shape[a]).collect();
            let data = permute_index(&s.shape, axes)
                .into_iter()
                .map(|src| s.data[src])
                .collect();
            (data, s.shape.clone(), new_shape)
        };
        Self::from_op(
            data,
            &new_shape,
            vec![self_t.clone()],
            MovementGradFn {
                op: MovementOp::Permute {
                    axes: axes.to_vec(),
                },
                original_shape: old_shape,
            },
        )
    }

    /// Zero-pad each dimension by `(before, after)`
    pub fn pad(self_t: &Tensor, padding: &[(usize, usize)]) -> Tensor {
        let (data, old_shape, new_shape) = {
            let s = self_t.borrow();
            assert_eq!(
                padding.len(),
                s.shape.len(),
                "Padding length must match rank"
            );
            let new_shape: Vec<usize> = s
                .shape
                .iter()
                .zip(padding)
                .map(|(d, (l, r))| d + l + r)
                .collect();
            let mut out = vec![0.0; new_shape.iter().product()];
            for (i, dst) in pad_index(&s.shape, padding).into_iter().enumerate() {
                out[dst] = s.data[i];
            }
            (out, s.shape.clone(), new_shape)
        };
        Self::from_op(
            data,
            &new_shape,
            vec![self_t.clone()],
            MovementGradFn {
                op: MovementOp::Pad {
                    padding: padding.to_vec(),
                },
                original_shape: old_shape,
            },
        )
    }

    /// Concatenate tensors along `dim`. All other dimensions must agree.
    ///
    /// # Panics
    /// On an empty slice or mismatched shapes.
    pub fn concat(tensors: &[Tensor], dim: usize) -> Tensor {
        assert!(!tensors.is_empty(), "concat needs at least one tensor");
        let first_shape = tensors[0].borrow().shape.clone();
        assert!(dim < first_shape.len(), "concat dim {dim} out of range");
        let outer: usize = first_shape[..dim].iter().product();
        let inner: usize = first_shape[dim + 1..].iter().product();

        let mut sizes = Vec::with_capacity(tensors.len());
        for t in tensors {
            let s = t.borrow();
            let same_rest = s.shape.len() == first_shape.len()
                && s.shape
                    .iter()
                    .zip(&first_shape)
                    .enumerate()
                    .all(|(d, (a, b))| d == dim || a == b);
            assert!(
                same_rest,
                "Cannot concat {:?} with {first_shape:?} along dim {dim}",
                s.shape
            );
            sizes.push(s.shape[dim]);
        }

        let total: usize = sizes.iter().sum();
        let mut data = Vec::with_capacity(outer * total * inner);
        for o in 0..outer {
            for (t, &n) in tensors.iter().zip(&sizes) {
                let s = t.borrow();
                let start = o * n * inner;
                data.extend_from_slice(&s.data[start..start + n * inner]);
            }
        }

        let mut out_shape = first_shape;
        out_shape[dim] = total;
        Self::from_op(
            data,
            &out_shape,
            tensors.to_vec(),
            ConcatGradFn {
                dim,
                sizes,
                outer,
                inner,
            },
        )
    }
}
