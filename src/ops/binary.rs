use crate::autograd::GradFn;
use crate::{RawTensor, Tensor};

/// Binary operations: two inputs, one output
///
/// Broadcasting follows NumPy rules (trailing dimensions aligned, size-1
/// dimensions stretched).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add, // x + y
    Sub, // x - y
    Mul, // x * y (element-wise)
    Div, // x / y (element-wise)
}

impl BinaryOp {
    fn apply(self, x: f32, y: f32) -> f32 {
        match self {
            Self::Add => x + y,
            Self::Sub => x - y,
            Self::Mul => x * y,
            Self::Div => x / y,
        }
    }

    /// (∂/∂x, ∂/∂y) at (x, y)
    fn partials(self, x: f32, y: f32) -> (f32, f32) {
        match self {
            Self::Add => (1.0, 1.0),
            Self::Sub => (1.0, -1.0),
            Self::Mul => (y, x),
            Self::Div => (1.0 / y, -x / (y * y)),
        }
    }
}

/// Row-major strides for `shape`.
pub(crate) fn compute_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

/// For every flat index of `out_shape`, the flat index it reads from a
/// tensor of `from_shape` broadcast up to `out_shape`.
fn broadcast_index(from_shape: &[usize], out_shape: &[usize]) -> Vec<usize> {
    let size: usize = out_shape.iter().product();
    if from_shape == out_shape {
        return (0..size).collect();
    }

    let offset = out_shape.len() - from_shape.len();
    let from_strides = compute_strides(from_shape);
    let out_strides = compute_strides(out_shape);

    (0..size)
        .map(|i| {
            let mut src = 0;
            for (dim, &out_stride) in out_strides.iter().enumerate().skip(offset) {
                let coord = (i / out_stride) % out_shape[dim];
                let d = dim - offset;
                if from_shape[d] != 1 {
                    src += coord * from_strides[d];
                }
            }
            src
        })
        .collect()
}

/// Gradient function for binary operations
///
/// Gradients are summed over dimensions that were broadcast in the forward pass.
pub struct BinaryGradFn {
    op: BinaryOp,
    out_shape: Vec<usize>,
}

impl GradFn for BinaryGradFn {
    fn backward(&self, out_grad: &[f32], parents: &[Tensor]) -> Vec<Option<Vec<f32>>> {
        let x = parents[0].borrow();
        let y = parents[1].borrow();
        let ix = broadcast_index(&x.shape, &self.out_shape);
        let iy = broadcast_index(&y.shape, &self.out_shape);

        let mut gx = x.requires_grad.then(|| vec![0.0; x.data.len()]);
        let mut gy = y.requires_grad.then(|| vec![0.0; y.data.len()]);

        for (i, &g) in out_grad.iter().enumerate() {
            let (a, b) = (x.data[ix[i]], y.data[iy[i]]);
            let (da, db) = self.op.partials(a, b);
            if let Some(gx) = gx.as_mut() {
                gx[ix[i]] += g * da;
            }
            if let Some(gy) = gy.as_mut() {
                gy[iy[i]] += g * db;
            }
        }
        vec![gx, gy]
    }
}

impl RawTensor {
    /// NumPy-style broadcast of two shapes.
    ///
    /// # Panics
    /// If a pair of aligned dimensions differ and neither is 1.
    pub fn broadcast_shape(shape_a: &[usize], shape_b: &[usize]) -> Vec<usize> {
        let rank = shape_a.len().max(shape_b.len());
        let dim = |shape: &[usize], i: usize| -> usize {
            (i + shape.len())
                .checked_sub(rank)
                .map_or(1, |idx| shape[idx])
        };
        (0..rank)
            .map(|i| match (dim(shape_a, i), dim(shape_b, i)) {
                (a, b) if a == b => a,
                (1, b) => b,
                (a, 1) => a,
                (a, b) => panic!("Cannot broadcast shapes {shape_a:?} and {shape_b:?} ({a} vs {b})"),
            })
            .collect()
    }

    /// Apply a binary operation with broadcasting
    pub fn binary_op(self_t: &Tensor, other: &Tensor, op: BinaryOp) -> Tensor {
        let (data, out_shape) = {
            let a = self_t.borrow();
            let b = other.borrow();
            let out_shape = Self::broadcast_shape(&a.shape, &b.shape);
            let data = if a.shape == b.shape {
                a.data
                    .iter()
                    .zip(&b.data)
                    .map(|(&x, &y)| op.apply(x, y))
                    .collect()
            } else {
                let ia = broadcast_index(&a.shape, &out_shape);
                let ib = broadcast_index(&b.shape, &out_shape);
                ia.iter()
                    .zip(&ib)
                    .map(|(&i, &j)| op.apply(a.data[i], b.data[j]))
                    .collect()
            };
            (data, out_shape)
        };
        Self::from_op(
            data,
            &out_shape,
            vec![self_t.clone(), other.clone()],
            BinaryGradFn {
                op,
                out_shape: out_shape.clone(),
            },
        )
    }

    pub fn add(self_t: &Tensor, other: &Tensor) -> Tensor {
        Self::binary_op(self_t, other, BinaryOp::Add)
    }
    pub fn sub(self_t: &Tensor, other: &Tensor) -> Tensor {
        Self::binary_op(self_t, other, BinaryOp::Sub)
    }
    pub fn elem_mul(self_t: &Tensor, other: &Tensor) -> Tensor {
        Self::binary_op(self_t, other, BinaryOp::Mul)
    }
    pub fn div(self_t: &Tensor, other: &Tensor) -> Tensor {
        Self::binary_op(self_t, other, BinaryOp::Div)
    }
}
