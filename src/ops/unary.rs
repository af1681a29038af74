use crate::autograd::GradFn;
use crate::{RawTensor, Tensor};

/// Unary operations: single input, single output
///
/// Each operation has a corresponding derivative:
/// - Neg: d(-x)/dx = -1
/// - Sqrt: d(√x)/dx = 1/(2√x)
/// - Exp: d(eˣ)/dx = eˣ
/// - Log: d(ln(x))/dx = 1/x
/// - Abs: d|x|/dx = sign(x), 0 at 0
/// - Tanh: d(tanh(x))/dx = 1 - tanh²(x)
/// - Sigmoid: d(σ(x))/dx = σ(x)·(1-σ(x))
/// - `ReLU`: d(max(0,x))/dx = x > 0 ? 1 : 0
/// - `LeakyReLU(α)`: x > 0 ? 1 : α
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UnaryOp {
    Neg,
    Sqrt,
    Exp,
    Log,
    Abs,
    Tanh,
    Sigmoid,
    ReLU,
    LeakyReLU(f32),
}

impl UnaryOp {
    fn apply(self, x: f32) -> f32 {
        match self {
            Self::Neg => -x,
            Self::Sqrt => x.sqrt(),
            Self::Exp => x.exp(),
            Self::Log => x.ln(),
            Self::Abs => x.abs(),
            Self::Tanh => x.tanh(),
            Self::Sigmoid => sigmoid(x),
            Self::ReLU => x.max(0.0),
            Self::LeakyReLU(alpha) => {
                if x > 0.0 {
                    x
                } else {
                    alpha * x
                }
            }
        }
    }

    fn derivative(self, x: f32) -> f32 {
        match self {
            Self::Neg => -1.0,
            Self::Sqrt => 0.5 / x.sqrt(),
            Self::Exp => x.exp(),
            Self::Log => 1.0 / x,
            Self::Abs => {
                if x > 0.0 {
                    1.0
                } else if x < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            }
            Self::Tanh => {
                let t = x.tanh();
                t.mul_add(-t, 1.0)
            }
            Self::Sigmoid => {
                let s = sigmoid(x);
                s * (1.0 - s)
            }
            Self::ReLU => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::LeakyReLU(alpha) => {
                if x > 0.0 {
                    1.0
                } else {
                    alpha
                }
            }
        }
    }
}

pub(crate) fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Gradient function for unary operations
///
/// Stores which operation was performed so backward can apply the correct derivative.
pub struct UnaryGradFn {
    op: UnaryOp,
}

impl GradFn for UnaryGradFn {
    fn backward(&self, out_grad: &[f32], parents: &[Tensor]) -> Vec<Option<Vec<f32>>> {
        let x = parents[0].borrow();
        // Chain rule: ∂L/∂x = ∂L/∂y · f'(x)
        let grad = out_grad
            .iter()
            .zip(&x.data)
            .map(|(&g, &x)| g * self.op.derivative(x))
            .collect();
        vec![Some(grad)]
    }
}

// ===== UNARY OPERATIONS =====
impl RawTensor {
    /// Apply a unary operation element-wise
    pub fn unary_op(t: &Tensor, op: UnaryOp) -> Tensor {
        let (data, shape) = {
            let s = t.borrow();
            (s.data.iter().map(|&x| op.apply(x)).collect(), s.shape.clone())
        };
        Self::from_op(data, &shape, vec![t.clone()], UnaryGradFn { op })
    }

    pub fn neg(t: &Tensor) -> Tensor {
        Self::unary_op(t, UnaryOp::Neg)
    }
    pub fn sqrt(t: &Tensor) -> Tensor {
        Self::unary_op(t, UnaryOp::Sqrt)
    }
    pub fn exp(t: &Tensor) -> Tensor {
        Self::unary_op(t, UnaryOp::Exp)
    }
    pub fn log(t: &Tensor) -> Tensor {
        Self::unary_op(t, UnaryOp::Log)
    }
    pub fn abs(t: &Tensor) -> Tensor {
        Self::unary_op(t, UnaryOp::Abs)
    }
    pub fn tanh(t: &Tensor) -> Tensor {
        Self::unary_op(t, UnaryOp::Tanh)
    }
    pub fn sigmoid(t: &Tensor) -> Tensor {
        Self::unary_op(t, UnaryOp::Sigmoid)
    }
    pub fn relu(t: &Tensor) -> Tensor {
        Self::unary_op(t, UnaryOp::ReLU)
    }
    pub fn leaky_relu(t: &Tensor, alpha: f32) -> Tensor {
        Self::unary_op(t, UnaryOp::LeakyReLU(alpha))
    }
}
