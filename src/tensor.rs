use crate::autograd::{self, GradFn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use std::cell::RefCell;
use std::rc::Rc;

/// Type alias for a reference-counted, interior-mutable tensor.
///
/// Graph nodes share their parents through `Rc`, and optimizers mutate
/// parameter data in place through the `RefCell`. Single-threaded only.
pub type Tensor = Rc<RefCell<RawTensor>>;

// ===== RAW TENSOR STRUCTURE =====

/// Flat row-major `f32` storage plus the bookkeeping reverse-mode autodiff needs.
pub struct RawTensor {
    pub data: Vec<f32>,         // len = prod(shape)
    pub shape: Vec<usize>,      // e.g. [B, C, H, W]
    pub grad: Option<Vec<f32>>, // filled by `backward`
    pub requires_grad: bool,
    pub grad_fn: Option<Rc<dyn GradFn>>,
    pub parents: Vec<Tensor>,
}

impl std::fmt::Debug for RawTensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("requires_grad", &self.requires_grad)
            .field("has_grad", &self.grad.is_some())
            .field("has_grad_fn", &self.grad_fn.is_some())
            .finish()
    }
}

thread_local! {
    static RNG: RefCell<StdRng> = RefCell::new(StdRng::from_os_rng());
}

/// Reseed the thread-local generator used for weight init and dropout masks.
pub fn manual_seed(seed: u64) {
    RNG.with(|rng| *rng.borrow_mut() = StdRng::seed_from_u64(seed));
}

/// Run `f` with the thread-local generator.
pub fn with_rng<T>(f: impl FnOnce(&mut StdRng) -> T) -> T {
    RNG.with(|rng| f(&mut rng.borrow_mut()))
}

// ===== TENSOR CONSTRUCTORS =====
impl RawTensor {
    /// Create a new tensor from data and shape
    ///
    /// # Panics
    /// Panics if `data.len()` != product of `shape`
    pub fn new(data: Vec<f32>, shape: &[usize], requires_grad: bool) -> Tensor {
        assert_eq!(
            data.len(),
            shape.iter().product::<usize>(),
            "Data length must match shape {shape:?}"
        );
        Rc::new(RefCell::new(RawTensor {
            data,
            shape: shape.to_vec(),
            grad: None,
            requires_grad,
            grad_fn: None,
            parents: vec![],
        }))
    }

    pub fn zeros(shape: &[usize]) -> Tensor {
        Self::constant(0.0, shape)
    }

    pub fn ones(shape: &[usize]) -> Tensor {
        Self::constant(1.0, shape)
    }

    pub fn constant(value: f32, shape: &[usize]) -> Tensor {
        let size = shape.iter().product();
        Self::new(vec![value; size], shape, false)
    }

    pub fn from_vec(data: Vec<f32>, shape: &[usize]) -> Tensor {
        Self::new(data, shape, false)
    }

    /// Values drawn from N(0, 1)
    pub fn randn(shape: &[usize]) -> Tensor {
        Self::normal(shape, 0.0, 1.0)
    }

    /// Values drawn from N(mean, std²). Used for the N(0, 0.02) conv init.
    pub fn normal(shape: &[usize], mean: f32, std: f32) -> Tensor {
        let size = shape.iter().product();
        let data = with_rng(|rng| {
            (0..size)
                .map(|_| {
                    let z: f32 = StandardNormal.sample(rng);
                    z.mul_add(std, mean)
                })
                .collect()
        });
        Self::new(data, shape, false)
    }

    /// A learnable leaf: same as `normal` but tracked by autograd.
    pub fn parameter(shape: &[usize], mean: f32, std: f32) -> Tensor {
        let t = Self::normal(shape, mean, std);
        t.borrow_mut().requires_grad = true;
        t
    }

    /// Build the output of a differentiable op.
    ///
    /// Gradient tracking is attached only if some parent requires grad and
    /// recording is enabled (see [`autograd::no_grad`]).
    pub(crate) fn from_op(
        data: Vec<f32>,
        shape: &[usize],
        parents: Vec<Tensor>,
        grad_fn: impl GradFn + 'static,
    ) -> Tensor {
        let requires_grad =
            autograd::is_grad_enabled() && parents.iter().any(|p| p.borrow().requires_grad);
        let out = Self::new(data, shape, requires_grad);
        if requires_grad {
            let mut o = out.borrow_mut();
            o.parents = parents;
            o.grad_fn = Some(Rc::new(grad_fn));
        }
        out
    }

    pub fn num_elements(&self) -> usize {
        self.data.len()
    }
}

// ===== TRAIT-BASED API =====

/// Method-call API over [`Tensor`]: `x.add(&y)` instead of `RawTensor::add(&x, &y)`.
pub trait TensorOps {
    // Binary ops (broadcasting)
    fn add(&self, other: &Tensor) -> Tensor;
    fn sub(&self, other: &Tensor) -> Tensor;
    fn elem_mul(&self, other: &Tensor) -> Tensor;
    fn div(&self, other: &Tensor) -> Tensor;
    fn add_scalar(&self, value: f32) -> Tensor;
    fn mul_scalar(&self, value: f32) -> Tensor;

    // Unary ops
    fn neg(&self) -> Tensor;
    fn exp(&self) -> Tensor;
    fn log(&self) -> Tensor;
    fn abs(&self) -> Tensor;
    fn sqrt(&self) -> Tensor;
    fn tanh(&self) -> Tensor;
    fn sigmoid(&self) -> Tensor;
    fn relu(&self) -> Tensor;
    fn leaky_relu(&self, alpha: f32) -> Tensor;

    // Reductions
    fn sum(&self) -> Tensor;
    fn mean(&self) -> Tensor;
    fn sum_dim(&self, dim: usize, keepdim: bool) -> Tensor;
    fn mean_dim(&self, dim: usize, keepdim: bool) -> Tensor;

    // Movement
    fn reshape(&self, new_shape: &[usize]) -> Tensor;
    fn permute(&self, axes: &[usize]) -> Tensor;
    fn pad(&self, padding: &[(usize, usize)]) -> Tensor;

    // Graph
    fn backward(&self);
    fn grad(&self) -> Option<Vec<f32>>;
    fn detach(&self) -> Tensor;
    fn item(&self) -> f32;
    fn shape(&self) -> Vec<usize>;
}

impl TensorOps for Tensor {
    fn add(&self, other: &Tensor) -> Tensor {
        RawTensor::add(self, other)
    }
    fn sub(&self, other: &Tensor) -> Tensor {
        RawTensor::sub(self, other)
    }
    fn elem_mul(&self, other: &Tensor) -> Tensor {
        RawTensor::elem_mul(self, other)
    }
    fn div(&self, other: &Tensor) -> Tensor {
        RawTensor::div(self, other)
    }
    fn add_scalar(&self, value: f32) -> Tensor {
        RawTensor::add(self, &RawTensor::constant(value, &[1]))
    }
    fn mul_scalar(&self, value: f32) -> Tensor {
        RawTensor::elem_mul(self, &RawTensor::constant(value, &[1]))
    }

    fn neg(&self) -> Tensor {
        RawTensor::neg(self)
    }
    fn exp(&self) -> Tensor {
        RawTensor::exp(self)
    }
    fn log(&self) -> Tensor {
        RawTensor::log(self)
    }
    fn abs(&self) -> Tensor {
        RawTensor::abs(self)
    }
    fn sqrt(&self) -> Tensor {
        RawTensor::sqrt(self)
    }
    fn tanh(&self) -> Tensor {
        RawTensor::tanh(self)
    }
    fn sigmoid(&self) -> Tensor {
        RawTensor::sigmoid(self)
    }
    fn relu(&self) -> Tensor {
        RawTensor::relu(self)
    }
    fn leaky_relu(&self, alpha: f32) -> Tensor {
        RawTensor::leaky_relu(self, alpha)
    }

    fn sum(&self) -> Tensor {
        RawTensor::sum(self)
    }
    fn mean(&self) -> Tensor {
        RawTensor::mean(self)
    }
    fn sum_dim(&self, dim: usize, keepdim: bool) -> Tensor {
        RawTensor::sum_dim(self, dim, keepdim)
    }
    fn mean_dim(&self, dim: usize, keepdim: bool) -> Tensor {
        RawTensor::mean_dim(self, dim, keepdim)
    }

    fn reshape(&self, new_shape: &[usize]) -> Tensor {
        RawTensor::reshape(self, new_shape)
    }
    fn permute(&self, axes: &[usize]) -> Tensor {
        RawTensor::permute(self, axes)
    }
    fn pad(&self, padding: &[(usize, usize)]) -> Tensor {
        RawTensor::pad(self, padding)
    }

    fn backward(&self) {
        autograd::backward(self)
    }
    fn grad(&self) -> Option<Vec<f32>> {
        self.borrow().grad.clone()
    }
    fn detach(&self) -> Tensor {
        let s = self.borrow();
        RawTensor::new(s.data.clone(), &s.shape, false)
    }
    /// First element; the value of a scalar loss.
    fn item(&self) -> f32 {
        self.borrow().data.first().copied().unwrap_or(f32::NAN)
    }
    fn shape(&self) -> Vec<usize> {
        self.borrow().shape.clone()
    }
}

// ===== NUMERICAL GRADIENT CHECKING =====

/// Compare autograd gradients of `tensor` with central finite differences.
///
/// Returns `(max_error, mean_error, passed)`; errors are relative where the
/// numerical gradient is non-negligible and absolute otherwise.
pub fn check_gradients<F>(tensor: &Tensor, loss_fn: F, epsilon: f32, tolerance: f32) -> (f32, f32, bool)
where
    F: Fn(&Tensor) -> Tensor,
{
    let loss = loss_fn(tensor);
    let analytical = autograd::grad(&loss, std::slice::from_ref(tensor))
        .pop()
        .flatten()
        .unwrap_or_else(|| vec![0.0; tensor.borrow().data.len()]);

    let (original, shape) = {
        let t = tensor.borrow();
        (t.data.clone(), t.shape.clone())
    };

    let eval = |data: Vec<f32>| -> f32 {
        let probe = RawTensor::new(data, &shape, true);
        loss_fn(&probe).item()
    };

    let mut max_error: f32 = 0.0;
    let mut total_error: f32 = 0.0;
    for (i, &a) in analytical.iter().enumerate() {
        let mut plus = original.clone();
        plus[i] += epsilon;
        let mut minus = original.clone();
        minus[i] -= epsilon;
        let numerical = (eval(plus) - eval(minus)) / (2.0 * epsilon);

        let error = (a - numerical).abs();
        let error = if numerical.abs() > 1e-3 {
            error / numerical.abs()
        } else {
            error
        };
        max_error = max_error.max(error);
        total_error += error;
    }

    let mean_error = total_error / analytical.len().max(1) as f32;
    (max_error, mean_error, max_error < tolerance)
}

/// `check_gradients` with epsilon=1e-2 and tolerance=1e-2.
pub fn check_gradients_simple<F>(tensor: &Tensor, loss_fn: F) -> bool
where
    F: Fn(&Tensor) -> Tensor,
{
    check_gradients(tensor, loss_fn, 1e-2, 1e-2).2
}

// Tensor constructors
pub fn zeros(shape: &[usize]) -> Tensor {
    RawTensor::zeros(shape)
}

pub fn ones(shape: &[usize]) -> Tensor {
    RawTensor::ones(shape)
}

pub fn randn(shape: &[usize]) -> Tensor {
    RawTensor::randn(shape)
}
