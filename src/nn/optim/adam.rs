use crate::tensor::Tensor;

/// Adam over a fixed list of parameters.
///
/// Each network gets its own instance, fed the gradient list produced by
/// [`crate::autograd::grad`] for exactly its parameters.
pub struct Adam {
    params: Vec<Tensor>,
    lr: f32,
    betas: (f32, f32),
    eps: f32,
    weight_decay: f32,
    m: Vec<Vec<f32>>, // 1st moment
    v: Vec<Vec<f32>>, // 2nd moment
    t: usize,         // timestep
}

impl Adam {
    #[must_use]
    pub fn new(
        params: Vec<Tensor>,
        lr: f32,
        betas: (f32, f32),
        eps: f32,
        weight_decay: f32,
    ) -> Self {
        let zeros: Vec<Vec<f32>> = params
            .iter()
            .map(|p| vec![0.0; p.borrow().data.len()])
            .collect();
        Adam {
            params,
            lr,
            betas,
            eps,
            weight_decay,
            m: zeros.clone(),
            v: zeros,
            t: 0,
        }
    }

    pub fn steps(&self) -> usize {
        self.t
    }

    /// Update parameter `i` with `grads[i]`; `None` entries are skipped.
    ///
    /// # Panics
    /// If `grads` does not line up with the optimizer's parameters.
    pub fn apply_gradients(&mut self, grads: &[Option<Vec<f32>>]) {
        assert_eq!(
            grads.len(),
            self.params.len(),
            "Adam got {} gradients for {} parameters",
            grads.len(),
            self.params.len()
        );
        self.t += 1;
        let (b1, b2) = self.betas;
        let m_hat_scale = 1.0 / (1.0 - b1.powi(self.t as i32));
        let v_hat_scale = 1.0 / (1.0 - b2.powi(self.t as i32));

        for (i, grad) in grads.iter().enumerate() {
            let Some(grad) = grad else { continue };
            let mut p = self.params[i].borrow_mut();
            assert_eq!(grad.len(), p.data.len(), "Gradient size mismatch for param {i}");

            let (m, v) = (&mut self.m[i], &mut self.v[i]);
            for (j, (&g, theta)) in grad.iter().zip(p.data.iter_mut()).enumerate() {
                let g = g + self.weight_decay * *theta;
                m[j] = b1 * m[j] + (1.0 - b1) * g;
                v[j] = b2 * v[j] + (1.0 - b2) * g * g;
                let m_hat = m[j] * m_hat_scale;
                let v_hat = v[j] * v_hat_scale;
                *theta -= self.lr * m_hat / (v_hat.sqrt() + self.eps);
            }
        }
    }
}
