//! Adversarial and reconstruction losses, and the strategy combining them.

use super::discriminator::ScoreKind;
use crate::tensor::{Tensor, TensorOps};
use serde::{Deserialize, Serialize};

/// Clamp margin of the probability-form cross-entropy.
pub const BCE_EPSILON: f32 = 1e-7;

/// Binary cross-entropy of logits `x` against a constant target `z`:
/// `mean(max(x, 0) - x*z + log(1 + exp(-|x|)))`.
pub fn bce_with_logits(x: &Tensor, target: f32) -> Tensor {
    let softplus_tail = x.abs().neg().exp().add_scalar(1.0).log();
    x.relu().sub(&x.mul_scalar(target)).add(&softplus_tail).mean()
}

/// Binary cross-entropy of probabilities `p` against a constant target `z`.
///
/// `p` is squeezed into `[e, 1 - e]` by an affine map so the logs stay finite
/// and gradients still flow at saturated outputs.
pub fn bce(p: &Tensor, target: f32) -> Tensor {
    let p = p.mul_scalar(1.0 - 2.0 * BCE_EPSILON).add_scalar(BCE_EPSILON);
    let pos = p.log().mul_scalar(target);
    let neg = p.neg().add_scalar(1.0).log().mul_scalar(1.0 - target);
    pos.add(&neg).mean().neg()
}

/// Mean absolute error.
pub fn l1_loss(prediction: &Tensor, target: &Tensor) -> Tensor {
    target.sub(prediction).abs().mean()
}

/// Weight of the L1 term as a function of the epoch.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LambdaSchedule {
    Constant {
        value: f32,
    },
    /// Grows linearly from `initial` to `final` over the run.
    Rising {
        initial: f32,
        #[serde(rename = "final")]
        final_value: f32,
    },
}

impl Default for LambdaSchedule {
    fn default() -> Self {
        LambdaSchedule::Constant { value: 100.0 }
    }
}

impl LambdaSchedule {
    pub fn rising() -> Self {
        LambdaSchedule::Rising {
            initial: 100.0,
            final_value: 200.0,
        }
    }

    /// Lambda for 1-based `epoch` out of `total`.
    pub fn at(&self, epoch: usize, total: usize) -> f32 {
        match *self {
            LambdaSchedule::Constant { value } => value,
            LambdaSchedule::Rising {
                initial,
                final_value,
            } => {
                if total == 0 {
                    return initial;
                }
                let progress = epoch.min(total) as f32 / total as f32;
                initial + (final_value - initial) * progress
            }
        }
    }
}

/// Generator objective and its two parts, all scalar tensors.
#[derive(Clone)]
pub struct GeneratorLoss {
    pub total: Tensor,
    pub adversarial: Tensor,
    pub l1: Tensor,
}

pub type AdversarialFn = fn(&Tensor, f32) -> Tensor;

/// `(adversarial, fake score, generated, target, lambda)`.
pub type GeneratorLossFn = fn(AdversarialFn, &Tensor, &Tensor, &Tensor, f32) -> GeneratorLoss;

/// `(adversarial, real score, fake score)`.
pub type DiscriminatorLossFn = fn(AdversarialFn, &Tensor, &Tensor) -> Tensor;

pub fn pix2pix_generator_loss(
    adversarial: AdversarialFn,
    fake_score: &Tensor,
    generated: &Tensor,
    target: &Tensor,
    lambda: f32,
) -> GeneratorLoss {
    let adv = adversarial(fake_score, 1.0);
    let l1 = l1_loss(generated, target);
    let total = adv.add(&l1.mul_scalar(lambda));
    GeneratorLoss {
        total,
        adversarial: adv,
        l1,
    }
}

pub fn pix2pix_discriminator_loss(
    adversarial: AdversarialFn,
    real_score: &Tensor,
    fake_score: &Tensor,
) -> Tensor {
    adversarial(real_score, 1.0)
        .add(&adversarial(fake_score, 0.0))
        .mul_scalar(0.5)
}

/// Loss functions and lambda schedule the trainer is composed with.
#[derive(Clone, Copy)]
pub struct LossStrategy {
    pub score: ScoreKind,
    pub lambda: LambdaSchedule,
    pub generator: GeneratorLossFn,
    pub discriminator: DiscriminatorLossFn,
}

impl LossStrategy {
    pub fn pix2pix(score: ScoreKind, lambda: LambdaSchedule) -> Self {
        Self {
            score,
            lambda,
            generator: pix2pix_generator_loss,
            discriminator: pix2pix_discriminator_loss,
        }
    }

    /// Cross-entropy matching what the discriminator emits.
    pub fn adversarial(&self) -> AdversarialFn {
        match self.score {
            ScoreKind::Logits => bce_with_logits,
            ScoreKind::Probabilities => bce,
        }
    }

    pub fn generator_loss(
        &self,
        fake_score: &Tensor,
        generated: &Tensor,
        target: &Tensor,
        lambda: f32,
    ) -> GeneratorLoss {
        (self.generator)(self.adversarial(), fake_score, generated, target, lambda)
    }

    pub fn discriminator_loss(&self, real_score: &Tensor, fake_score: &Tensor) -> Tensor {
        (self.discriminator)(self.adversarial(), real_score, fake_score)
    }
}

/// Scores as probabilities, whichever form the discriminator emits.
pub fn probabilities(score: &Tensor, kind: ScoreKind) -> Vec<f32> {
    let data = score.borrow().data.clone();
    match kind {
        ScoreKind::Probabilities => data,
        ScoreKind::Logits => data.into_iter().map(crate::ops::unary::sigmoid).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::RawTensor;
    use approx::assert_relative_eq;

    fn t(data: Vec<f32>) -> Tensor {
        let n = data.len();
        RawTensor::new(data, &[n], true)
    }

    #[test]
    fn test_bce_with_logits_matches_definition() {
        let x = t(vec![-2.0, 0.0, 3.0]);
        let expected: f32 = [-2.0f32, 0.0, 3.0]
            .iter()
            .map(|&v| -(crate::ops::unary::sigmoid(v)).ln())
            .sum::<f32>()
            / 3.0;
        assert_relative_eq!(bce_with_logits(&x, 1.0).item(), expected, epsilon = 1e-5);
    }

    #[test]
    fn test_bce_forms_agree() {
        let logits = t(vec![-1.5, 0.2, 2.5, -0.3]);
        let probs = logits.sigmoid();
        for z in [0.0, 1.0] {
            assert_relative_eq!(
                bce_with_logits(&logits, z).item(),
                bce(&probs, z).item(),
                epsilon = 1e-4
            );
        }
    }

    #[test]
    fn test_bce_saturated_probability_stays_finite() {
        let p = t(vec![0.0, 1.0]);
        let loss = bce(&p, 1.0);
        assert!(loss.item().is_finite());
        loss.backward();
        assert!(p.grad().unwrap().iter().all(|g| g.is_finite()));
    }

    #[test]
    fn test_bce_with_logits_extreme_inputs_finite() {
        let x = t(vec![-80.0, 80.0]);
        for z in [0.0, 1.0] {
            let v = bce_with_logits(&x, z).item();
            assert!(v.is_finite() && v >= 0.0);
        }
    }

    #[test]
    fn test_l1() {
        let a = t(vec![1.0, -1.0]);
        let b = t(vec![0.0, 1.0]);
        assert_relative_eq!(l1_loss(&a, &b).item(), 1.5);
    }

    #[test]
    fn test_discriminator_loss_is_halved() {
        let s = LossStrategy::pix2pix(ScoreKind::Logits, LambdaSchedule::default());
        let real = t(vec![0.0]);
        let fake = t(vec![0.0]);
        // each term is ln 2 at zero logits
        assert_relative_eq!(
            s.discriminator_loss(&real, &fake).item(),
            std::f32::consts::LN_2,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_generator_loss_parts() {
        let s = LossStrategy::pix2pix(ScoreKind::Logits, LambdaSchedule::default());
        let fake = t(vec![0.0]);
        let gen_img = t(vec![0.5, 0.5]);
        let target = t(vec![0.0, 1.0]);
        let loss = s.generator_loss(&fake, &gen_img, &target, 100.0);
        assert_relative_eq!(loss.l1.item(), 0.5);
        assert_relative_eq!(loss.adversarial.item(), std::f32::consts::LN_2, epsilon = 1e-6);
        assert_relative_eq!(loss.total.item(), std::f32::consts::LN_2 + 50.0, epsilon = 1e-4);
    }

    #[test]
    fn test_lambda_schedule() {
        let rising = LambdaSchedule::rising();
        assert_relative_eq!(rising.at(1, 4), 125.0);
        assert_relative_eq!(rising.at(4, 4), 200.0);
        assert_relative_eq!(LambdaSchedule::default().at(3, 10), 100.0);
    }

    #[test]
    fn test_lambda_schedule_yaml() {
        let s: LambdaSchedule = serde_yaml::from_str("kind: rising\ninitial: 10\nfinal: 20\n").unwrap();
        assert_eq!(
            s,
            LambdaSchedule::Rising {
                initial: 10.0,
                final_value: 20.0
            }
        );
    }

    #[test]
    fn test_probabilities_from_logits() {
        let v = probabilities(&t(vec![0.0]), ScoreKind::Logits);
        assert_relative_eq!(v[0], 0.5);
    }
}
