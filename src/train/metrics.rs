//! Running epoch metrics.

use serde::Serialize;

/// Running mean of scalar observations.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Mean {
    total: f64,
    count: usize,
}

impl Mean {
    pub fn update(&mut self, value: f32) {
        self.total += f64::from(value);
        self.count += 1;
    }

    /// `0.0` before the first update.
    pub fn result(&self) -> f32 {
        if self.count == 0 {
            0.0
        } else {
            (self.total / self.count as f64) as f32
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Fraction of probabilities on the right side of `threshold` for a
/// constant label.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BinaryAccuracy {
    threshold: f32,
    correct: usize,
    total: usize,
}

impl BinaryAccuracy {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            correct: 0,
            total: 0,
        }
    }

    pub fn update(&mut self, label: bool, probabilities: &[f32]) {
        self.correct += probabilities
            .iter()
            .filter(|&&p| (p > self.threshold) == label)
            .count();
        self.total += probabilities.len();
    }

    pub fn result(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f32 / self.total as f32
        }
    }

    pub fn reset(&mut self) {
        self.correct = 0;
        self.total = 0;
    }
}

/// Metrics of one phase of an epoch.
#[derive(Clone, Debug)]
pub struct EpochMetrics {
    pub disc_loss: Mean,
    pub gen_loss: Mean,
    pub gen_adversarial: Mean,
    pub gen_l1: Mean,
    /// How often the discriminator calls real pairs real.
    pub real_acc: BinaryAccuracy,
    /// How often it calls generated pairs fake.
    pub gen_acc: BinaryAccuracy,
}

impl EpochMetrics {
    pub fn new(threshold: f32) -> Self {
        Self {
            disc_loss: Mean::default(),
            gen_loss: Mean::default(),
            gen_adversarial: Mean::default(),
            gen_l1: Mean::default(),
            real_acc: BinaryAccuracy::new(threshold),
            gen_acc: BinaryAccuracy::new(threshold),
        }
    }

    pub fn reset(&mut self) {
        for mean in [
            &mut self.disc_loss,
            &mut self.gen_loss,
            &mut self.gen_adversarial,
            &mut self.gen_l1,
        ] {
            mean.reset();
        }
        self.real_acc.reset();
        self.gen_acc.reset();
    }

    pub fn steps(&self) -> usize {
        self.disc_loss.count()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            disc_loss: self.disc_loss.result(),
            gen_loss: self.gen_loss.result(),
            gen_adversarial: self.gen_adversarial.result(),
            gen_l1: self.gen_l1.result(),
            real_acc: self.real_acc.result(),
            gen_acc: self.gen_acc.result(),
        }
    }
}

/// Plain values of [`EpochMetrics`] at one point in time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub disc_loss: f32,
    pub gen_loss: f32,
    pub gen_adversarial: f32,
    pub gen_l1: f32,
    pub real_acc: f32,
    pub gen_acc: f32,
}

impl MetricsSnapshot {
    /// `(name, value)` pairs in a fixed order.
    pub fn scalars(&self) -> [(&'static str, f32); 6] {
        [
            ("disc_loss", self.disc_loss),
            ("gen_loss", self.gen_loss),
            ("gen_adversarial", self.gen_adversarial),
            ("gen_l1", self.gen_l1),
            ("real_acc", self.real_acc),
            ("gen_acc", self.gen_acc),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mean() {
        let mut m = Mean::default();
        assert_eq!(m.result(), 0.0);
        m.update(1.0);
        m.update(2.0);
        assert_relative_eq!(m.result(), 1.5);
        m.reset();
        assert_eq!(m.count(), 0);
    }

    #[test]
    fn test_binary_accuracy() {
        let mut acc = BinaryAccuracy::new(0.5);
        acc.update(true, &[0.9, 0.2, 0.7, 0.5]);
        assert_relative_eq!(acc.result(), 0.5);
        acc.update(false, &[0.1, 0.1, 0.1, 0.1]);
        assert_relative_eq!(acc.result(), 0.75);
    }

    #[test]
    fn test_epoch_metrics_reset() {
        let mut m = EpochMetrics::new(0.5);
        m.gen_loss.update(3.0);
        m.real_acc.update(true, &[1.0]);
        m.reset();
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
    }
}
