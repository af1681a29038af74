//! Adversarial training loop.
//!
//! Each step builds one graph from the generator and discriminator forward
//! passes, derives both losses from it, and asks autograd for the generator's
//! and the discriminator's gradients separately. Each network is then updated
//! by its own Adam instance, so neither loss ever moves the other network.

use super::history::{HistoryRow, HistoryWriter};
use super::metrics::{EpochMetrics, MetricsSnapshot};
use super::summary::{SummaryWriter, run_dir};
use crate::autograd::{self, no_grad};
use crate::data::dataset::SampleSource;
use crate::data::loader::{Batch, BatchLoader};
use crate::data::transforms::{ImageGeometry, from_tensor};
use crate::error::{Result, RuinaError};
use crate::gan::loss::probabilities;
use crate::gan::{Discriminator, Generator, LossStrategy};
use crate::io::{load_state_dict, load_state_dict_checked, save_state_dict};
use crate::nn::{Adam, Module};
use crate::tensor::{Tensor, TensorOps};
use crate::utils::progress::ProgressBar;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const GENERATOR_CHECKPOINT: &str = "generator.bin";
pub const DISCRIMINATOR_CHECKPOINT: &str = "discriminator.bin";
pub const HISTORY_FILE: &str = "history.csv";

/// Single generator pass, or a second pass refining the first output.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TrainingVariant {
    SinglePass,
    /// `g = g1 + second_pass_lambda * g2`, `d = d1 + d2`.
    TwoPass { second_pass_lambda: f32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Train,
    Validation,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::Train => "train",
            Phase::Validation => "validation",
        }
    }
}

/// Where `fit` is within a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrainingState {
    EpochStart(usize),
    TrainStep(usize),
    ValidationStep(usize),
    EpochEnd(usize),
    Finished,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrainerOptions {
    pub epochs: usize,
    pub batch_size: usize,
    pub geometry: ImageGeometry,
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub adam_eps: f32,
    /// Probability above which a score counts as "real".
    pub accuracy_threshold: f32,
    /// Root for timestamped summary directories; `None` disables them.
    pub log_dir: Option<PathBuf>,
    pub log_images: bool,
    /// Samples drawn per phase for the image strips.
    pub n_samples: usize,
    /// Write image strips every this many epochs.
    pub frequency: usize,
    /// Save both networks here at every epoch end.
    pub checkpoint_dir: Option<PathBuf>,
}

impl Default for TrainerOptions {
    fn default() -> Self {
        Self {
            epochs: 5,
            batch_size: 1,
            geometry: ImageGeometry::default(),
            learning_rate: 2e-4,
            beta1: 0.5,
            beta2: 0.999,
            adam_eps: 1e-7,
            accuracy_threshold: 0.5,
            log_dir: None,
            log_images: true,
            n_samples: 4,
            frequency: 1,
            checkpoint_dir: None,
        }
    }
}

/// Metrics of one finished epoch.
#[derive(Clone, Debug, PartialEq)]
pub struct EpochReport {
    pub epoch: usize,
    pub lambda: f32,
    pub train: MetricsSnapshot,
    pub validation: Option<MetricsSnapshot>,
}

/// Tensors of one forward pass over a batch.
struct StepOutput {
    gen_loss: Tensor,
    disc_loss: Tensor,
    gen_adversarial: f32,
    gen_l1: f32,
    real_score: Tensor,
    fake_score: Tensor,
}

/// Summary writers and history of a logged run.
struct RunLog {
    dir: PathBuf,
    train: SummaryWriter,
    validation: SummaryWriter,
    history: HistoryWriter,
}

pub struct Trainer {
    generator: Generator,
    discriminator: Discriminator,
    gen_params: Vec<Tensor>,
    disc_params: Vec<Tensor>,
    gen_optimizer: Adam,
    disc_optimizer: Adam,
    strategy: LossStrategy,
    variant: TrainingVariant,
    options: TrainerOptions,
    train_metrics: EpochMetrics,
    val_metrics: EpochMetrics,
}

impl Trainer {
    pub fn new(
        generator: Generator,
        discriminator: Discriminator,
        strategy: LossStrategy,
        variant: TrainingVariant,
        options: TrainerOptions,
    ) -> Self {
        let gen_params = generator.parameters();
        let disc_params = discriminator.parameters();
        let betas = (options.beta1, options.beta2);
        let gen_optimizer = Adam::new(
            gen_params.clone(),
            options.learning_rate,
            betas,
            options.adam_eps,
            0.0,
        );
        let disc_optimizer = Adam::new(
            disc_params.clone(),
            options.learning_rate,
            betas,
            options.adam_eps,
            0.0,
        );
        Self {
            generator,
            discriminator,
            gen_params,
            disc_params,
            gen_optimizer,
            disc_optimizer,
            strategy,
            variant,
            train_metrics: EpochMetrics::new(options.accuracy_threshold),
            val_metrics: EpochMetrics::new(options.accuracy_threshold),
            options,
        }
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    pub fn generator_mut(&mut self) -> &mut Generator {
        &mut self.generator
    }

    pub fn discriminator(&self) -> &Discriminator {
        &self.discriminator
    }

    pub fn options(&self) -> &TrainerOptions {
        &self.options
    }

    pub fn metrics(&self, phase: Phase) -> &EpochMetrics {
        match phase {
            Phase::Train => &self.train_metrics,
            Phase::Validation => &self.val_metrics,
        }
    }

    /// Give both networks back to the caller.
    pub fn into_models(self) -> (Generator, Discriminator) {
        (self.generator, self.discriminator)
    }

    fn set_training(&mut self, training: bool) {
        self.generator.train(training);
        self.discriminator.train(training);
    }

    /// Forward both networks on `batch` and compute both losses.
    fn forward(&self, batch: &Batch, lambda: f32) -> Result<StepOutput> {
        self.generator.check_input(&batch.inputs)?;
        let condition = &batch.inputs[0];
        let generated = self.generator.forward_heads(&batch.inputs);

        let real_score = self.discriminator.judge(condition, &batch.target);
        let fake_score = self.discriminator.judge(condition, &generated);

        let first = self
            .strategy
            .generator_loss(&fake_score, &generated, &batch.target, lambda);
        let disc_first = self.strategy.discriminator_loss(&real_score, &fake_score);
        let (gen_adversarial, gen_l1) = (first.adversarial.item(), first.l1.item());

        match self.variant {
            TrainingVariant::SinglePass => Ok(StepOutput {
                gen_loss: first.total,
                disc_loss: disc_first,
                gen_adversarial,
                gen_l1,
                real_score,
                fake_score,
            }),
            TrainingVariant::TwoPass { second_pass_lambda } => {
                let mut heads = batch.inputs.clone();
                heads[0] = generated;
                let second = self.generator.forward_heads(&heads);
                let second_score = self.discriminator.judge(condition, &second);

                let refined = self
                    .strategy
                    .generator_loss(&second_score, &second, &batch.target, lambda);
                // the real pair is unchanged, so its first-pass score is reused
                let disc_second = self.strategy.discriminator_loss(&real_score, &second_score);

                Ok(StepOutput {
                    gen_loss: first.total.add(&refined.total.mul_scalar(second_pass_lambda)),
                    disc_loss: disc_first.add(&disc_second),
                    gen_adversarial,
                    gen_l1,
                    real_score,
                    fake_score: second_score,
                })
            }
        }
    }

    fn record(&mut self, phase: Phase, out: &StepOutput, epoch: usize) -> Result<()> {
        let gen_loss = finite(&out.gen_loss, "generator", epoch)?;
        let disc_loss = finite(&out.disc_loss, "discriminator", epoch)?;
        let kind = self.strategy.score;
        let metrics = match phase {
            Phase::Train => &mut self.train_metrics,
            Phase::Validation => &mut self.val_metrics,
        };
        metrics.gen_loss.update(gen_loss);
        metrics.disc_loss.update(disc_loss);
        metrics.gen_adversarial.update(out.gen_adversarial);
        metrics.gen_l1.update(out.gen_l1);
        metrics
            .real_acc
            .update(true, &probabilities(&out.real_score, kind));
        metrics
            .gen_acc
            .update(false, &probabilities(&out.fake_score, kind));
        Ok(())
    }

    /// One optimisation step of both networks on `batch`.
    ///
    /// `epoch` is 1-based and selects the lambda of the schedule.
    pub fn train_step(&mut self, batch: &Batch, epoch: usize) -> Result<()> {
        let lambda = self.strategy.lambda.at(epoch, self.options.epochs);
        let out = self.forward(batch, lambda)?;
        self.record(Phase::Train, &out, epoch)?;

        let gen_grads = autograd::grad(&out.gen_loss, &self.gen_params);
        let disc_grads = autograd::grad(&out.disc_loss, &self.disc_params);
        self.gen_optimizer.apply_gradients(&gen_grads);
        self.disc_optimizer.apply_gradients(&disc_grads);
        Ok(())
    }

    /// Losses and accuracies on `batch` without touching any parameter.
    pub fn validation_step(&mut self, batch: &Batch, epoch: usize) -> Result<()> {
        let lambda = self.strategy.lambda.at(epoch, self.options.epochs);
        let out = no_grad(|| self.forward(batch, lambda))?;
        self.record(Phase::Validation, &out, epoch)
    }

    /// Train for `options.epochs` epochs.
    ///
    /// Aborts on the first data error or non-finite loss.
    pub fn fit(&mut self, train: &[SampleSource], validation: &[SampleSource]) -> Result<Vec<EpochReport>> {
        if train.is_empty() {
            return Err(RuinaError::EmptyDataset("training split".into()));
        }
        let total = self.options.epochs;
        let geometry = self.options.geometry;
        let mut log = self.open_run_log()?;
        let mut train_loader = BatchLoader::new(train, self.options.batch_size, geometry, true);
        let mut val_loader = BatchLoader::new(validation, self.options.batch_size, geometry, false);
        let mut progress: Option<ProgressBar> = None;
        let mut reports = Vec::with_capacity(total);

        let mut state = TrainingState::EpochStart(1);
        loop {
            state = match state {
                TrainingState::Finished => break,
                TrainingState::EpochStart(epoch) if epoch > total => TrainingState::Finished,
                TrainingState::EpochStart(epoch) => {
                    self.train_metrics.reset();
                    self.val_metrics.reset();
                    train_loader.reset();
                    val_loader.reset();
                    self.set_training(true);
                    progress = Some(ProgressBar::new(
                        train_loader.num_batches(),
                        format!("epoch {epoch}/{total}"),
                    ));
                    debug!(epoch, lambda = self.strategy.lambda.at(epoch, total), "epoch start");
                    TrainingState::TrainStep(epoch)
                }
                TrainingState::TrainStep(epoch) => match train_loader.next() {
                    Some(batch) => {
                        self.train_step(&batch?, epoch)?;
                        if let Some(bar) = progress.as_mut() {
                            let m = self.train_metrics.snapshot();
                            bar.set_message(format!("d={:.4} g={:.4}", m.disc_loss, m.gen_loss));
                            bar.inc();
                        }
                        TrainingState::TrainStep(epoch)
                    }
                    None => {
                        if let Some(bar) = progress.take() {
                            bar.finish();
                        }
                        self.set_training(false);
                        TrainingState::ValidationStep(epoch)
                    }
                },
                TrainingState::ValidationStep(epoch) => match val_loader.next() {
                    Some(batch) => {
                        self.validation_step(&batch?, epoch)?;
                        TrainingState::ValidationStep(epoch)
                    }
                    None => TrainingState::EpochEnd(epoch),
                },
                TrainingState::EpochEnd(epoch) => {
                    let report = self.end_epoch(epoch, train, validation, log.as_mut())?;
                    reports.push(report);
                    TrainingState::EpochStart(epoch + 1)
                }
            };
        }
        self.set_training(true);
        Ok(reports)
    }

    fn open_run_log(&self) -> Result<Option<RunLog>> {
        let Some(log_dir) = &self.options.log_dir else {
            return Ok(None);
        };
        let dir = run_dir(log_dir, chrono::Local::now());
        let log = RunLog {
            train: SummaryWriter::create(&dir, Phase::Train.name())?,
            validation: SummaryWriter::create(&dir, Phase::Validation.name())?,
            history: HistoryWriter::create(dir.join(HISTORY_FILE))?,
            dir,
        };
        info!(dir = %log.dir.display(), "writing summaries");
        Ok(Some(log))
    }

    fn end_epoch(
        &mut self,
        epoch: usize,
        train: &[SampleSource],
        validation: &[SampleSource],
        log: Option<&mut RunLog>,
    ) -> Result<EpochReport> {
        let lambda = self.strategy.lambda.at(epoch, self.options.epochs);
        let train_m = self.train_metrics.snapshot();
        let val_m = (self.val_metrics.steps() > 0).then(|| self.val_metrics.snapshot());

        info!(
            epoch,
            lambda,
            disc_loss = train_m.disc_loss,
            gen_loss = train_m.gen_loss,
            real_acc = train_m.real_acc,
            gen_acc = train_m.gen_acc,
            "train"
        );
        if let Some(v) = &val_m {
            info!(
                epoch,
                disc_loss = v.disc_loss,
                gen_loss = v.gen_loss,
                real_acc = v.real_acc,
                gen_acc = v.gen_acc,
                "validation"
            );
        }

        if let Some(log) = log {
            let step = epoch - 1;
            for (name, value) in train_m.scalars() {
                log.train.scalar(name, value, step)?;
            }
            log.train.scalar("lambda", lambda, step)?;
            log.history
                .append(&HistoryRow::new(epoch, Phase::Train.name(), lambda, &train_m))?;
            if let Some(v) = &val_m {
                for (name, value) in v.scalars() {
                    log.validation.scalar(name, value, step)?;
                }
                log.history
                    .append(&HistoryRow::new(epoch, Phase::Validation.name(), lambda, v))?;
            }

            let frequency = self.options.frequency.max(1);
            if self.options.log_images && (epoch % frequency == 0 || epoch == 1) {
                self.log_samples(&mut log.train, train, step)?;
                if !validation.is_empty() {
                    self.log_samples(&mut log.validation, validation, step)?;
                }
            }
            log.train.flush()?;
            log.validation.flush()?;
        }

        if let Some(dir) = self.options.checkpoint_dir.clone() {
            self.save(&dir)?;
        }

        Ok(EpochReport {
            epoch,
            lambda,
            train: train_m,
            validation: val_m,
        })
    }

    /// Strips of `(inputs..., generated, target)` for the first samples.
    fn log_samples(&mut self, writer: &mut SummaryWriter, samples: &[SampleSource], step: usize) -> Result<()> {
        let n = self.options.n_samples.min(samples.len());
        if n == 0 {
            return Ok(());
        }
        self.generator.eval();
        let loader = BatchLoader::new(&samples[..n], n, self.options.geometry, false);
        for batch in loader {
            let batch = batch?;
            let generated = no_grad(|| self.generator.forward_heads(&batch.inputs));
            for (i, strip) in sample_strips(&batch, &generated)?.into_iter().enumerate() {
                writer.image_strip(&format!("sample{i}"), &strip, step)?;
            }
        }
        self.generator.train(true);
        Ok(())
    }

    /// Write both networks' state dicts into `dir`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        save_state_dict(&self.generator.state_dict(), dir.join(GENERATOR_CHECKPOINT))?;
        save_state_dict(&self.discriminator.state_dict(), dir.join(DISCRIMINATOR_CHECKPOINT))?;
        debug!(dir = %dir.display(), "saved checkpoint");
        Ok(())
    }

    /// Load both networks from `dir`, rejecting checkpoints of another layout.
    pub fn restore(&mut self, dir: &Path) -> Result<()> {
        let gen_state = load_state_dict(dir.join(GENERATOR_CHECKPOINT))?;
        let disc_state = load_state_dict(dir.join(DISCRIMINATOR_CHECKPOINT))?;
        load_state_dict_checked(&mut self.generator, &gen_state)?;
        load_state_dict_checked(&mut self.discriminator, &disc_state)?;
        info!(dir = %dir.display(), "restored checkpoint");
        Ok(())
    }
}

fn finite(loss: &Tensor, name: &'static str, epoch: usize) -> Result<f32> {
    let value = loss.item();
    if value.is_finite() {
        Ok(value)
    } else {
        warn!(name, epoch, value, "loss diverged");
        Err(RuinaError::NonFiniteLoss { name, epoch })
    }
}

/// Per sample of `batch`: its input heads, then `generated`, then the target.
fn sample_strips(batch: &Batch, generated: &Tensor) -> Result<Vec<Vec<crate::data::RgbImage32>>> {
    let heads = batch
        .inputs
        .iter()
        .map(from_tensor)
        .collect::<Result<Vec<_>>>()?;
    let generated = from_tensor(generated)?;
    let target = from_tensor(&batch.target)?;
    Ok((0..target.len())
        .map(|b| {
            heads
                .iter()
                .map(|h| h[b].clone())
                .chain([generated[b].clone(), target[b].clone()])
                .collect()
        })
        .collect())
}

/// Run the generator in eval mode over `samples`, writing for each one the
/// strip `(input, prediction, target)` and the second-pass strip
/// `(input, G(prediction), target)`.
///
/// Returns the number of samples processed.
pub fn predict(
    generator: &mut Generator,
    samples: &[SampleSource],
    geometry: ImageGeometry,
    writer: &mut SummaryWriter,
) -> Result<usize> {
    generator.eval();
    let mut step = 0;
    for batch in BatchLoader::new(samples, 1, geometry, false) {
        let batch = batch?;
        generator.check_input(&batch.inputs)?;
        let (first, second) = no_grad(|| {
            let first = generator.forward_heads(&batch.inputs);
            let mut heads = batch.inputs.clone();
            heads[0] = first.clone();
            let second = generator.forward_heads(&heads);
            (first, second)
        });
        let input = from_tensor(&batch.inputs[0])?;
        let target = from_tensor(&batch.target)?;
        for (tag, output) in [("predictions", &first), ("second_predictions", &second)] {
            let output = from_tensor(output)?;
            writer.image_strip(tag, &[input[0].clone(), output[0].clone(), target[0].clone()], step)?;
        }
        step += 1;
    }
    writer.flush()?;
    info!(samples = step, dir = %writer.dir().display(), "wrote predictions");
    Ok(step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gan::{DiscriminatorConfig, GeneratorConfig, LambdaSchedule};
    use crate::tensor::{RawTensor, manual_seed};

    fn two_pass_trainer(second_pass_lambda: f32) -> Trainer {
        let generator = Generator::new(GeneratorConfig {
            heads: 2,
            filters: vec![4, 8, 8],
            ..GeneratorConfig::default()
        })
        .unwrap();
        let discriminator = Discriminator::new(DiscriminatorConfig {
            base_filters: 4,
            downsample_layers: 2,
            ..DiscriminatorConfig::default()
        })
        .unwrap();
        let strategy = LossStrategy::pix2pix(discriminator.score_kind(), LambdaSchedule::default());
        let mut trainer = Trainer::new(
            generator,
            discriminator,
            strategy,
            TrainingVariant::TwoPass { second_pass_lambda },
            TrainerOptions::default(),
        );
        // dropout off so every generator pass is reproducible
        trainer.set_training(false);
        trainer
    }

    #[test]
    fn test_two_pass_losses_combine_both_passes() {
        manual_seed(21);
        let trainer = two_pass_trainer(1.25);
        let batch = Batch {
            inputs: vec![RawTensor::randn(&[1, 3, 16, 32]), RawTensor::randn(&[1, 3, 16, 32])],
            target: RawTensor::randn(&[1, 3, 16, 32]).tanh(),
        };
        let out = no_grad(|| trainer.forward(&batch, 100.0)).unwrap();

        let (g, d, s) = (&trainer.generator, &trainer.discriminator, &trainer.strategy);
        let expected = no_grad(|| {
            let cond = &batch.inputs[0];
            let first = g.forward_heads(&batch.inputs);
            let real = d.judge(cond, &batch.target);
            let fake = d.judge(cond, &first);
            let g1 = s.generator_loss(&fake, &first, &batch.target, 100.0);

            // first output replaces the first head, the second head stays
            let second = g.forward_heads(&[first.clone(), batch.inputs[1].clone()]);
            let fake2 = d.judge(cond, &second);
            let g2 = s.generator_loss(&fake2, &second, &batch.target, 100.0);

            let d1 = s.discriminator_loss(&real, &fake).item();
            let d2 = s.discriminator_loss(&real, &fake2).item();
            (
                g1.total.item() + g2.total.item() * 1.25,
                d1 + d2,
                g1.adversarial.item(),
                fake2.borrow().data.clone(),
            )
        });

        assert_eq!(out.gen_loss.item(), expected.0);
        assert_eq!(out.disc_loss.item(), expected.1);
        assert_eq!(out.gen_adversarial, expected.2);
        // accuracy on generated pairs is measured on the second pass
        assert_eq!(out.fake_score.borrow().data, expected.3);
    }

    #[test]
    fn test_single_pass_matches_strategy() {
        manual_seed(22);
        let mut trainer = two_pass_trainer(1.25);
        trainer.variant = TrainingVariant::SinglePass;
        let batch = Batch {
            inputs: vec![RawTensor::randn(&[1, 3, 16, 32]), RawTensor::randn(&[1, 3, 16, 32])],
            target: RawTensor::randn(&[1, 3, 16, 32]).tanh(),
        };
        let out = no_grad(|| trainer.forward(&batch, 50.0)).unwrap();

        let generated = trainer.generator.forward_heads(&batch.inputs);
        let real = trainer.discriminator.judge(&batch.inputs[0], &batch.target);
        let fake = trainer.discriminator.judge(&batch.inputs[0], &generated);
        let g = trainer.strategy.generator_loss(&fake, &generated, &batch.target, 50.0);
        assert_eq!(out.gen_loss.item(), g.total.item());
        assert_eq!(
            out.disc_loss.item(),
            trainer.strategy.discriminator_loss(&real, &fake).item()
        );
    }
}
