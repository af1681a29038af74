//! Generator, discriminator and training step benchmarks on small images.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use ruina::data::Batch;
use ruina::gan::{
    Discriminator, DiscriminatorConfig, Generator, GeneratorConfig, LambdaSchedule, LossStrategy,
};
use ruina::train::{Trainer, TrainerOptions, TrainingVariant};
use ruina::{RawTensor, Tensor, manual_seed, no_grad};

/// Deterministic `[B, 3, H, W]` tensor in `[-1, 1]`.
fn image_tensor(batch: usize, height: usize, width: usize) -> Tensor {
    let size = batch * 3 * height * width;
    let data: Vec<f32> = (0..size).map(|i| (i as f32 * 0.01).sin()).collect();
    RawTensor::new(data, &[batch, 3, height, width], false)
}

fn small_generator(heads: usize) -> Generator {
    Generator::new(GeneratorConfig {
        heads,
        filters: vec![16, 32, 64, 64],
        ..GeneratorConfig::default()
    })
    .expect("valid generator config")
}

fn small_discriminator() -> Discriminator {
    Discriminator::new(DiscriminatorConfig {
        base_filters: 16,
        downsample_layers: 3,
        ..DiscriminatorConfig::default()
    })
    .expect("valid discriminator config")
}

fn bench_generator(c: &mut Criterion) {
    manual_seed(0);
    let mut group = c.benchmark_group("generator_forward");
    group.sample_size(20);

    group.bench_function("one_head_32x64", |b| {
        let g = small_generator(1);
        let x = vec![image_tensor(1, 32, 64)];
        b.iter(|| no_grad(|| black_box(&g).forward_heads(black_box(&x))));
    });

    group.bench_function("two_heads_32x64", |b| {
        let g = small_generator(2);
        let x = vec![image_tensor(1, 32, 64), image_tensor(1, 32, 64)];
        b.iter(|| no_grad(|| black_box(&g).forward_heads(black_box(&x))));
    });

    group.finish();
}

fn bench_discriminator(c: &mut Criterion) {
    manual_seed(0);
    let mut group = c.benchmark_group("discriminator_forward");
    group.sample_size(20);

    group.bench_function("patch_64x64", |b| {
        let d = small_discriminator();
        let cond = image_tensor(1, 64, 64);
        let cand = image_tensor(1, 64, 64);
        b.iter(|| no_grad(|| black_box(&d).judge(black_box(&cond), black_box(&cand))));
    });

    group.finish();
}

fn bench_train_step(c: &mut Criterion) {
    manual_seed(0);
    let mut group = c.benchmark_group("train_step");
    group.sample_size(10);

    for (name, variant) in [
        ("single_pass", TrainingVariant::SinglePass),
        (
            "two_pass",
            TrainingVariant::TwoPass {
                second_pass_lambda: 1.25,
            },
        ),
    ] {
        group.bench_function(name, |b| {
            let discriminator = small_discriminator();
            let strategy = LossStrategy::pix2pix(discriminator.score_kind(), LambdaSchedule::default());
            let mut trainer = Trainer::new(
                small_generator(1),
                discriminator,
                strategy,
                variant,
                TrainerOptions::default(),
            );
            let batch = Batch {
                inputs: vec![image_tensor(1, 32, 64)],
                target: image_tensor(1, 32, 64),
            };
            b.iter(|| trainer.train_step(black_box(&batch), 1).expect("finite losses"));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_generator, bench_discriminator, bench_train_step);
criterion_main!(benches);
