//! ruina CLI entry point.

use clap::{Parser, Subcommand, ValueEnum};
use ruina::config::Settings;
use ruina::data::Dataset;
use ruina::io::{load_state_dict, load_state_dict_checked};
use ruina::logging::init_tracing;
use ruina::tensor::manual_seed;
use ruina::train::{SummaryWriter, Trainer, predict, run_dir};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "ruina")]
#[command(about = "Train and run temple reconstruction GANs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a generator and discriminator
    Train {
        /// Path to the YAML settings file
        #[arg(short, long)]
        config: PathBuf,

        /// Override the number of epochs
        #[arg(long)]
        epochs: Option<usize>,
    },

    /// Write prediction strips with a trained generator
    Predict {
        #[arg(short, long)]
        config: PathBuf,

        /// Directory holding generator.bin; defaults to the settings' checkpoint_dir
        #[arg(long)]
        checkpoint: Option<PathBuf>,

        /// Which samples to run on
        #[arg(long, value_enum, default_value_t = Split::Validation)]
        split: Split,

        /// Limit the number of samples
        #[arg(short, long)]
        samples: Option<usize>,
    },

    /// Check a settings file and print the resolved values
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Split {
    Train,
    Validation,
    All,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(&cli.log) {
        eprintln!("{e}");
    }

    let result = match cli.command {
        Commands::Train { config, epochs } => train_command(config, epochs),
        Commands::Predict {
            config,
            checkpoint,
            split,
            samples,
        } => predict_command(config, checkpoint, split, samples),
        Commands::Validate { config } => validate_command(config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn train_command(config: PathBuf, epochs: Option<usize>) -> ruina::Result<()> {
    let mut settings = Settings::load(&config)?;
    if let Some(epochs) = epochs {
        settings.epochs = epochs;
        settings.validate()?;
    }
    manual_seed(settings.seed);

    let dataset = Dataset::discover(&settings.dataset_options())?;
    let (generator, discriminator) = settings.build_models()?;
    let strategy = settings.loss_strategy(&discriminator);
    let mut trainer = Trainer::new(
        generator,
        discriminator,
        strategy,
        settings.variant(),
        settings.trainer_options(),
    );
    if settings.restore {
        trainer.restore(&settings.checkpoint_dir)?;
    }

    let reports = trainer.fit(dataset.train(), dataset.validation())?;
    if let Some(last) = reports.last() {
        info!(
            epochs = reports.len(),
            gen_loss = last.train.gen_loss,
            disc_loss = last.train.disc_loss,
            "training finished"
        );
    }
    Ok(())
}

fn predict_command(
    config: PathBuf,
    checkpoint: Option<PathBuf>,
    split: Split,
    samples: Option<usize>,
) -> ruina::Result<()> {
    let settings = Settings::load(&config)?;
    manual_seed(settings.seed);

    let dataset = Dataset::discover(&settings.dataset_options())?;
    let (mut generator, _) = settings.build_models()?;
    let dir = checkpoint.unwrap_or_else(|| settings.checkpoint_dir.clone());
    let state = load_state_dict(dir.join(ruina::train::trainer::GENERATOR_CHECKPOINT))?;
    load_state_dict_checked(&mut generator, &state)?;

    let chosen: Vec<_> = match split {
        Split::Train => dataset.train().to_vec(),
        Split::Validation => dataset.validation().to_vec(),
        Split::All => dataset
            .train()
            .iter()
            .chain(dataset.validation())
            .cloned()
            .collect(),
    };
    let limit = samples.unwrap_or(chosen.len()).min(chosen.len());

    let run = run_dir(&settings.log_dir, chrono::Local::now());
    let mut writer = SummaryWriter::create(&run, "predict")?;
    predict(&mut generator, &chosen[..limit], settings.geometry(), &mut writer)?;
    Ok(())
}

fn validate_command(config: PathBuf) -> ruina::Result<()> {
    let settings = Settings::load(&config)?;
    let yaml = serde_yaml::to_string(&settings)?;
    println!("{yaml}");
    Ok(())
}
