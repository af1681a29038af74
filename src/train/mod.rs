//! Training loop, metrics, and run outputs.

pub mod history;
pub mod metrics;
pub mod summary;
pub mod trainer;

pub use history::{HistoryRow, HistoryWriter, read_history};
pub use metrics::{BinaryAccuracy, EpochMetrics, Mean, MetricsSnapshot};
pub use summary::{SummaryEvent, SummaryWriter, read_events, run_dir};
pub use trainer::{EpochReport, Phase, Trainer, TrainerOptions, TrainingState, TrainingVariant, predict};
