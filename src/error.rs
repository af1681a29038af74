use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuinaError {
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("No samples found for {0}")]
    EmptyDataset(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Cannot pair {left} {kind} images with {right} counterparts")]
    MismatchedPairs {
        kind: String,
        left: usize,
        right: usize,
    },

    #[error("Non-finite {name} loss at epoch {epoch}")]
    NonFiniteLoss { name: &'static str, epoch: usize },
}

pub type Result<T> = std::result::Result<T, RuinaError>;
