use thiserror::Error;

#[derive(Debug, Error)]
pub enum SentryError {
    #[error("schema error: {0}")]
    Schema(String),

    #[error("column count mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("model '{0}' has not been fitted")]
    NotFitted(&'static str),

    #[error("empty dataset: {0}")]
    EmptyDataset(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, SentryError>;
