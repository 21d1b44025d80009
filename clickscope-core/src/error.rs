//! Error types for clickscope-core

use thiserror::Error;

use crate::types::Dataset;

/// Main error type for the clickscope-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A filter update would leave an interval with min > max
    #[error("invalid range for {dimension}: min {min} is greater than max {max}")]
    InvalidRange {
        dimension: String,
        min: String,
        max: String,
    },

    /// A scalar filter value that cannot be applied (e.g. NaN)
    #[error("invalid value for {dimension}: {value}")]
    InvalidValue { dimension: String, value: String },

    /// One of the five required datasets could not be loaded
    #[error("failed to load {dataset}: {reason}")]
    IncompleteIngestion { dataset: Dataset, reason: String },

    /// Filter dimension name not recognized
    #[error("unknown filter dimension: {0}")]
    UnknownDimension(String),
}

impl Error {
    pub(crate) fn invalid_range(
        dimension: impl std::fmt::Display,
        min: impl std::fmt::Display,
        max: impl std::fmt::Display,
    ) -> Self {
        Error::InvalidRange {
            dimension: dimension.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        }
    }

    pub(crate) fn ingestion(dataset: Dataset, reason: impl std::fmt::Display) -> Self {
        Error::IncompleteIngestion {
            dataset,
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for clickscope-core
pub type Result<T> = std::result::Result<T, Error>;
