//! Error types for the insights pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InsightsError {
    #[error("API error: {0}")]
    Api(#[from] bizops_client::BizError),

    #[error("Import error: {0}")]
    Import(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Estimation error: {0}")]
    Estimation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<csv::Error> for InsightsError {
    fn from(err: csv::Error) -> Self {
        InsightsError::Import(format!("csv: {err}"))
    }
}

impl From<calamine::XlsxError> for InsightsError {
    fn from(err: calamine::XlsxError) -> Self {
        InsightsError::Import(format!("xlsx: {err}"))
    }
}

impl From<InsightsError> for String {
    fn from(err: InsightsError) -> Self {
        err.to_string()
    }
}

/// Result type alias for insights operations.
pub type InsightsResult<T> = Result<T, InsightsError>;
