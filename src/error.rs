use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecalcError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing metadata key: {0}")]
    MissingMetadata(String),

    #[error("Invalid year-layer key: {0}")]
    InvalidYearLayerKey(String),

    #[error("Dataset ({kind}) is missing recovery method for column {column}")]
    MissingRecovery { kind: String, column: String },

    #[error("Cannot {operation} while in {mode} state")]
    InvalidState {
        operation: &'static str,
        mode: &'static str,
    },

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("InvalidData: {0}")]
    InvalidData(String),

    #[error("Missing value for year {year} at {key}")]
    MissingYear { key: String, year: i32 },

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error on {}: {source}", path.display())]
    File {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl RecalcError {
    /// True for errors raised before any aggregation work starts.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::MissingMetadata(_) | Self::InvalidYearLayerKey(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RecalcError>;

#[cfg(feature = "python")]
impl From<RecalcError> for pyo3::PyErr {
    fn from(err: RecalcError) -> pyo3::PyErr {
        pyo3::exceptions::PyRuntimeError::new_err(err.to_string())
    }
}
