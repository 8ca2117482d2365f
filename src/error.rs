use std::path::PathBuf;

use plotters::drawing::DrawingAreaErrorKind;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, BlazarError>;

#[derive(Debug, Error)]
pub enum BlazarError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("invalid config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Config(String),

    #[error("invalid SED data: {0}")]
    Data(String),

    #[error("invalid chain: {0}")]
    Chain(String),

    #[error("parameter vector has {found} values, expected {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("interpolation needs {0}")]
    Interpolation(&'static str),

    #[error("no posterior samples within 1 sigma")]
    EmptySigmaSet,

    #[error("no parameter vectors selected for the envelope")]
    EmptySelection,

    #[error("model executable {executable} failed ({status}): {stderr}")]
    ModelFailed {
        executable: PathBuf,
        status: String,
        stderr: String,
    },

    #[error("model output {path}: {reason}")]
    ModelOutput { path: PathBuf, reason: String },

    #[error("drawing failed: {0}")]
    Plot(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl BlazarError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BlazarError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        BlazarError::Csv {
            path: path.into(),
            source,
        }
    }
}

impl<E> From<DrawingAreaErrorKind<E>> for BlazarError
where
    E: std::error::Error + Send + Sync,
{
    fn from(err: DrawingAreaErrorKind<E>) -> Self {
        BlazarError::Plot(err.to_string())
    }
}
