use std::path::PathBuf;

use detox_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DistillError {
    /// Rejected before any computation started.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A forward pass, loss, or optimiser step failed.  Fatal for the run.
    #[error("Computation error while {context}: {source}")]
    Computation {
        context: String,
        #[source]
        source: CoreError,
    },

    /// The trained model could not be written.
    #[error("Persistence error at {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: CoreError,
    },

    #[error("Dataset error: {0}")]
    Dataset(#[source] CoreError),
}

impl DistillError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn computation(context: impl Into<String>, source: impl Into<CoreError>) -> Self {
        Self::Computation { context: context.into(), source: source.into() }
    }

    pub fn persistence(path: impl Into<PathBuf>, source: impl Into<CoreError>) -> Self {
        Self::Persistence { path: path.into(), source: source.into() }
    }
}

pub type DistillResult<T> = Result<T, DistillError>;

/// Attach a step description to core / candle failures.
pub(crate) trait ComputeContext<T> {
    fn computing(self, context: &str) -> DistillResult<T>;
}

impl<T, E: Into<CoreError>> ComputeContext<T> for Result<T, E> {
    fn computing(self, context: &str) -> DistillResult<T> {
        self.map_err(|e| DistillError::computation(context, e))
    }
}
