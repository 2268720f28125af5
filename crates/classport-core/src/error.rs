//! Error taxonomy shared by every stage of the scoring pipeline.
//!
//! No stage recovers from these locally: the first error aborts the run and
//! is surfaced to the caller unchanged.

use std::path::PathBuf;

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = ClassifierError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ClassifierError {
    /// Image file missing, unreadable, or not a decodable format.
    #[error("failed to load image {}", path.display())]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    /// Model artifact missing or not a valid serialized graph.
    #[error("failed to load model {}", path.display())]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    /// The graph does not declare the tensors the pipeline requests.
    #[error("model schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// A decoded output does not carry one entry per batch item.
    #[error("output `{output}` decoded {actual} entries for a batch of {expected}")]
    OutputShape {
        output: String,
        expected: usize,
        actual: usize,
    },

    #[error("output `{output}` cannot be decoded: {message}")]
    InvalidOutput { output: String, message: String },

    #[error("inference failed: {0}")]
    Inference(#[source] BoxError),

    #[error("invalid configuration: {message}")]
    Config { message: String },
}

impl ClassifierError {
    pub fn image_load(path: impl Into<PathBuf>, source: impl Into<BoxError>) -> Self {
        Self::ImageLoad {
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn model_load(path: impl Into<PathBuf>, source: impl Into<BoxError>) -> Self {
        Self::ModelLoad {
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn invalid_output(output: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidOutput {
            output: output.into(),
            message: message.into(),
        }
    }
}
