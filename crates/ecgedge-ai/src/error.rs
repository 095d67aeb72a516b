use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("model produced {got} scores, expected {expected}")]
    OutputShape { got: usize, expected: usize },

    #[error("model produced no finite scores")]
    NoScores,

    #[error("inference runtime error: {0}")]
    Runtime(String),

    #[error("reading scaler {path}: {source}")]
    ScalerIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid scaler parameters: {0}")]
    Scaler(String),
}

#[cfg(feature = "onnx")]
impl From<ort::Error> for InferenceError {
    fn from(e: ort::Error) -> Self {
        Self::Runtime(e.to_string())
    }
}

/// Why a candidate artifact cannot be used for inference.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("artifact is empty")]
    Empty,

    #[error("malformed model container: {0}")]
    Malformed(String),

    #[error("incompatible model: {0}")]
    Incompatible(String),

    #[error("tensor allocation failed: {0}")]
    Allocation(String),
}
