//! Inference layer: ONNX Runtime classifier, feature scaling, candidate
//! artifact validation, and the request-side inference service.

mod error;
pub use error::{InferenceError, ValidationError};

pub mod classifier;
pub mod scaler;
pub mod service;
pub mod validator;

pub use classifier::Classifier;
pub use scaler::Scaler;
pub use service::{InferenceService, Prediction};
pub use validator::{ArtifactInfo, ArtifactValidator};

#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "onnx")]
pub use onnx::{OnnxClassifier, OnnxValidator};
