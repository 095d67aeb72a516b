//! ONNX Runtime backed classifier and artifact validator.
//!
//! The classifier takes a `[1, 8]` float32 input and yields `[1, 6]` scores.

use std::path::Path;
use std::sync::Mutex;

use ecgedge_core::{Diagnosis, FEATURE_COUNT};
use ort::session::Session;
use ort::value::{Tensor, ValueType};
use tracing::{debug, info};

use crate::classifier::Classifier;
use crate::validator::{ArtifactInfo, ArtifactValidator};
use crate::{InferenceError, ValidationError};

/// Classifier over an ONNX Runtime session, loaded once.
///
/// `Session::run` needs exclusive access, so concurrent callers take turns on
/// the inner lock; a single inference is sub-millisecond for this model size.
pub struct OnnxClassifier {
    session: Mutex<Session>,
}

impl OnnxClassifier {
    pub fn load(path: &Path) -> Result<Self, InferenceError> {
        let session = Session::builder()?.commit_from_file(path)?;
        info!(model = %path.display(), "loaded classifier model");
        Ok(Self {
            session: Mutex::new(session),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, InferenceError> {
        let session = Session::builder()?.commit_from_memory(bytes)?;
        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl Classifier for OnnxClassifier {
    fn scores(&self, features: &[f32; FEATURE_COUNT]) -> Result<Vec<f32>, InferenceError> {
        let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        Ok(run_once(&mut session, features)?)
    }
}

/// Validates candidates by building a session and running one dry inference.
#[derive(Debug, Default, Clone, Copy)]
pub struct OnnxValidator;

impl ArtifactValidator for OnnxValidator {
    fn validate(&self, bytes: &[u8]) -> Result<ArtifactInfo, ValidationError> {
        if bytes.is_empty() {
            return Err(ValidationError::Empty);
        }

        // The session lives only for this call and is dropped on every path.
        let mut session = Session::builder()
            .and_then(|b| b.commit_from_memory(bytes))
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;

        let inputs = session.inputs();
        let outputs = session.outputs();
        if inputs.len() != 1 || outputs.is_empty() {
            return Err(ValidationError::Incompatible(format!(
                "expected 1 input and at least 1 output, found {} and {}",
                inputs.len(),
                outputs.len()
            )));
        }
        check_last_dim("input", inputs[0].dtype(), FEATURE_COUNT)?;
        check_last_dim("output", outputs[0].dtype(), Diagnosis::COUNT)?;

        // Forces tensor allocation for the model's real input shape.
        let scores = run_once(&mut session, &[0.0; FEATURE_COUNT])
            .map_err(|e| ValidationError::Allocation(e.to_string()))?;
        if scores.len() != Diagnosis::COUNT {
            return Err(ValidationError::Incompatible(format!(
                "dry run produced {} scores, expected {}",
                scores.len(),
                Diagnosis::COUNT
            )));
        }

        debug!(bytes = bytes.len(), "artifact passed validation");
        Ok(ArtifactInfo {
            size_bytes: bytes.len(),
            input_features: FEATURE_COUNT,
            output_classes: Diagnosis::COUNT,
        })
    }
}

fn run_once(session: &mut Session, features: &[f32; FEATURE_COUNT]) -> ort::Result<Vec<f32>> {
    let shape = [1i64, FEATURE_COUNT as i64];
    let input = Tensor::from_array((shape, features.to_vec().into_boxed_slice()))?;
    let outputs = session.run(ort::inputs![input])?;
    let (_shape, data) = outputs[0].try_extract_tensor::<f32>()?;
    Ok(data.to_vec())
}

/// Accept a tensor whose last dimension is `expected` or dynamic.
fn check_last_dim(
    which: &str,
    value_type: &ValueType,
    expected: usize,
) -> Result<(), ValidationError> {
    let ValueType::Tensor { shape, .. } = value_type else {
        return Err(ValidationError::Incompatible(format!(
            "{which} is not a tensor"
        )));
    };
    match shape.last() {
        Some(&d) if d < 0 || d as usize == expected => Ok(()),
        Some(&d) => Err(ValidationError::Incompatible(format!(
            "{which} has {d} features, expected {expected}"
        ))),
        None => Err(ValidationError::Incompatible(format!("{which} is a scalar"))),
    }
}
