//! Inference service: feature record in, diagnosis out.

use std::sync::Arc;

use ecgedge_core::{Diagnosis, FeatureRecord};
use serde::Serialize;
use tracing::debug;

use crate::classifier::{Classifier, argmax};
use crate::{InferenceError, Scaler};

/// Classification result for one record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub label: Diagnosis,
    /// Score of the winning label (softmax probability for the shipped models).
    pub confidence: f32,
}

/// Stateless request-side wrapper around a shared classifier and scaler.
///
/// Built once at startup; `classify` takes `&self` and may be called from
/// any number of tasks at once.
#[derive(Clone)]
pub struct InferenceService {
    classifier: Arc<dyn Classifier>,
    scaler: Scaler,
}

impl InferenceService {
    pub fn new(classifier: Arc<dyn Classifier>, scaler: Scaler) -> Self {
        Self { classifier, scaler }
    }

    pub fn classify(&self, record: &FeatureRecord) -> Result<Prediction, InferenceError> {
        let features = self.scaler.transform(&record.to_features());
        let scores = self.classifier.scores(&features)?;
        if scores.len() != Diagnosis::COUNT {
            return Err(InferenceError::OutputShape {
                got: scores.len(),
                expected: Diagnosis::COUNT,
            });
        }

        let (index, confidence) = argmax(&scores).ok_or(InferenceError::NoScores)?;
        let label = Diagnosis::from_index(index).ok_or(InferenceError::OutputShape {
            got: scores.len(),
            expected: Diagnosis::COUNT,
        })?;
        debug!(%label, confidence, "classified record");
        Ok(Prediction { label, confidence })
    }
}
