//! Standard feature scaling fitted at training time.

use std::path::Path;

use ecgedge_core::FEATURE_COUNT;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::InferenceError;

/// Per-feature standardisation: `(x - mean) / scale`.
///
/// Parameters are exported from the training pipeline as
/// `{ "mean": [8 floats], "scale": [8 floats] }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    mean: [f32; FEATURE_COUNT],
    scale: [f32; FEATURE_COUNT],
}

impl Default for Scaler {
    fn default() -> Self {
        Self::identity()
    }
}

impl Scaler {
    /// Pass-through scaler for models that embed their own normalisation.
    pub fn identity() -> Self {
        Self {
            mean: [0.0; FEATURE_COUNT],
            scale: [1.0; FEATURE_COUNT],
        }
    }

    pub fn new(
        mean: [f32; FEATURE_COUNT],
        scale: [f32; FEATURE_COUNT],
    ) -> Result<Self, InferenceError> {
        let scaler = Self { mean, scale };
        scaler.check()?;
        Ok(scaler)
    }

    pub fn from_json(json: &str) -> Result<Self, InferenceError> {
        let scaler: Self =
            serde_json::from_str(json).map_err(|e| InferenceError::Scaler(e.to_string()))?;
        scaler.check()?;
        Ok(scaler)
    }

    pub fn load(path: &Path) -> Result<Self, InferenceError> {
        let json = std::fs::read_to_string(path).map_err(|source| InferenceError::ScalerIo {
            path: path.to_path_buf(),
            source,
        })?;
        let scaler = Self::from_json(&json)?;
        info!(path = %path.display(), "loaded feature scaler");
        Ok(scaler)
    }

    pub fn transform(&self, features: &[f32; FEATURE_COUNT]) -> [f32; FEATURE_COUNT] {
        let mut out = [0.0; FEATURE_COUNT];
        for (i, o) in out.iter_mut().enumerate() {
            // Zero-variance features are only centred.
            let scale = if self.scale[i] == 0.0 { 1.0 } else { self.scale[i] };
            *o = (features[i] - self.mean[i]) / scale;
        }
        out
    }

    fn check(&self) -> Result<(), InferenceError> {
        if self.mean.iter().chain(&self.scale).all(|v| v.is_finite()) {
            Ok(())
        } else {
            Err(InferenceError::Scaler("parameters must be finite".into()))
        }
    }
}
