//! Candidate artifact validation seam.

use crate::ValidationError;

/// What a successful validation learned about the artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactInfo {
    pub size_bytes: usize,
    pub input_features: usize,
    pub output_classes: usize,
}

/// Attempts to load candidate bytes into an inference-ready form.
///
/// Implementations must not touch persisted state and must release anything
/// they allocate before returning, on success and on failure.
pub trait ArtifactValidator: Send + Sync {
    fn validate(&self, bytes: &[u8]) -> Result<ArtifactInfo, ValidationError>;
}

impl<F> ArtifactValidator for F
where
    F: Fn(&[u8]) -> Result<ArtifactInfo, ValidationError> + Send + Sync,
{
    fn validate(&self, bytes: &[u8]) -> Result<ArtifactInfo, ValidationError> {
        self(bytes)
    }
}
