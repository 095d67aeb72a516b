//! Core types shared across ecgedge: feature records, the encrypted request
//! envelope, the diagnosis label set, and model update log entries.

pub mod audit;
pub mod envelope;
pub mod labels;
pub mod record;

pub use audit::{UpdateAttempt, UpdateOutcome};
pub use envelope::{EncryptedEnvelope, EnvelopeError, PayloadCipher, SharedSecret};
pub use labels::Diagnosis;
pub use record::{FEATURE_COUNT, FeatureRecord};
