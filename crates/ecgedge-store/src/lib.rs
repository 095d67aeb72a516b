//! Storage layer: model artifact slots (current, backups, incoming), the
//! cross-process update lease and the append-only update log.

mod error;
pub use error::StoreError;

pub mod artifact;
pub mod audit;
pub mod lease;

pub use artifact::ArtifactStore;
pub use audit::AuditLog;
pub use lease::UpdateLease;
