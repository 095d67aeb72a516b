//! Edge model updater: download, validate, back up, promote, log.
//!
//! One [`Updater`] owns the artifact slots of a model directory. Each cycle
//! walks [`UpdateState`] from `Idle` back to `Idle` and writes exactly one
//! audit entry, whatever the outcome.

mod error;
mod state;
mod updater;

pub use error::UpdateError;
pub use state::UpdateState;
pub use updater::{UpdateReport, Updater};
