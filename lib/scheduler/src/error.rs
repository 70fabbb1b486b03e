//! Error types for the scheduler crate.

use amber_relay_automation::StoreError;
use std::fmt;

/// Errors that abort a whole sweep.
///
/// Failures of individual executions are counted in the sweep report
/// instead; only infrastructure failures surface here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepError {
    /// The execution store failed.
    Store(StoreError),
}

impl fmt::Display for SweepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "sweep storage error: {e}"),
        }
    }
}

impl std::error::Error for SweepError {}

impl From<StoreError> for SweepError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}
