//! Error types for segment operations.

use amber_relay_core::SegmentId;
use std::fmt;

/// Errors from segment lookup and evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentError {
    /// Segment with the given id does not exist.
    NotFound { segment_id: SegmentId },
    /// The backing store failed.
    StorageFailed { message: String },
}

impl fmt::Display for SegmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { segment_id } => write!(f, "segment not found: {segment_id}"),
            Self::StorageFailed { message } => write!(f, "segment storage failed: {message}"),
        }
    }
}

impl std::error::Error for SegmentError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SegmentError::NotFound {
            segment_id: SegmentId::new(),
        };
        assert!(err.to_string().contains("segment not found"));
    }
}
