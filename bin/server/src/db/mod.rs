//! Database repositories for automations, segments, and executions.

pub mod automation;
pub mod execution;
pub mod segment;

pub use automation::AutomationRepository;
pub use execution::ExecutionRepository;
pub use segment::SegmentRepository;

/// Converts a failed id parse into a sqlx decode error.
pub(crate) fn decode_error(what: &str, raw: &str, reason: impl std::fmt::Display) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("invalid {what} '{raw}': {reason}"),
    )))
}
