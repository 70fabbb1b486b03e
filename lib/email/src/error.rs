//! Error types for email composition.

use std::fmt;

/// Errors from composing an email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposeError {
    /// No recipients survived resolution.
    NoRecipients,
}

impl fmt::Display for ComposeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRecipients => write!(f, "no recipients resolved for email"),
        }
    }
}

impl std::error::Error for ComposeError {}
