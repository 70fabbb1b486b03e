//! Error types for the automation crate.

use crate::action::ActionId;
use crate::execution::ExecutionStatus;
use std::fmt;

/// Errors from validating an automation's action graph.
///
/// Validation runs when an automation is activated, so these errors
/// surface to the author rather than at execution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// An action references a successor that is not in the graph.
    DanglingReference {
        action_id: ActionId,
        target: ActionId,
    },
    /// A trigger's entry action is not in the graph.
    EntryActionMissing { action_id: ActionId },
    /// The graph contains a cycle with no wait action in it.
    ///
    /// Such a cycle would loop synchronously until the step budget kills
    /// the execution; it is rejected at activation instead.
    CycleWithoutWait { action_ids: Vec<ActionId> },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DanglingReference { action_id, target } => {
                write!(f, "action {action_id} references unknown action {target}")
            }
            Self::EntryActionMissing { action_id } => {
                write!(f, "trigger entry action {action_id} is not in the graph")
            }
            Self::CycleWithoutWait { action_ids } => {
                write!(f, "cycle without a wait action: ")?;
                for (i, id) in action_ids.iter().enumerate() {
                    if i > 0 {
                        write!(f, " -> ")?;
                    }
                    write!(f, "{id}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Errors from illegal execution status transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The execution is already in a terminal status.
    AlreadyTerminal { status: ExecutionStatus },
    /// The transition requires a different current status.
    InvalidTransition {
        from: ExecutionStatus,
        attempted: &'static str,
    },
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyTerminal { status } => {
                write!(f, "execution is already terminal ({status:?})")
            }
            Self::InvalidTransition { from, attempted } => {
                write!(f, "cannot {attempted} an execution in status {from:?}")
            }
        }
    }
}

impl std::error::Error for TransitionError {}
