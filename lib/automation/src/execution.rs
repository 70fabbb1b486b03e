//! Execution state machine.
//!
//! An execution is one enrollment of an automation against a specific
//! target record. Status lifecycle:
//!
//! ```text
//! Active -> Waiting -> Active -> ... -> Complete | Error | Missing
//! ```
//!
//! `Complete`, `Error`, and `Missing` are terminal; the tracker rejects
//! transitions out of them.

use crate::action::ActionId;
use crate::error::TransitionError;
use amber_relay_core::{AutomationId, ExecutionId, TriggerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// The interpreter is (or may be) advancing through actions.
    Active,
    /// Suspended at a wait action until `wait_until`.
    Waiting,
    /// An action failed; downstream actions did not run.
    Error,
    /// The definition no longer covers this execution (stale action id,
    /// deleted automation).
    Missing,
    /// The action chain ran to its end.
    Complete,
}

impl ExecutionStatus {
    /// Returns true if this is a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error | Self::Missing | Self::Complete)
    }
}

/// One entry in an execution's action trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLogEntry {
    /// The action that ran.
    pub action_id: ActionId,
    /// The action kind label (for history rendering).
    pub kind: String,
    /// When the action started.
    pub started_at: DateTime<Utc>,
    /// When the action finished.
    pub finished_at: DateTime<Utc>,
    /// Result payload, if the action produced one.
    pub result: Option<JsonValue>,
    /// Error message, if the action failed.
    pub error: Option<String>,
}

/// One enrollment of an automation against a target record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    /// Unique identifier.
    pub id: ExecutionId,
    /// The automation being executed.
    pub automation_id: AutomationId,
    /// The trigger that enrolled the target.
    pub trigger_id: TriggerId,
    /// The target record's id in its home service.
    pub target_id: String,
    /// Snapshot of the target document at enrollment (updated when the
    /// automation mutates it).
    pub target: JsonValue,
    /// Current status.
    pub status: ExecutionStatus,
    /// The action the interpreter will run next.
    pub current_action_id: Option<ActionId>,
    /// The wait action this execution is suspended at, when `Waiting`.
    pub waiting_action_id: Option<ActionId>,
    /// When the wait elapses, when `Waiting`.
    pub wait_until: Option<DateTime<Utc>>,
    /// The error that terminated this execution, when `Error`/`Missing`.
    pub last_error: Option<String>,
    /// Ordered trace of every action that ran.
    pub action_log: Vec<ActionLogEntry>,
    /// When the execution was created.
    pub created_at: DateTime<Utc>,
    /// When the execution was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Execution {
    /// Creates a new active execution starting at the given entry action.
    #[must_use]
    pub fn new(
        automation_id: AutomationId,
        trigger_id: TriggerId,
        target_id: impl Into<String>,
        target: JsonValue,
        entry_action_id: Option<ActionId>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ExecutionId::new(),
            automation_id,
            trigger_id,
            target_id: target_id.into(),
            target,
            status: ExecutionStatus::Active,
            current_action_id: entry_action_id,
            waiting_action_id: None,
            wait_until: None,
            last_error: None,
            action_log: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Appends an entry to the action trace.
    pub fn log_action(&mut self, entry: ActionLogEntry) {
        self.action_log.push(entry);
        self.updated_at = Utc::now();
    }

    /// Moves the cursor to the next action.
    pub fn advance_to(&mut self, next: Option<ActionId>) {
        self.current_action_id = next;
        self.updated_at = Utc::now();
    }

    /// Suspends the execution at a wait action.
    ///
    /// # Errors
    ///
    /// Returns an error unless the execution is `Active`.
    pub fn begin_wait(
        &mut self,
        action_id: ActionId,
        until: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if self.status != ExecutionStatus::Active {
            return Err(self.bad_transition("suspend"));
        }
        self.status = ExecutionStatus::Waiting;
        self.waiting_action_id = Some(action_id);
        self.wait_until = Some(until);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Resumes a waiting execution.
    ///
    /// The cursor already points at the action after the wait; the
    /// interpreter stores it before suspending.
    ///
    /// # Errors
    ///
    /// Returns an error unless the execution is `Waiting`.
    pub fn resume(&mut self) -> Result<(), TransitionError> {
        if self.status != ExecutionStatus::Waiting {
            return Err(self.bad_transition("resume"));
        }
        self.status = ExecutionStatus::Active;
        self.waiting_action_id = None;
        self.wait_until = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Marks the execution complete.
    ///
    /// # Errors
    ///
    /// Returns an error if the execution is already terminal.
    pub fn complete(&mut self) -> Result<(), TransitionError> {
        self.terminal_transition(ExecutionStatus::Complete, None)
    }

    /// Marks the execution failed.
    ///
    /// # Errors
    ///
    /// Returns an error if the execution is already terminal.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        self.terminal_transition(ExecutionStatus::Error, Some(error.into()))
    }

    /// Marks the execution missing (definition no longer covers it).
    ///
    /// # Errors
    ///
    /// Returns an error if the execution is already terminal.
    pub fn missing(&mut self, reason: impl Into<String>) -> Result<(), TransitionError> {
        self.terminal_transition(ExecutionStatus::Missing, Some(reason.into()))
    }

    /// Returns true if the wait has elapsed at the given time.
    #[must_use]
    pub fn wait_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.status == ExecutionStatus::Waiting
            && self.wait_until.is_some_and(|until| until <= now)
    }

    fn terminal_transition(
        &mut self,
        status: ExecutionStatus,
        error: Option<String>,
    ) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::AlreadyTerminal {
                status: self.status,
            });
        }
        self.status = status;
        self.last_error = error;
        self.current_action_id = None;
        self.waiting_action_id = None;
        self.wait_until = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    fn bad_transition(&self, attempted: &'static str) -> TransitionError {
        if self.status.is_terminal() {
            TransitionError::AlreadyTerminal {
                status: self.status,
            }
        } else {
            TransitionError::InvalidTransition {
                from: self.status,
                attempted,
            }
        }
    }
}
