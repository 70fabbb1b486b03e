//! Action types for automation graphs.
//!
//! Actions are the steps of an automation. Each action carries:
//! - A unique ID within the automation
//! - A kind (branch, wait, or a side-effecting operation)
//! - A link to the next action (branches route through their own edges)

use amber_relay_core::SegmentId;
use amber_relay_email::{EmailTemplateConfig, RecipientSource};
use amber_relay_segment::Condition;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// A unique identifier for an action within an automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(Ulid);

impl ActionId {
    /// Creates a new random action ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Creates an action ID from a ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "act_{}", self.0)
    }
}

impl FromStr for ActionId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ulid_str = s.strip_prefix("act_").unwrap_or(s);
        Ulid::from_str(ulid_str).map(Self)
    }
}

/// Unit for wait delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitUnit {
    Minute,
    Hour,
    Day,
}

/// How long a wait action suspends an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitDelay {
    /// Number of units to wait.
    pub value: u32,
    /// The unit.
    pub unit: WaitUnit,
}

impl WaitDelay {
    /// Creates a new delay.
    #[must_use]
    pub fn new(value: u32, unit: WaitUnit) -> Self {
        Self { value, unit }
    }

    /// Returns the delay as a chrono duration.
    #[must_use]
    pub fn duration(&self) -> Duration {
        let value = i64::from(self.value);
        match self.unit {
            WaitUnit::Minute => Duration::minutes(value),
            WaitUnit::Hour => Duration::hours(value),
            WaitUnit::Day => Duration::days(value),
        }
    }
}

/// A field written by a create-record action.
///
/// `value` is a template; `{{ path }}` placeholders resolve against the
/// execution's target document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Field name on the new record.
    pub field: String,
    /// Template for the field value.
    pub value: String,
}

/// Operation applied by a set-properties rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyOperation {
    /// Set the field to the rendered value.
    Set,
    /// Clear the field.
    Clear,
}

/// A single field mutation on the target's own record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyRule {
    /// Dotted field path on the record.
    pub field: String,
    /// The operation.
    pub operation: PropertyOperation,
    /// Template for the value (ignored for `Clear`).
    #[serde(default)]
    pub value: String,
}

/// Configuration for an action, varying by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    /// Conditional branch. Routes through `yes_action_id` or
    /// `no_action_id`; the action's `next_action_id` is ignored.
    ///
    /// Exactly one of `segment_id` / `condition` should be set. When both
    /// are absent the branch never matches.
    Branch {
        /// Segment whose membership decides the branch.
        #[serde(default)]
        segment_id: Option<SegmentId>,
        /// Inline property condition, for branches too small for a saved
        /// segment.
        #[serde(default)]
        condition: Option<Condition>,
        /// Action to run when the target matches.
        #[serde(default)]
        yes_action_id: Option<ActionId>,
        /// Action to run when it does not.
        #[serde(default)]
        no_action_id: Option<ActionId>,
    },
    /// Suspend the execution for a fixed delay.
    Wait {
        /// How long to wait.
        delay: WaitDelay,
    },
    /// Compose and send an email.
    SendEmail {
        /// Subject and body templates.
        template: EmailTemplateConfig,
        /// Where the recipients come from.
        recipients: Vec<RecipientSource>,
    },
    /// Create a record in a peer service.
    CreateRecord {
        /// The peer service (e.g. `tickets`).
        service: String,
        /// The record kind within that service (e.g. `ticket`).
        record_kind: String,
        /// Field templates for the new record.
        fields: Vec<FieldMapping>,
    },
    /// Mutate fields on the target's own record in its home service.
    SetProperties {
        /// The peer service owning the target.
        service: String,
        /// The record kind within that service.
        record_kind: String,
        /// The mutations to apply.
        rules: Vec<PropertyRule>,
    },
}

impl ActionKind {
    /// A short label for logs and execution traces.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Branch { .. } => "branch",
            Self::Wait { .. } => "wait",
            Self::SendEmail { .. } => "send_email",
            Self::CreateRecord { .. } => "create_record",
            Self::SetProperties { .. } => "set_properties",
        }
    }
}

/// A step in an automation's action graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Unique identifier within the automation.
    pub id: ActionId,
    /// Human-readable name.
    pub name: String,
    /// The action's behavior.
    pub kind: ActionKind,
    /// The action to run next. `None` terminates the chain. Ignored for
    /// branches, which route through their yes/no edges.
    #[serde(default)]
    pub next_action_id: Option<ActionId>,
}

impl Action {
    /// Creates a new action with no successor.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            id: ActionId::new(),
            name: name.into(),
            kind,
            next_action_id: None,
        }
    }

    /// Sets the successor action.
    #[must_use]
    pub fn with_next(mut self, next: ActionId) -> Self {
        self.next_action_id = Some(next);
        self
    }

    /// Returns true if this is a wait action.
    #[must_use]
    pub fn is_wait(&self) -> bool {
        matches!(self.kind, ActionKind::Wait { .. })
    }

    /// The ids this action can hand control to.
    #[must_use]
    pub fn successor_ids(&self) -> Vec<ActionId> {
        match &self.kind {
            ActionKind::Branch {
                yes_action_id,
                no_action_id,
                ..
            } => yes_action_id
                .iter()
                .chain(no_action_id.iter())
                .copied()
                .collect(),
            _ => self.next_action_id.into_iter().collect(),
        }
    }
}
