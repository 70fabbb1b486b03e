//! Trigger types for automation enrollment.
//!
//! Triggers are the entry points of an automation. Each names the domain
//! event kind it matches, an optional segment gate, and the first action
//! of the graph.

use crate::action::ActionId;
use amber_relay_core::{SegmentId, TriggerId};
use serde::{Deserialize, Serialize};

/// Re-enrollment rules for a trigger.
///
/// By default a target that completed an execution never enrolls again.
/// With re-enrollment enabled, it may, but only when one of the watched
/// fields changed since the previous enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Reenrollment {
    /// Whether re-enrollment is allowed at all.
    pub enabled: bool,
    /// Fields whose change permits re-enrollment.
    #[serde(default)]
    pub fields: Vec<String>,
}

/// A trigger within an automation definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    /// Unique identifier for this trigger.
    pub id: TriggerId,
    /// The domain event kind this trigger matches (e.g. `ticket.created`).
    pub kind: String,
    /// Only targets inside this segment enroll, when set.
    #[serde(default)]
    pub segment_id: Option<SegmentId>,
    /// The entry action of the graph for this trigger.
    #[serde(default)]
    pub action_id: Option<ActionId>,
    /// Re-enrollment rules.
    #[serde(default)]
    pub reenrollment: Option<Reenrollment>,
}

impl Trigger {
    /// Creates a new trigger for an event kind.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            id: TriggerId::new(),
            kind: kind.into(),
            segment_id: None,
            action_id: None,
            reenrollment: None,
        }
    }

    /// Sets the segment gate.
    #[must_use]
    pub fn with_segment(mut self, segment_id: SegmentId) -> Self {
        self.segment_id = Some(segment_id);
        self
    }

    /// Sets the entry action.
    #[must_use]
    pub fn with_entry(mut self, action_id: ActionId) -> Self {
        self.action_id = Some(action_id);
        self
    }

    /// Sets the re-enrollment rules.
    #[must_use]
    pub fn with_reenrollment(mut self, reenrollment: Reenrollment) -> Self {
        self.reenrollment = Some(reenrollment);
        self
    }

    /// Returns true if this trigger matches the given event kind.
    #[must_use]
    pub fn matches_kind(&self, kind: &str) -> bool {
        self.kind == kind
    }
}
