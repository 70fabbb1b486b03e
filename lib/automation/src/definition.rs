//! Automation definition types.
//!
//! An automation is a named, user-authored workflow: one or more triggers
//! plus a graph of actions. Only active automations match events.

use crate::error::ValidationError;
use crate::graph::ActionGraph;
use crate::trigger::Trigger;
use amber_relay_core::AutomationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Lifecycle status of an automation definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationStatus {
    /// Being authored; never matches events.
    Draft,
    /// Live; matches events.
    Active,
    /// Retired; kept for history, never matches events.
    Archived,
}

impl AutomationStatus {
    /// Returns true if automations in this status match events.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// A complete automation definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Automation {
    /// Unique identifier.
    pub id: AutomationId,
    /// Human-readable name.
    pub name: String,
    /// Description of what this automation does.
    pub description: Option<String>,
    /// Lifecycle status.
    pub status: AutomationStatus,
    /// Entry points.
    pub triggers: Vec<Trigger>,
    /// The action graph.
    pub graph: ActionGraph,
    /// When this automation was created.
    pub created_at: DateTime<Utc>,
    /// When this automation was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Automation {
    /// Creates a new draft automation.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: AutomationId::new(),
            name: name.into(),
            description: None,
            status: AutomationStatus::Draft,
            triggers: Vec::new(),
            graph: ActionGraph::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if this automation matches events.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// The entry action ids of all triggers that have one.
    #[must_use]
    pub fn entry_action_ids(&self) -> Vec<crate::action::ActionId> {
        self.triggers
            .iter()
            .filter_map(|t| t.action_id)
            .collect()
    }

    /// Validates the action graph against the trigger entry points.
    ///
    /// # Errors
    ///
    /// Returns the first graph validation failure.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.graph.validate(&self.entry_action_ids())
    }

    /// Validates and activates the automation.
    ///
    /// Unreachable actions are tolerated but logged, since they are
    /// usually leftovers from editing.
    ///
    /// # Errors
    ///
    /// Returns a validation error and leaves the status unchanged.
    pub fn activate(&mut self) -> Result<(), ValidationError> {
        self.validate()?;

        let unreachable = self.graph.unreachable_from(&self.entry_action_ids());
        if !unreachable.is_empty() {
            warn!(
                automation_id = %self.id,
                count = unreachable.len(),
                "activating automation with unreachable actions"
            );
        }

        self.status = AutomationStatus::Active;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Archives the automation.
    pub fn archive(&mut self) {
        self.status = AutomationStatus::Archived;
        self.updated_at = Utc::now();
    }

    /// Marks the definition as updated.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Summary information about an automation (for listings).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationSummary {
    /// Automation ID.
    pub id: AutomationId,
    /// Name.
    pub name: String,
    /// Description, if any.
    pub description: Option<String>,
    /// Lifecycle status.
    pub status: AutomationStatus,
    /// Number of triggers.
    pub trigger_count: usize,
    /// Number of actions in the graph.
    pub action_count: usize,
    /// Last updated timestamp.
    pub updated_at: DateTime<Utc>,
}

impl From<&Automation> for AutomationSummary {
    fn from(automation: &Automation) -> Self {
        Self {
            id: automation.id,
            name: automation.name.clone(),
            description: automation.description.clone(),
            status: automation.status,
            trigger_count: automation.triggers.len(),
            action_count: automation.graph.len(),
            updated_at: automation.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, ActionId, ActionKind, WaitDelay, WaitUnit};

    fn wait_action() -> Action {
        Action::new(
            "Wait",
            ActionKind::Wait {
                delay: WaitDelay::new(1, WaitUnit::Hour),
            },
        )
    }

    #[test]
    fn new_automation_is_draft() {
        let automation = Automation::new("Escalate stale tickets");
        assert_eq!(automation.status, AutomationStatus::Draft);
        assert!(!automation.is_active());
    }

    #[test]
    fn activate_validates_graph() {
        let mut automation = Automation::new("Broken");
        automation
            .triggers
            .push(Trigger::new("ticket.created").with_entry(ActionId::new()));

        // Entry action is not in the (empty) graph.
        assert!(automation.activate().is_err());
        assert_eq!(automation.status, AutomationStatus::Draft);
    }

    #[test]
    fn activate_valid_automation() {
        let mut automation = Automation::new("Works");
        let action = wait_action();
        let entry = action.id;
        automation.graph.insert(action);
        automation
            .triggers
            .push(Trigger::new("ticket.created").with_entry(entry));

        automation.activate().expect("should activate");
        assert!(automation.is_active());
    }

    #[test]
    fn archive_stops_matching() {
        let mut automation = Automation::new("Old");
        automation.archive();
        assert_eq!(automation.status, AutomationStatus::Archived);
        assert!(!automation.is_active());
    }

    #[test]
    fn summary_from_automation() {
        let mut automation = Automation::new("Summary");
        automation.graph.insert(wait_action());
        automation.triggers.push(Trigger::new("ticket.created"));

        let summary = AutomationSummary::from(&automation);
        assert_eq!(summary.id, automation.id);
        assert_eq!(summary.trigger_count, 1);
        assert_eq!(summary.action_count, 1);
    }

    #[test]
    fn automation_serde_roundtrip() {
        let mut automation = Automation::new("Roundtrip");
        automation.graph.insert(wait_action());

        let encoded = serde_json::to_string(&automation).expect("serialize");
        let parsed: Automation = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(automation, parsed);
    }
}
