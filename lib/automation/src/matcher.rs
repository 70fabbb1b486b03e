//! Trigger matching: turning domain events into enrollments.
//!
//! Peer services publish a domain event whenever a record changes. The
//! matcher fans each event out across the active automations and decides,
//! per trigger and per target, whether a new execution should start.

use crate::definition::Automation;
use crate::store::{ExecutionStore, StoreError};
use crate::trigger::Trigger;
use amber_relay_core::json::lookup_path;
use amber_relay_core::{AutomationId, TriggerId};
use amber_relay_segment::SegmentMatcher;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{debug, warn};

/// A record-change event published by a peer service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// The event kind (e.g. `ticket.created`, `customer.updated`).
    pub kind: String,
    /// The affected record documents. Each must carry a string `_id`.
    pub targets: Vec<JsonValue>,
}

impl DomainEvent {
    /// Creates a new event.
    #[must_use]
    pub fn new(kind: impl Into<String>, targets: Vec<JsonValue>) -> Self {
        Self {
            kind: kind.into(),
            targets,
        }
    }
}

/// A decision to start an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    /// The automation to run.
    pub automation_id: AutomationId,
    /// The trigger that matched.
    pub trigger_id: TriggerId,
    /// The target record id.
    pub target_id: String,
    /// The target document.
    pub target: JsonValue,
}

/// Matches inbound events against automation definitions.
pub struct TriggerMatcher {
    segments: Arc<dyn SegmentMatcher>,
    executions: Arc<dyn ExecutionStore>,
}

impl TriggerMatcher {
    /// Creates a new matcher.
    pub fn new(segments: Arc<dyn SegmentMatcher>, executions: Arc<dyn ExecutionStore>) -> Self {
        Self {
            segments,
            executions,
        }
    }

    /// Matches an event against the given automations.
    ///
    /// Only active automations are considered. For each matching trigger
    /// and target, segment gates, the re-entrancy guard, and
    /// re-enrollment rules are applied in that order.
    ///
    /// # Errors
    ///
    /// Returns an error if the execution store fails; segment evaluation
    /// failures fail closed for the affected target instead.
    pub async fn match_event(
        &self,
        automations: &[Automation],
        event: &DomainEvent,
    ) -> Result<Vec<Enrollment>, StoreError> {
        let mut enrollments = Vec::new();

        if event.targets.is_empty() {
            debug!(kind = %event.kind, "dropping event with no targets");
            return Ok(enrollments);
        }

        for automation in automations.iter().filter(|a| a.is_active()) {
            for trigger in automation
                .triggers
                .iter()
                .filter(|t| t.matches_kind(&event.kind))
            {
                for target in &event.targets {
                    let Some(target_id) = target_id_of(target) else {
                        warn!(kind = %event.kind, "skipping target without _id");
                        continue;
                    };

                    if let Some(enrollment) = self
                        .try_enroll(automation, trigger, target_id, target)
                        .await?
                    {
                        enrollments.push(enrollment);
                    }
                }
            }
        }

        Ok(enrollments)
    }

    /// Applies the segment gate, re-entrancy guard, and re-enrollment
    /// rules for one target, producing an enrollment when all pass.
    ///
    /// Also used directly for manual triggering, which picks the trigger
    /// instead of matching an event kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the execution store fails.
    pub async fn try_enroll(
        &self,
        automation: &Automation,
        trigger: &Trigger,
        target_id: &str,
        target: &JsonValue,
    ) -> Result<Option<Enrollment>, StoreError> {
        // Segment gate: failures fail closed.
        if let Some(segment_id) = trigger.segment_id {
            match self.segments.is_member(segment_id, target).await {
                Ok(true) => {}
                Ok(false) => return Ok(None),
                Err(e) => {
                    warn!(
                        automation_id = %automation.id,
                        trigger_id = %trigger.id,
                        error = %e,
                        "segment check failed, skipping enrollment"
                    );
                    return Ok(None);
                }
            }
        }

        let previous = self
            .executions
            .find_latest(automation.id, trigger.id, target_id)
            .await?;

        if let Some(previous) = previous {
            // Re-entrancy guard: one live execution per enrollment triple.
            if !previous.status.is_terminal() {
                debug!(
                    execution_id = %previous.id,
                    "target already enrolled, skipping"
                );
                return Ok(None);
            }

            match &trigger.reenrollment {
                Some(rules) if rules.enabled => {
                    if !fields_changed(&previous.target, target, &rules.fields) {
                        debug!(
                            execution_id = %previous.id,
                            "no watched field changed, skipping re-enrollment"
                        );
                        return Ok(None);
                    }
                }
                _ => return Ok(None),
            }
        }

        Ok(Some(Enrollment {
            automation_id: automation.id,
            trigger_id: trigger.id,
            target_id: target_id.to_string(),
            target: target.clone(),
        }))
    }
}

/// Extracts the `_id` field of a target document.
#[must_use]
pub fn target_id_of(target: &JsonValue) -> Option<&str> {
    target.get("_id").and_then(JsonValue::as_str)
}

/// Returns true if any of the watched fields differ between two snapshots.
///
/// An empty watch list never permits re-enrollment.
fn fields_changed(previous: &JsonValue, current: &JsonValue, fields: &[String]) -> bool {
    fields
        .iter()
        .any(|field| lookup_path(previous, field) != lookup_path(current, field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, ActionKind, WaitDelay, WaitUnit};
    use crate::definition::AutomationStatus;
    use crate::execution::Execution;
    use crate::store::InMemoryExecutionStore;
    use crate::trigger::Reenrollment;
    use amber_relay_segment::{
        Condition, ConditionGroup, ConditionNode, InMemorySegmentMatcher, Operator, Segment,
    };
    use amber_relay_core::SegmentId;
    use serde_json::json;

    fn active_automation(kind: &str) -> Automation {
        let mut automation = Automation::new("Test");
        let action = Action::new(
            "Wait",
            ActionKind::Wait {
                delay: WaitDelay::new(1, WaitUnit::Hour),
            },
        );
        let entry = action.id;
        automation.graph.insert(action);
        automation
            .triggers
            .push(Trigger::new(kind).with_entry(entry));
        automation.status = AutomationStatus::Active;
        automation
    }

    fn matcher_with(
        executions: Arc<InMemoryExecutionStore>,
    ) -> (TriggerMatcher, Arc<InMemorySegmentMatcher>) {
        let segments = Arc::new(InMemorySegmentMatcher::new());
        let matcher = TriggerMatcher::new(segments.clone(), executions);
        (matcher, segments)
    }

    #[tokio::test]
    async fn matches_event_kind_to_trigger() {
        let executions = Arc::new(InMemoryExecutionStore::new());
        let (matcher, _) = matcher_with(executions);

        let automation = active_automation("ticket.created");
        let event = DomainEvent::new("ticket.created", vec![json!({"_id": "t1"})]);

        let enrollments = matcher
            .match_event(std::slice::from_ref(&automation), &event)
            .await
            .expect("match");

        assert_eq!(enrollments.len(), 1);
        assert_eq!(enrollments[0].automation_id, automation.id);
        assert_eq!(enrollments[0].target_id, "t1");
    }

    #[tokio::test]
    async fn ignores_other_kinds_and_inactive_automations() {
        let executions = Arc::new(InMemoryExecutionStore::new());
        let (matcher, _) = matcher_with(executions);

        let active = active_automation("ticket.created");
        let mut draft = active_automation("ticket.updated");
        draft.status = AutomationStatus::Draft;

        let event = DomainEvent::new("ticket.updated", vec![json!({"_id": "t1"})]);
        let enrollments = matcher
            .match_event(&[active, draft], &event)
            .await
            .expect("match");

        assert!(enrollments.is_empty());
    }

    #[tokio::test]
    async fn skips_targets_without_id() {
        let executions = Arc::new(InMemoryExecutionStore::new());
        let (matcher, _) = matcher_with(executions);

        let automation = active_automation("ticket.created");
        let event = DomainEvent::new(
            "ticket.created",
            vec![json!({"status": "open"}), json!({"_id": "t2"})],
        );

        let enrollments = matcher
            .match_event(std::slice::from_ref(&automation), &event)
            .await
            .expect("match");

        assert_eq!(enrollments.len(), 1);
        assert_eq!(enrollments[0].target_id, "t2");
    }

    #[tokio::test]
    async fn segment_gate_filters_targets() {
        let executions = Arc::new(InMemoryExecutionStore::new());
        let (matcher, segments) = matcher_with(executions);

        let segment = Segment::new(
            "Open",
            "ticket",
            ConditionGroup::all(vec![ConditionNode::Property(Condition::new(
                "status",
                Operator::Equals,
                json!("open"),
            ))]),
        );
        let segment_id = segment.id;
        segments.insert(segment);

        let mut automation = active_automation("ticket.created");
        automation.triggers[0].segment_id = Some(segment_id);

        let event = DomainEvent::new(
            "ticket.created",
            vec![
                json!({"_id": "t1", "status": "open"}),
                json!({"_id": "t2", "status": "closed"}),
            ],
        );

        let enrollments = matcher
            .match_event(std::slice::from_ref(&automation), &event)
            .await
            .expect("match");

        assert_eq!(enrollments.len(), 1);
        assert_eq!(enrollments[0].target_id, "t1");
    }

    #[tokio::test]
    async fn unknown_segment_fails_closed() {
        let executions = Arc::new(InMemoryExecutionStore::new());
        let (matcher, _) = matcher_with(executions);

        let mut automation = active_automation("ticket.created");
        automation.triggers[0].segment_id = Some(SegmentId::new());

        let event = DomainEvent::new("ticket.created", vec![json!({"_id": "t1"})]);
        let enrollments = matcher
            .match_event(std::slice::from_ref(&automation), &event)
            .await
            .expect("match");

        assert!(enrollments.is_empty());
    }

    #[tokio::test]
    async fn reentrancy_guard_blocks_live_execution() {
        let executions = Arc::new(InMemoryExecutionStore::new());
        let automation = active_automation("ticket.created");
        let trigger = &automation.triggers[0];

        // Simulate a live enrollment.
        let live = Execution::new(
            automation.id,
            trigger.id,
            "t1",
            json!({"_id": "t1"}),
            trigger.action_id,
        );
        executions.save(&live).await.expect("save");

        let (matcher, _) = matcher_with(executions);
        let event = DomainEvent::new("ticket.created", vec![json!({"_id": "t1"})]);

        let enrollments = matcher
            .match_event(std::slice::from_ref(&automation), &event)
            .await
            .expect("match");

        assert!(enrollments.is_empty());
    }

    #[tokio::test]
    async fn completed_execution_blocks_without_reenrollment() {
        let executions = Arc::new(InMemoryExecutionStore::new());
        let automation = active_automation("ticket.created");
        let trigger = &automation.triggers[0];

        let mut done = Execution::new(
            automation.id,
            trigger.id,
            "t1",
            json!({"_id": "t1", "status": "open"}),
            trigger.action_id,
        );
        done.complete().expect("complete");
        executions.save(&done).await.expect("save");

        let (matcher, _) = matcher_with(executions);
        let event = DomainEvent::new(
            "ticket.created",
            vec![json!({"_id": "t1", "status": "closed"})],
        );

        let enrollments = matcher
            .match_event(std::slice::from_ref(&automation), &event)
            .await
            .expect("match");

        assert!(enrollments.is_empty());
    }

    #[tokio::test]
    async fn reenrollment_requires_watched_field_change() {
        let executions = Arc::new(InMemoryExecutionStore::new());
        let mut automation = active_automation("ticket.updated");
        automation.triggers[0].reenrollment = Some(Reenrollment {
            enabled: true,
            fields: vec!["status".to_string()],
        });
        let trigger = &automation.triggers[0];

        let mut done = Execution::new(
            automation.id,
            trigger.id,
            "t1",
            json!({"_id": "t1", "status": "open", "priority": 1}),
            trigger.action_id,
        );
        done.complete().expect("complete");
        executions.save(&done).await.expect("save");

        let (matcher, _) = matcher_with(executions.clone());

        // Unwatched field changed: no re-enrollment.
        let event = DomainEvent::new(
            "ticket.updated",
            vec![json!({"_id": "t1", "status": "open", "priority": 5})],
        );
        let enrollments = matcher
            .match_event(std::slice::from_ref(&automation), &event)
            .await
            .expect("match");
        assert!(enrollments.is_empty());

        // Watched field changed: re-enrollment.
        let event = DomainEvent::new(
            "ticket.updated",
            vec![json!({"_id": "t1", "status": "closed", "priority": 1})],
        );
        let enrollments = matcher
            .match_event(std::slice::from_ref(&automation), &event)
            .await
            .expect("match");
        assert_eq!(enrollments.len(), 1);
    }

    #[test]
    fn fields_changed_with_empty_watch_list() {
        assert!(!fields_changed(
            &json!({"a": 1}),
            &json!({"a": 2}),
            &[]
        ));
    }
}
