//! Event intake: from domain event to finished (or suspended) executions.
//!
//! One processor instance handles every event the broker consumer
//! delivers: match triggers, persist the new executions, and run each
//! through the interpreter. Enrollments are independent; a failure in one
//! never blocks the others.

use amber_relay_automation::{
    Automation, AutomationStore, DomainEvent, Enrollment, Execution, ExecutionStore, Interpreter,
    TriggerMatcher,
};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Drives enrollments produced by the trigger matcher.
pub struct EventProcessor {
    automations: Arc<dyn AutomationStore>,
    executions: Arc<dyn ExecutionStore>,
    matcher: Arc<TriggerMatcher>,
    interpreter: Arc<Interpreter>,
}

impl EventProcessor {
    /// Creates a new processor.
    pub fn new(
        automations: Arc<dyn AutomationStore>,
        executions: Arc<dyn ExecutionStore>,
        matcher: Arc<TriggerMatcher>,
        interpreter: Arc<Interpreter>,
    ) -> Self {
        Self {
            automations,
            executions,
            matcher,
            interpreter,
        }
    }

    /// Handles one inbound domain event end to end.
    ///
    /// All failures are logged rather than propagated: the event stream
    /// must keep draining regardless of what one event does.
    pub async fn process(&self, event: DomainEvent) {
        let automations = match self.automations.list_active().await {
            Ok(automations) => automations,
            Err(e) => {
                error!(kind = %event.kind, error = %e, "failed to load automations");
                return;
            }
        };

        let enrollments = match self.matcher.match_event(&automations, &event).await {
            Ok(enrollments) => enrollments,
            Err(e) => {
                error!(kind = %event.kind, error = %e, "trigger matching failed");
                return;
            }
        };

        if enrollments.is_empty() {
            debug!(kind = %event.kind, "no enrollments for event");
            return;
        }

        info!(
            kind = %event.kind,
            count = enrollments.len(),
            "enrolling targets"
        );

        for enrollment in enrollments {
            let Some(automation) = automations.iter().find(|a| a.id == enrollment.automation_id)
            else {
                continue;
            };
            self.start_execution(automation, enrollment).await;
        }
    }

    /// Creates, runs, and persists one execution.
    ///
    /// Returns the execution in its post-run state, or `None` if it could
    /// not be persisted or run.
    pub async fn start_execution(
        &self,
        automation: &Automation,
        enrollment: Enrollment,
    ) -> Option<Execution> {
        let entry = automation
            .triggers
            .iter()
            .find(|t| t.id == enrollment.trigger_id)
            .and_then(|t| t.action_id);

        let mut execution = Execution::new(
            enrollment.automation_id,
            enrollment.trigger_id,
            enrollment.target_id,
            enrollment.target,
            entry,
        );

        // Persist before running so a crash mid-run leaves a record the
        // re-entrancy guard can see.
        if let Err(e) = self.executions.save(&execution).await {
            error!(execution_id = %execution.id, error = %e, "failed to persist execution");
            return None;
        }

        if let Err(e) = self.interpreter.run(automation, &mut execution).await {
            error!(execution_id = %execution.id, error = %e, "interpreter rejected execution");
            return None;
        }

        if let Err(e) = self.executions.save(&execution).await {
            error!(execution_id = %execution.id, error = %e, "failed to persist execution");
        }

        Some(execution)
    }
}
