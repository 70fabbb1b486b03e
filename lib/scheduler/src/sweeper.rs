//! The wait sweep.
//!
//! Runs on an interval: loads waiting executions whose deadline has
//! passed, resumes each through the interpreter, and persists the result.
//! Executions are processed independently; one failure never aborts the
//! sweep.

use crate::error::SweepError;
use amber_relay_automation::{AutomationStore, ExecutionStore, Interpreter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Default number of due executions processed per sweep.
pub const DEFAULT_SWEEP_BATCH: usize = 100;

/// Counters for one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Executions whose wait had elapsed.
    pub due: u32,
    /// Executions resumed and advanced.
    pub resumed: u32,
    /// Executions marked missing (automation gone).
    pub missing: u32,
    /// Executions that could not be processed this pass.
    pub failed: u32,
}

impl SweepReport {
    /// Returns true if the sweep found nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.due == 0
    }
}

/// Finds elapsed waits and resumes them.
pub struct WaitSweeper {
    automations: Arc<dyn AutomationStore>,
    executions: Arc<dyn ExecutionStore>,
    interpreter: Arc<Interpreter>,
    batch_size: usize,
}

impl WaitSweeper {
    /// Creates a sweeper with the default batch size.
    pub fn new(
        automations: Arc<dyn AutomationStore>,
        executions: Arc<dyn ExecutionStore>,
        interpreter: Arc<Interpreter>,
    ) -> Self {
        Self {
            automations,
            executions,
            interpreter,
            batch_size: DEFAULT_SWEEP_BATCH,
        }
    }

    /// Overrides the per-sweep batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Runs one sweep pass at the given time.
    ///
    /// # Errors
    ///
    /// Returns an error only when the list of due executions cannot be
    /// loaded; per-execution failures are counted in the report.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, SweepError> {
        let due = self.executions.list_due_waits(now, self.batch_size).await?;

        let mut report = SweepReport {
            due: due.len() as u32,
            ..SweepReport::default()
        };

        for mut execution in due {
            let automation = match self.automations.find(execution.automation_id).await {
                Ok(Some(automation)) => automation,
                Ok(None) => {
                    // The definition was deleted while this execution
                    // slept; the enrollment no longer means anything.
                    if let Err(e) = execution.missing("automation no longer exists") {
                        warn!(execution_id = %execution.id, error = %e, "stale wait");
                        report.failed += 1;
                        continue;
                    }
                    match self.executions.save(&execution).await {
                        Ok(()) => report.missing += 1,
                        Err(e) => {
                            warn!(execution_id = %execution.id, error = %e, "save failed");
                            report.failed += 1;
                        }
                    }
                    continue;
                }
                Err(e) => {
                    warn!(execution_id = %execution.id, error = %e, "automation load failed");
                    report.failed += 1;
                    continue;
                }
            };

            if let Err(e) = self.interpreter.resume(&automation, &mut execution).await {
                warn!(execution_id = %execution.id, error = %e, "resume failed");
                report.failed += 1;
                continue;
            }

            match self.executions.save(&execution).await {
                Ok(()) => report.resumed += 1,
                Err(e) => {
                    warn!(execution_id = %execution.id, error = %e, "save failed");
                    report.failed += 1;
                }
            }
        }

        if !report.is_empty() {
            info!(
                due = report.due,
                resumed = report.resumed,
                missing = report.missing,
                failed = report.failed,
                "wait sweep finished"
            );
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amber_relay_automation::{
        Action, ActionKind, Automation, AutomationStatus, Execution, ExecutionStatus,
        InMemoryAutomationStore, InMemoryExecutionStore, RecordingDispatcher, Trigger, WaitDelay,
        WaitUnit,
    };
    use amber_relay_email::{EmailTemplateConfig, RecipientSource, RecordingMailer};
    use amber_relay_segment::InMemorySegmentMatcher;
    use serde_json::json;

    struct Harness {
        automations: Arc<InMemoryAutomationStore>,
        executions: Arc<InMemoryExecutionStore>,
        mailer: Arc<RecordingMailer>,
        sweeper: WaitSweeper,
    }

    fn harness() -> Harness {
        let automations = Arc::new(InMemoryAutomationStore::new());
        let executions = Arc::new(InMemoryExecutionStore::new());
        let mailer = Arc::new(RecordingMailer::new());
        let interpreter = Arc::new(Interpreter::new(
            Arc::new(RecordingDispatcher::new()),
            Arc::new(InMemorySegmentMatcher::new()),
            mailer.clone(),
        ));
        let sweeper = WaitSweeper::new(automations.clone(), executions.clone(), interpreter);
        Harness {
            automations,
            executions,
            mailer,
            sweeper,
        }
    }

    /// Automation: wait 1h -> send email.
    fn waiting_automation() -> Automation {
        let email = Action::new(
            "Notify",
            ActionKind::SendEmail {
                template: EmailTemplateConfig {
                    subject: "Still open".to_string(),
                    content: "<p>Ping</p>".to_string(),
                },
                recipients: vec![RecipientSource::Static {
                    emails: vec!["team@example.com".to_string()],
                }],
            },
        );
        let wait = Action::new(
            "Cool off",
            ActionKind::Wait {
                delay: WaitDelay::new(1, WaitUnit::Hour),
            },
        )
        .with_next(email.id);
        let entry = wait.id;

        let mut automation = Automation::new("Ping after wait");
        automation.graph.insert(wait);
        automation.graph.insert(email);
        automation
            .triggers
            .push(Trigger::new("ticket.created").with_entry(entry));
        automation.status = AutomationStatus::Active;
        automation
    }

    /// An execution suspended at the automation's wait, due `offset` ago.
    fn suspended_execution(automation: &Automation, minutes_overdue: i64) -> Execution {
        let trigger = &automation.triggers[0];
        let wait_id = trigger.action_id.expect("entry");
        let wait_action = automation.graph.get(wait_id).expect("wait action");

        let mut execution = Execution::new(
            automation.id,
            trigger.id,
            "t1",
            json!({"_id": "t1"}),
            trigger.action_id,
        );
        execution.advance_to(wait_action.next_action_id);
        execution
            .begin_wait(
                wait_id,
                Utc::now() - chrono::Duration::minutes(minutes_overdue),
            )
            .expect("suspend");
        execution
    }

    #[tokio::test]
    async fn sweep_resumes_due_execution() {
        let h = harness();
        let automation = waiting_automation();
        let execution = suspended_execution(&automation, 5);
        h.automations.insert(automation);
        h.executions.save(&execution).await.expect("save");

        let report = h.sweeper.sweep(Utc::now()).await.expect("sweep");

        assert_eq!(report.due, 1);
        assert_eq!(report.resumed, 1);
        assert_eq!(report.failed, 0);

        let stored = h
            .executions
            .find(execution.id)
            .await
            .expect("find")
            .expect("some");
        assert_eq!(stored.status, ExecutionStatus::Complete);
        assert_eq!(h.mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn sweep_ignores_future_waits() {
        let h = harness();
        let automation = waiting_automation();
        let execution = suspended_execution(&automation, -30); // due in 30m
        h.automations.insert(automation);
        h.executions.save(&execution).await.expect("save");

        let report = h.sweeper.sweep(Utc::now()).await.expect("sweep");
        assert!(report.is_empty());

        let stored = h
            .executions
            .find(execution.id)
            .await
            .expect("find")
            .expect("some");
        assert_eq!(stored.status, ExecutionStatus::Waiting);
    }

    #[tokio::test]
    async fn sweep_marks_orphaned_executions_missing() {
        let h = harness();
        let automation = waiting_automation();
        let execution = suspended_execution(&automation, 5);
        // Automation is never stored: it was deleted while the wait slept.
        h.executions.save(&execution).await.expect("save");

        let report = h.sweeper.sweep(Utc::now()).await.expect("sweep");

        assert_eq!(report.due, 1);
        assert_eq!(report.missing, 1);

        let stored = h
            .executions
            .find(execution.id)
            .await
            .expect("find")
            .expect("some");
        assert_eq!(stored.status, ExecutionStatus::Missing);
    }

    #[tokio::test]
    async fn sweep_respects_batch_size() {
        let h = harness();
        let automation = waiting_automation();
        for _ in 0..3 {
            let execution = suspended_execution(&automation, 5);
            h.executions.save(&execution).await.expect("save");
        }
        h.automations.insert(automation);

        let sweeper = WaitSweeper::new(
            h.automations.clone(),
            h.executions.clone(),
            Arc::new(Interpreter::new(
                Arc::new(RecordingDispatcher::new()),
                Arc::new(InMemorySegmentMatcher::new()),
                h.mailer.clone(),
            )),
        )
        .with_batch_size(2);

        let report = sweeper.sweep(Utc::now()).await.expect("sweep");
        assert_eq!(report.due, 2);
        assert_eq!(report.resumed, 2);
    }
}
