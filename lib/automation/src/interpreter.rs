//! The action interpreter.
//!
//! The interpreter advances one execution through its automation's action
//! graph until it hits a terminal condition:
//!
//! - the chain ends (`Complete`)
//! - a wait action suspends it (`Waiting`, resumed later by the sweeper)
//! - an action fails (`Error`)
//! - the definition no longer covers it (`Missing`)
//!
//! Side effects leave the process through two seams: [`ActionDispatcher`]
//! for peer-service operations and [`amber_relay_email::Mailer`] for SMTP.
//! A step budget bounds each activation so authored loops cannot spin
//! synchronously.

use crate::action::{Action, ActionKind, PropertyOperation};
use crate::definition::Automation;
use crate::error::TransitionError;
use crate::execution::{ActionLogEntry, Execution, ExecutionStatus};
use amber_relay_core::SegmentId;
use amber_relay_core::json::set_path;
use amber_relay_email::{Mailer, compose, resolve_recipients, template};
use amber_relay_segment::{Condition, SegmentMatcher};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Default per-activation step budget.
pub const DEFAULT_MAX_STEPS: u32 = 50;

/// The peer service that owns the team-member directory.
const DIRECTORY_SERVICE: &str = "core";

/// Directory operation resolving member ids to email addresses.
const DIRECTORY_EMAILS_OPERATION: &str = "team_members.emails";

/// A request to a peer service over the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    /// The peer service name (e.g. `tickets`).
    pub service: String,
    /// The operation (e.g. `ticket.create`).
    pub operation: String,
    /// Operation payload.
    pub payload: JsonValue,
}

impl ServiceRequest {
    /// Creates a new request.
    #[must_use]
    pub fn new(
        service: impl Into<String>,
        operation: impl Into<String>,
        payload: JsonValue,
    ) -> Self {
        Self {
            service: service.into(),
            operation: operation.into(),
            payload,
        }
    }
}

/// Errors from dispatching a request to a peer service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The request could not be delivered or the peer reported failure.
    RequestFailed {
        service: String,
        operation: String,
        message: String,
    },
    /// The peer's reply could not be interpreted.
    InvalidReply { message: String },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestFailed {
                service,
                operation,
                message,
            } => write!(f, "request {service}.{operation} failed: {message}"),
            Self::InvalidReply { message } => write!(f, "invalid reply: {message}"),
        }
    }
}

impl std::error::Error for DispatchError {}

/// Trait for peer-service dispatch.
///
/// Production uses the NATS request/reply implementation in
/// [`crate::broker`]; tests use [`RecordingDispatcher`].
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    /// Sends a request and returns the peer's reply payload.
    async fn dispatch(&self, request: ServiceRequest) -> Result<JsonValue, DispatchError>;
}

/// A dispatcher that records requests and returns a canned reply.
#[derive(Default)]
pub struct RecordingDispatcher {
    requests: Arc<Mutex<Vec<ServiceRequest>>>,
    reply: JsonValue,
    /// If set, every dispatch fails with this error.
    pub fail_with: Option<DispatchError>,
}

impl RecordingDispatcher {
    /// Creates a dispatcher replying with an empty object.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reply: json!({}),
            ..Self::default()
        }
    }

    /// Creates a dispatcher with a canned reply.
    #[must_use]
    pub fn replying(reply: JsonValue) -> Self {
        Self {
            reply,
            ..Self::default()
        }
    }

    /// Creates a dispatcher that fails every request.
    #[must_use]
    pub fn failing(error: DispatchError) -> Self {
        Self {
            reply: JsonValue::Null,
            fail_with: Some(error),
            ..Self::default()
        }
    }

    /// Returns the requests recorded so far.
    #[must_use]
    pub fn requests(&self) -> Vec<ServiceRequest> {
        self.requests
            .lock()
            .expect("request log lock poisoned")
            .clone()
    }
}

#[async_trait]
impl ActionDispatcher for RecordingDispatcher {
    async fn dispatch(&self, request: ServiceRequest) -> Result<JsonValue, DispatchError> {
        self.requests
            .lock()
            .expect("request log lock poisoned")
            .push(request);
        match &self.fail_with {
            Some(error) => Err(error.clone()),
            None => Ok(self.reply.clone()),
        }
    }
}

/// Walks executions through their action graphs.
pub struct Interpreter {
    dispatcher: Arc<dyn ActionDispatcher>,
    segments: Arc<dyn SegmentMatcher>,
    mailer: Arc<dyn Mailer>,
    max_steps: u32,
}

impl Interpreter {
    /// Creates an interpreter with the default step budget.
    pub fn new(
        dispatcher: Arc<dyn ActionDispatcher>,
        segments: Arc<dyn SegmentMatcher>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            dispatcher,
            segments,
            mailer,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Overrides the per-activation step budget.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Runs an active execution until it suspends or terminates.
    ///
    /// All action failures are recorded on the execution itself; the only
    /// error this returns is an illegal status transition, which indicates
    /// a caller bug.
    pub async fn run(
        &self,
        automation: &Automation,
        execution: &mut Execution,
    ) -> Result<(), TransitionError> {
        if execution.status != ExecutionStatus::Active {
            warn!(
                execution_id = %execution.id,
                status = ?execution.status,
                "interpreter invoked on non-active execution"
            );
            return Ok(());
        }

        let mut steps = 0u32;

        loop {
            let Some(action_id) = execution.current_action_id else {
                return execution.complete();
            };

            if steps >= self.max_steps {
                return execution.fail(format!(
                    "action budget exhausted after {} steps",
                    self.max_steps
                ));
            }

            let Some(action) = automation.graph.get(action_id) else {
                return execution.missing(format!("action {action_id} is not in the graph"));
            };
            steps += 1;

            let started_at = Utc::now();
            debug!(
                execution_id = %execution.id,
                action_id = %action.id,
                kind = action.kind.label(),
                "running action"
            );

            match &action.kind {
                ActionKind::Branch {
                    segment_id,
                    condition,
                    yes_action_id,
                    no_action_id,
                } => {
                    let matched = match self
                        .evaluate_branch(*segment_id, condition.as_ref(), &execution.target)
                        .await
                    {
                        Ok(matched) => matched,
                        Err(message) => {
                            execution.log_action(log_entry(
                                action,
                                started_at,
                                None,
                                Some(message.clone()),
                            ));
                            return execution.fail(message);
                        }
                    };

                    execution.log_action(log_entry(
                        action,
                        started_at,
                        Some(json!({ "matched": matched })),
                        None,
                    ));
                    let next = if matched {
                        *yes_action_id
                    } else {
                        *no_action_id
                    };
                    execution.advance_to(next);
                }
                ActionKind::Wait { delay } => {
                    let until = Utc::now() + delay.duration();
                    execution.log_action(log_entry(
                        action,
                        started_at,
                        Some(json!({ "wait_until": until })),
                        None,
                    ));
                    execution.advance_to(action.next_action_id);
                    return execution.begin_wait(action.id, until);
                }
                _ => match self.perform(action, execution).await {
                    Ok(result) => {
                        execution.log_action(log_entry(action, started_at, Some(result), None));
                        execution.advance_to(action.next_action_id);
                    }
                    Err(message) => {
                        execution.log_action(log_entry(
                            action,
                            started_at,
                            None,
                            Some(message.clone()),
                        ));
                        return execution.fail(message);
                    }
                },
            }
        }
    }

    /// Resumes a waiting execution and runs it onward.
    ///
    /// # Errors
    ///
    /// Returns an error if the execution is not `Waiting`.
    pub async fn resume(
        &self,
        automation: &Automation,
        execution: &mut Execution,
    ) -> Result<(), TransitionError> {
        execution.resume()?;
        self.run(automation, execution).await
    }

    async fn evaluate_branch(
        &self,
        segment_id: Option<SegmentId>,
        condition: Option<&Condition>,
        target: &JsonValue,
    ) -> Result<bool, String> {
        if let Some(segment_id) = segment_id {
            self.segments
                .is_member(segment_id, target)
                .await
                .map_err(|e| format!("segment check failed: {e}"))
        } else if let Some(condition) = condition {
            Ok(condition.evaluate(target))
        } else {
            // A branch with neither a segment nor a condition never
            // matches; authoring UIs should prevent this.
            Ok(false)
        }
    }

    /// Executes a side-effecting action and returns its result payload.
    async fn perform(&self, action: &Action, execution: &mut Execution) -> Result<JsonValue, String> {
        match &action.kind {
            ActionKind::SendEmail {
                template: email_template,
                recipients,
            } => {
                let resolution = resolve_recipients(recipients, &execution.target);
                for invalid in &resolution.invalid {
                    warn!(
                        execution_id = %execution.id,
                        recipient = invalid.as_str(),
                        "dropping invalid recipient"
                    );
                }

                let mut emails = resolution.emails;
                if !resolution.team_member_ids.is_empty() {
                    let reply = self
                        .dispatcher
                        .dispatch(ServiceRequest::new(
                            DIRECTORY_SERVICE,
                            DIRECTORY_EMAILS_OPERATION,
                            json!({ "member_ids": resolution.team_member_ids }),
                        ))
                        .await
                        .map_err(|e| e.to_string())?;

                    let members: Vec<String> =
                        serde_json::from_value(reply.get("emails").cloned().unwrap_or_default())
                            .map_err(|e| format!("invalid directory reply: {e}"))?;
                    for member in members {
                        if !emails.contains(&member) {
                            emails.push(member);
                        }
                    }
                }

                let email = compose(email_template, &execution.target, emails)
                    .map_err(|e| e.to_string())?;
                self.mailer.send(&email).await.map_err(|e| e.to_string())?;

                Ok(json!({ "to": email.to, "subject": email.subject }))
            }
            ActionKind::CreateRecord {
                service,
                record_kind,
                fields,
            } => {
                let mut record = serde_json::Map::new();
                for mapping in fields {
                    let rendered = template::render(&mapping.value, &execution.target);
                    record.insert(mapping.field.clone(), JsonValue::String(rendered.text));
                }

                self.dispatcher
                    .dispatch(ServiceRequest::new(
                        service.as_str(),
                        format!("{record_kind}.create"),
                        json!({ "record": record, "source_target_id": execution.target_id }),
                    ))
                    .await
                    .map_err(|e| e.to_string())
            }
            ActionKind::SetProperties {
                service,
                record_kind,
                rules,
            } => {
                let mut fields = serde_json::Map::new();
                for rule in rules {
                    let value = match rule.operation {
                        PropertyOperation::Set => {
                            let rendered = template::render(&rule.value, &execution.target);
                            JsonValue::String(rendered.text)
                        }
                        PropertyOperation::Clear => JsonValue::Null,
                    };
                    fields.insert(rule.field.clone(), value);
                }

                let reply = self
                    .dispatcher
                    .dispatch(ServiceRequest::new(
                        service.as_str(),
                        format!("{record_kind}.update"),
                        json!({ "target_id": execution.target_id, "fields": fields.clone() }),
                    ))
                    .await
                    .map_err(|e| e.to_string())?;

                // Keep the local snapshot in sync so downstream
                // placeholders and branches see the new values.
                for (field, value) in fields {
                    set_path(&mut execution.target, &field, value);
                }

                Ok(reply)
            }
            ActionKind::Branch { .. } | ActionKind::Wait { .. } => {
                // Handled in the run loop.
                Err(format!("{} is not a side-effecting action", action.kind.label()))
            }
        }
    }
}

fn log_entry(
    action: &Action,
    started_at: chrono::DateTime<Utc>,
    result: Option<JsonValue>,
    error: Option<String>,
) -> ActionLogEntry {
    ActionLogEntry {
        action_id: action.id,
        kind: action.kind.label().to_string(),
        started_at,
        finished_at: Utc::now(),
        result,
        error,
    }
}
