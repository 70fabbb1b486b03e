//! The operational HTTP surface.
//!
//! Deliberately small: automation definitions and segments go in, manual
//! triggers and execution lookups come out. The customer-facing CRUD
//! surfaces live in the peer services, not here.

use crate::db::{AutomationRepository, ExecutionRepository, SegmentRepository};
use crate::engine::EventProcessor;
use crate::error::ApiError;
use amber_relay_automation::{
    Action, Automation, AutomationSummary, Execution, TriggerMatcher, matcher::target_id_of,
    trigger::Trigger,
};
use amber_relay_core::{ExecutionId, TriggerId};
use amber_relay_segment::{ConditionGroup, Segment};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub automations: Arc<AutomationRepository>,
    pub executions: Arc<ExecutionRepository>,
    pub segments: Arc<SegmentRepository>,
    pub matcher: Arc<TriggerMatcher>,
    pub processor: Arc<EventProcessor>,
}

/// Builds the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/automations", get(list_automations).post(create_automation))
        .route("/automations/{id}/trigger", post(trigger_automation))
        .route("/executions/{id}", get(get_execution))
        .route("/segments", post(create_segment))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> Json<JsonValue> {
    Json(json!({ "status": "ok" }))
}

/// Payload for creating an automation definition.
#[derive(Debug, Deserialize)]
pub struct CreateAutomationRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub actions: Vec<Action>,
    /// Validate and activate immediately instead of saving a draft.
    #[serde(default)]
    pub activate: bool,
}

async fn create_automation(
    State(state): State<AppState>,
    Json(request): Json<CreateAutomationRequest>,
) -> Result<(StatusCode, Json<AutomationSummary>), ApiError> {
    let mut automation = Automation::new(request.name);
    automation.description = request.description;
    automation.triggers = request.triggers;
    automation.graph = request.actions.into();

    if request.activate {
        automation.activate().map_err(|e| ApiError::BadRequest {
            message: e.to_string(),
        })?;
    }

    state.automations.create(&automation).await?;

    Ok((StatusCode::CREATED, Json(AutomationSummary::from(&automation))))
}

async fn list_automations(
    State(state): State<AppState>,
) -> Result<Json<Vec<AutomationSummary>>, ApiError> {
    let automations = state.automations.list_all().await?;
    Ok(Json(
        automations.iter().map(AutomationSummary::from).collect(),
    ))
}

/// Payload for manually triggering an automation.
#[derive(Debug, Deserialize)]
pub struct ManualTriggerRequest {
    /// The trigger to enroll through; defaults to the automation's first.
    #[serde(default)]
    pub trigger_id: Option<TriggerId>,
    /// The target documents to enroll. Each must carry a string `_id`.
    pub targets: Vec<JsonValue>,
}

/// One enrolled execution in the manual-trigger response.
#[derive(Debug, Serialize)]
pub struct TriggeredExecution {
    pub execution_id: ExecutionId,
    pub target_id: String,
    pub status: amber_relay_automation::ExecutionStatus,
}

async fn trigger_automation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ManualTriggerRequest>,
) -> Result<Json<Vec<TriggeredExecution>>, ApiError> {
    let automation_id = id.parse().map_err(|_| ApiError::BadRequest {
        message: format!("invalid automation id '{id}'"),
    })?;

    let automation = state
        .automations
        .find_by_id(automation_id)
        .await?
        .ok_or(ApiError::NotFound {
            what: "automation",
            id,
        })?;

    if !automation.is_active() {
        return Err(ApiError::BadRequest {
            message: "automation is not active".to_string(),
        });
    }

    let trigger = match request.trigger_id {
        Some(trigger_id) => automation.triggers.iter().find(|t| t.id == trigger_id),
        None => automation.triggers.first(),
    }
    .ok_or(ApiError::BadRequest {
        message: "automation has no matching trigger".to_string(),
    })?;

    let mut triggered = Vec::new();
    for target in &request.targets {
        let Some(target_id) = target_id_of(target) else {
            warn!("manual trigger target without _id skipped");
            continue;
        };

        let enrollment = state
            .matcher
            .try_enroll(&automation, trigger, target_id, target)
            .await?;

        if let Some(enrollment) = enrollment
            && let Some(execution) = state.processor.start_execution(&automation, enrollment).await
        {
            triggered.push(TriggeredExecution {
                execution_id: execution.id,
                target_id: execution.target_id,
                status: execution.status,
            });
        }
    }

    Ok(Json(triggered))
}

async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Execution>, ApiError> {
    let execution_id = ExecutionId::from_str(&id).map_err(|_| ApiError::BadRequest {
        message: format!("invalid execution id '{id}'"),
    })?;

    let execution = state
        .executions
        .find_by_id(execution_id)
        .await?
        .ok_or(ApiError::NotFound {
            what: "execution",
            id,
        })?;

    Ok(Json(execution))
}

/// Payload for creating a segment.
#[derive(Debug, Deserialize)]
pub struct CreateSegmentRequest {
    pub name: String,
    pub record_kind: String,
    pub conditions: ConditionGroup,
}

async fn create_segment(
    State(state): State<AppState>,
    Json(request): Json<CreateSegmentRequest>,
) -> Result<(StatusCode, Json<Segment>), ApiError> {
    let segment = Segment::new(request.name, request.record_kind, request.conditions);
    state.segments.create(&segment).await?;
    Ok((StatusCode::CREATED, Json(segment)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_automation_request_defaults() {
        let request: CreateAutomationRequest =
            serde_json::from_value(json!({ "name": "Minimal" })).expect("deserialize");

        assert_eq!(request.name, "Minimal");
        assert!(request.triggers.is_empty());
        assert!(request.actions.is_empty());
        assert!(!request.activate);
    }

    #[test]
    fn manual_trigger_request_shape() {
        let request: ManualTriggerRequest = serde_json::from_value(json!({
            "targets": [{"_id": "t1"}]
        }))
        .expect("deserialize");

        assert!(request.trigger_id.is_none());
        assert_eq!(request.targets.len(), 1);
    }
}
