//! Repository for executions.

use crate::db::decode_error;
use amber_relay_automation::{
    ActionId, ActionLogEntry, Execution, ExecutionStatus, ExecutionStore, StoreError,
};
use amber_relay_core::{AutomationId, ExecutionId, TriggerId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

/// Row type for execution queries.
#[derive(FromRow)]
struct ExecutionRow {
    id: String,
    automation_id: String,
    trigger_id: String,
    target_id: String,
    target: serde_json::Value,
    status: String,
    current_action_id: Option<String>,
    waiting_action_id: Option<String>,
    wait_until: Option<DateTime<Utc>>,
    last_error: Option<String>,
    action_log: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ExecutionRow {
    fn try_into_execution(self) -> Result<Execution, sqlx::Error> {
        let id = ExecutionId::from_str(&self.id)
            .map_err(|e| decode_error("execution id", &self.id, e))?;
        let automation_id = AutomationId::from_str(&self.automation_id)
            .map_err(|e| decode_error("automation id", &self.automation_id, e))?;
        let trigger_id = TriggerId::from_str(&self.trigger_id)
            .map_err(|e| decode_error("trigger id", &self.trigger_id, e))?;
        let status = status_from_str(&self.status)
            .ok_or_else(|| decode_error("execution status", &self.status, "unknown status"))?;
        let current_action_id = parse_action_id(self.current_action_id.as_deref())?;
        let waiting_action_id = parse_action_id(self.waiting_action_id.as_deref())?;
        let action_log: Vec<ActionLogEntry> = serde_json::from_value(self.action_log)
            .map_err(|e| decode_error("action log", &self.id, e))?;

        Ok(Execution {
            id,
            automation_id,
            trigger_id,
            target_id: self.target_id,
            target: self.target,
            status,
            current_action_id,
            waiting_action_id,
            wait_until: self.wait_until,
            last_error: self.last_error,
            action_log,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn parse_action_id(raw: Option<&str>) -> Result<Option<ActionId>, sqlx::Error> {
    match raw {
        None => Ok(None),
        Some(s) => ActionId::from_str(s)
            .map(Some)
            .map_err(|e| decode_error("action id", s, e)),
    }
}

fn status_to_str(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Active => "active",
        ExecutionStatus::Waiting => "waiting",
        ExecutionStatus::Error => "error",
        ExecutionStatus::Missing => "missing",
        ExecutionStatus::Complete => "complete",
    }
}

fn status_from_str(status: &str) -> Option<ExecutionStatus> {
    match status {
        "active" => Some(ExecutionStatus::Active),
        "waiting" => Some(ExecutionStatus::Waiting),
        "error" => Some(ExecutionStatus::Error),
        "missing" => Some(ExecutionStatus::Missing),
        "complete" => Some(ExecutionStatus::Complete),
        _ => None,
    }
}

/// Repository for executions.
pub struct ExecutionRepository {
    pool: PgPool,
}

impl ExecutionRepository {
    /// Creates a new repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts or updates an execution.
    pub async fn upsert(&self, execution: &Execution) -> Result<(), sqlx::Error> {
        let action_log = serde_json::to_value(&execution.action_log).unwrap_or_default();

        sqlx::query(
            r#"
            INSERT INTO executions
                (id, automation_id, trigger_id, target_id, target, status,
                 current_action_id, waiting_action_id, wait_until, last_error,
                 action_log, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id)
            DO UPDATE SET target = $5, status = $6, current_action_id = $7,
                waiting_action_id = $8, wait_until = $9, last_error = $10,
                action_log = $11, updated_at = $13
            "#,
        )
        .bind(execution.id.to_string())
        .bind(execution.automation_id.to_string())
        .bind(execution.trigger_id.to_string())
        .bind(&execution.target_id)
        .bind(&execution.target)
        .bind(status_to_str(execution.status))
        .bind(execution.current_action_id.map(|id| id.to_string()))
        .bind(execution.waiting_action_id.map(|id| id.to_string()))
        .bind(execution.wait_until)
        .bind(&execution.last_error)
        .bind(&action_log)
        .bind(execution.created_at)
        .bind(execution.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Finds an execution by id.
    pub async fn find_by_id(&self, id: ExecutionId) -> Result<Option<Execution>, sqlx::Error> {
        let row: Option<ExecutionRow> = sqlx::query_as(
            r#"
            SELECT id, automation_id, trigger_id, target_id, target, status,
                   current_action_id, waiting_action_id, wait_until, last_error,
                   action_log, created_at, updated_at
            FROM executions
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(r.try_into_execution()?)),
            None => Ok(None),
        }
    }

    /// Finds the newest execution for an enrollment triple.
    pub async fn find_latest_row(
        &self,
        automation_id: AutomationId,
        trigger_id: TriggerId,
        target_id: &str,
    ) -> Result<Option<Execution>, sqlx::Error> {
        let row: Option<ExecutionRow> = sqlx::query_as(
            r#"
            SELECT id, automation_id, trigger_id, target_id, target, status,
                   current_action_id, waiting_action_id, wait_until, last_error,
                   action_log, created_at, updated_at
            FROM executions
            WHERE automation_id = $1 AND trigger_id = $2 AND target_id = $3
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(automation_id.to_string())
        .bind(trigger_id.to_string())
        .bind(target_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(r.try_into_execution()?)),
            None => Ok(None),
        }
    }

    /// Lists waiting executions whose deadline has passed.
    pub async fn list_due_rows(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Execution>, sqlx::Error> {
        let rows: Vec<ExecutionRow> = sqlx::query_as(
            r#"
            SELECT id, automation_id, trigger_id, target_id, target, status,
                   current_action_id, waiting_action_id, wait_until, last_error,
                   action_log, created_at, updated_at
            FROM executions
            WHERE status = 'waiting' AND wait_until <= $1
            ORDER BY wait_until
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into_execution()).collect()
    }
}

#[async_trait]
impl ExecutionStore for ExecutionRepository {
    async fn save(&self, execution: &Execution) -> Result<(), StoreError> {
        self.upsert(execution)
            .await
            .map_err(|e| StoreError::StorageFailed {
                message: e.to_string(),
            })
    }

    async fn find(&self, id: ExecutionId) -> Result<Option<Execution>, StoreError> {
        self.find_by_id(id)
            .await
            .map_err(|e| StoreError::StorageFailed {
                message: e.to_string(),
            })
    }

    async fn find_latest(
        &self,
        automation_id: AutomationId,
        trigger_id: TriggerId,
        target_id: &str,
    ) -> Result<Option<Execution>, StoreError> {
        self.find_latest_row(automation_id, trigger_id, target_id)
            .await
            .map_err(|e| StoreError::StorageFailed {
                message: e.to_string(),
            })
    }

    async fn list_due_waits(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Execution>, StoreError> {
        self.list_due_rows(now, limit as i64)
            .await
            .map_err(|e| StoreError::StorageFailed {
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            ExecutionStatus::Active,
            ExecutionStatus::Waiting,
            ExecutionStatus::Error,
            ExecutionStatus::Missing,
            ExecutionStatus::Complete,
        ] {
            assert_eq!(status_from_str(status_to_str(status)), Some(status));
        }
    }

    #[test]
    fn row_decodes_execution() {
        let execution = Execution::new(
            AutomationId::new(),
            TriggerId::new(),
            "t1",
            json!({"_id": "t1"}),
            Some(ActionId::new()),
        );

        let row = ExecutionRow {
            id: execution.id.to_string(),
            automation_id: execution.automation_id.to_string(),
            trigger_id: execution.trigger_id.to_string(),
            target_id: execution.target_id.clone(),
            target: execution.target.clone(),
            status: "active".to_string(),
            current_action_id: execution.current_action_id.map(|id| id.to_string()),
            waiting_action_id: None,
            wait_until: None,
            last_error: None,
            action_log: json!([]),
            created_at: execution.created_at,
            updated_at: execution.updated_at,
        };

        let decoded = row.try_into_execution().expect("decode");
        assert_eq!(decoded.id, execution.id);
        assert_eq!(decoded.current_action_id, execution.current_action_id);
        assert_eq!(decoded.status, ExecutionStatus::Active);
    }
}
