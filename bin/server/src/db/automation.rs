//! Repository for automation definitions.

use crate::db::decode_error;
use amber_relay_automation::{
    ActionGraph, Automation, AutomationStatus, AutomationStore, StoreError, Trigger,
};
use amber_relay_core::AutomationId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

/// Row type for automation queries.
#[derive(FromRow)]
struct AutomationRow {
    id: String,
    name: String,
    description: Option<String>,
    status: String,
    triggers: serde_json::Value,
    actions: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AutomationRow {
    fn try_into_automation(self) -> Result<Automation, sqlx::Error> {
        let id = AutomationId::from_str(&self.id)
            .map_err(|e| decode_error("automation id", &self.id, e))?;
        let status = status_from_str(&self.status)
            .ok_or_else(|| decode_error("automation status", &self.status, "unknown status"))?;
        let triggers: Vec<Trigger> = serde_json::from_value(self.triggers)
            .map_err(|e| decode_error("automation triggers", &self.id, e))?;
        let graph: ActionGraph = serde_json::from_value(self.actions)
            .map_err(|e| decode_error("automation actions", &self.id, e))?;

        Ok(Automation {
            id,
            name: self.name,
            description: self.description,
            status,
            triggers,
            graph,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn status_to_str(status: AutomationStatus) -> &'static str {
    match status {
        AutomationStatus::Draft => "draft",
        AutomationStatus::Active => "active",
        AutomationStatus::Archived => "archived",
    }
}

fn status_from_str(status: &str) -> Option<AutomationStatus> {
    match status {
        "draft" => Some(AutomationStatus::Draft),
        "active" => Some(AutomationStatus::Active),
        "archived" => Some(AutomationStatus::Archived),
        _ => None,
    }
}

/// Repository for automation definitions.
pub struct AutomationRepository {
    pool: PgPool,
}

impl AutomationRepository {
    /// Creates a new repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a new automation.
    pub async fn create(&self, automation: &Automation) -> Result<(), sqlx::Error> {
        let triggers = serde_json::to_value(&automation.triggers).unwrap_or_default();
        let actions = serde_json::to_value(&automation.graph).unwrap_or_default();

        sqlx::query(
            r#"
            INSERT INTO automations
                (id, name, description, status, triggers, actions, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(automation.id.to_string())
        .bind(&automation.name)
        .bind(&automation.description)
        .bind(status_to_str(automation.status))
        .bind(&triggers)
        .bind(&actions)
        .bind(automation.created_at)
        .bind(automation.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Updates an existing automation.
    pub async fn update(&self, automation: &Automation) -> Result<(), sqlx::Error> {
        let triggers = serde_json::to_value(&automation.triggers).unwrap_or_default();
        let actions = serde_json::to_value(&automation.graph).unwrap_or_default();

        sqlx::query(
            r#"
            UPDATE automations
            SET name = $2, description = $3, status = $4, triggers = $5, actions = $6,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(automation.id.to_string())
        .bind(&automation.name)
        .bind(&automation.description)
        .bind(status_to_str(automation.status))
        .bind(&triggers)
        .bind(&actions)
        .bind(automation.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Finds an automation by id.
    pub async fn find_by_id(&self, id: AutomationId) -> Result<Option<Automation>, sqlx::Error> {
        let row: Option<AutomationRow> = sqlx::query_as(
            r#"
            SELECT id, name, description, status, triggers, actions, created_at, updated_at
            FROM automations
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(r.try_into_automation()?)),
            None => Ok(None),
        }
    }

    /// Lists all automations.
    pub async fn list_all(&self) -> Result<Vec<Automation>, sqlx::Error> {
        let rows: Vec<AutomationRow> = sqlx::query_as(
            r#"
            SELECT id, name, description, status, triggers, actions, created_at, updated_at
            FROM automations
            ORDER BY updated_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into_automation()).collect()
    }

    /// Lists active automations.
    pub async fn list_active_rows(&self) -> Result<Vec<Automation>, sqlx::Error> {
        let rows: Vec<AutomationRow> = sqlx::query_as(
            r#"
            SELECT id, name, description, status, triggers, actions, created_at, updated_at
            FROM automations
            WHERE status = 'active'
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into_automation()).collect()
    }
}

#[async_trait]
impl AutomationStore for AutomationRepository {
    async fn list_active(&self) -> Result<Vec<Automation>, StoreError> {
        self.list_active_rows()
            .await
            .map_err(|e| StoreError::StorageFailed {
                message: e.to_string(),
            })
    }

    async fn find(&self, id: AutomationId) -> Result<Option<Automation>, StoreError> {
        self.find_by_id(id)
            .await
            .map_err(|e| StoreError::StorageFailed {
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            AutomationStatus::Draft,
            AutomationStatus::Active,
            AutomationStatus::Archived,
        ] {
            assert_eq!(status_from_str(status_to_str(status)), Some(status));
        }
        assert_eq!(status_from_str("bogus"), None);
    }

    #[test]
    fn row_decodes_full_definition() {
        let automation = {
            let mut automation = Automation::new("Row test");
            automation.triggers.push(Trigger::new("ticket.created"));
            automation
        };

        let row = AutomationRow {
            id: automation.id.to_string(),
            name: automation.name.clone(),
            description: None,
            status: "draft".to_string(),
            triggers: serde_json::to_value(&automation.triggers).expect("triggers"),
            actions: serde_json::to_value(&automation.graph).expect("actions"),
            created_at: automation.created_at,
            updated_at: automation.updated_at,
        };

        let decoded = row.try_into_automation().expect("decode");
        assert_eq!(decoded.id, automation.id);
        assert_eq!(decoded.triggers.len(), 1);
    }

    #[test]
    fn row_rejects_bad_id() {
        let row = AutomationRow {
            id: "not-an-id".to_string(),
            name: "x".to_string(),
            description: None,
            status: "draft".to_string(),
            triggers: serde_json::json!([]),
            actions: serde_json::json!([]),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(row.try_into_automation().is_err());
    }
}
