//! Storage seams for definitions and executions.
//!
//! The matcher, interpreter, and wait sweeper only touch storage through
//! these traits, so the engine is testable without a database. The server
//! binary implements them over PostgreSQL.

use crate::definition::Automation;
use crate::execution::{Execution, ExecutionStatus};
use amber_relay_core::{AutomationId, ExecutionId, TriggerId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Errors from the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store failed.
    StorageFailed { message: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StorageFailed { message } => write!(f, "storage failed: {message}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Read access to automation definitions.
#[async_trait]
pub trait AutomationStore: Send + Sync {
    /// Lists all active automations.
    async fn list_active(&self) -> Result<Vec<Automation>, StoreError>;

    /// Finds an automation by id.
    async fn find(&self, id: AutomationId) -> Result<Option<Automation>, StoreError>;
}

/// Persistence for executions.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Inserts or updates an execution.
    async fn save(&self, execution: &Execution) -> Result<(), StoreError>;

    /// Finds an execution by id.
    async fn find(&self, id: ExecutionId) -> Result<Option<Execution>, StoreError>;

    /// Finds the most recent execution for an enrollment triple.
    async fn find_latest(
        &self,
        automation_id: AutomationId,
        trigger_id: TriggerId,
        target_id: &str,
    ) -> Result<Option<Execution>, StoreError>;

    /// Lists waiting executions whose wait has elapsed at `now`.
    async fn list_due_waits(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Execution>, StoreError>;
}

/// In-memory automation store for tests.
#[derive(Default)]
pub struct InMemoryAutomationStore {
    automations: Arc<Mutex<HashMap<AutomationId, Automation>>>,
}

impl InMemoryAutomationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an automation.
    pub fn insert(&self, automation: Automation) {
        self.automations
            .lock()
            .expect("automation store lock poisoned")
            .insert(automation.id, automation);
    }
}

#[async_trait]
impl AutomationStore for InMemoryAutomationStore {
    async fn list_active(&self) -> Result<Vec<Automation>, StoreError> {
        Ok(self
            .automations
            .lock()
            .expect("automation store lock poisoned")
            .values()
            .filter(|a| a.is_active())
            .cloned()
            .collect())
    }

    async fn find(&self, id: AutomationId) -> Result<Option<Automation>, StoreError> {
        Ok(self
            .automations
            .lock()
            .expect("automation store lock poisoned")
            .get(&id)
            .cloned())
    }
}

/// In-memory execution store for tests.
#[derive(Default)]
pub struct InMemoryExecutionStore {
    executions: Arc<Mutex<Vec<Execution>>>,
}

impl InMemoryExecutionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all stored executions.
    #[must_use]
    pub fn all(&self) -> Vec<Execution> {
        self.executions
            .lock()
            .expect("execution store lock poisoned")
            .clone()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn save(&self, execution: &Execution) -> Result<(), StoreError> {
        let mut executions = self
            .executions
            .lock()
            .expect("execution store lock poisoned");
        if let Some(existing) = executions.iter_mut().find(|e| e.id == execution.id) {
            *existing = execution.clone();
        } else {
            executions.push(execution.clone());
        }
        Ok(())
    }

    async fn find(&self, id: ExecutionId) -> Result<Option<Execution>, StoreError> {
        Ok(self
            .executions
            .lock()
            .expect("execution store lock poisoned")
            .iter()
            .find(|e| e.id == id)
            .cloned())
    }

    async fn find_latest(
        &self,
        automation_id: AutomationId,
        trigger_id: TriggerId,
        target_id: &str,
    ) -> Result<Option<Execution>, StoreError> {
        Ok(self
            .executions
            .lock()
            .expect("execution store lock poisoned")
            .iter()
            .filter(|e| {
                e.automation_id == automation_id
                    && e.trigger_id == trigger_id
                    && e.target_id == target_id
            })
            .max_by_key(|e| e.created_at)
            .cloned())
    }

    async fn list_due_waits(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Execution>, StoreError> {
        Ok(self
            .executions
            .lock()
            .expect("execution store lock poisoned")
            .iter()
            .filter(|e| e.status == ExecutionStatus::Waiting && e.wait_elapsed(now))
            .take(limit)
            .cloned()
            .collect())
    }
}
