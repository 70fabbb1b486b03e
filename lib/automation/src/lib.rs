//! Automation engine for the amber-relay platform.
//!
//! This crate provides the execution core described in the platform
//! overview:
//!
//! - **Trigger Matcher**: matches inbound domain events to automation
//!   definitions by event kind, with segment gates and re-enrollment rules
//! - **Execution Tracker**: one persisted record per enrollment, with the
//!   Active → Waiting/Error/Missing → Complete lifecycle
//! - **Action Interpreter**: walks the linked action graph (branches,
//!   waits, side-effecting dispatches) until a terminal state
//! - **Broker integration**: NATS JetStream event intake and
//!   request/reply dispatch to peer services

pub mod action;
pub mod broker;
pub mod definition;
pub mod envelope;
pub mod error;
pub mod execution;
pub mod graph;
pub mod interpreter;
pub mod matcher;
pub mod store;
pub mod trigger;

pub use action::{Action, ActionId, ActionKind, WaitDelay, WaitUnit};
pub use definition::{Automation, AutomationStatus, AutomationSummary};
pub use envelope::Envelope;
pub use error::{TransitionError, ValidationError};
pub use execution::{ActionLogEntry, Execution, ExecutionStatus};
pub use graph::ActionGraph;
pub use interpreter::{
    ActionDispatcher, DispatchError, Interpreter, RecordingDispatcher, ServiceRequest,
};
pub use matcher::{DomainEvent, Enrollment, TriggerMatcher};
pub use store::{
    AutomationStore, ExecutionStore, InMemoryAutomationStore, InMemoryExecutionStore, StoreError,
};
pub use trigger::{Reenrollment, Trigger};
