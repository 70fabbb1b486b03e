//! Core domain types and utilities for the amber-relay automation engine.
//!
//! This crate provides the foundational id types and error handling shared
//! by the automation, segment, email, and scheduler crates.

pub mod error;
pub mod id;
pub mod json;

pub use error::Result;
pub use id::{AutomationId, ExecutionId, SegmentId, TriggerId};
