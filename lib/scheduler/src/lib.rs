//! Wait continuation for the amber-relay automation engine.
//!
//! Wait actions suspend executions with a persisted deadline. This crate
//! provides the sweep that finds elapsed waits and hands the executions
//! back to the interpreter, so continuation survives engine restarts.

pub mod error;
pub mod sweeper;

pub use error::SweepError;
pub use sweeper::{SweepReport, WaitSweeper};
