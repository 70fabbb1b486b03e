//! Saved segments for the amber-relay automation engine.
//!
//! A segment is a saved, dynamically evaluated record filter. Automations
//! use segments in two places:
//!
//! - **Trigger gates**: only records inside the segment enroll
//! - **Branch conditions**: yes/no routing inside the action graph
//!
//! Segments are evaluated in-process against a single target document.

pub mod condition;
pub mod error;
pub mod matcher;
pub mod segment;

pub use condition::{Combinator, Condition, ConditionGroup, ConditionNode, Operator};
pub use error::SegmentError;
pub use matcher::{InMemorySegmentMatcher, SegmentMatcher};
pub use segment::Segment;
