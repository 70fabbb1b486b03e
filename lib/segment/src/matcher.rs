//! Membership checks behind a storage-agnostic trait.
//!
//! The trigger matcher and the action interpreter only ever ask one
//! question of a segment: is this document a member? The trait keeps both
//! testable without a database.

use crate::error::SegmentError;
use crate::segment::Segment;
use amber_relay_core::SegmentId;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Trait for segment membership checks.
#[async_trait]
pub trait SegmentMatcher: Send + Sync {
    /// Returns true if the target document is a member of the segment.
    ///
    /// # Errors
    ///
    /// Returns an error if the segment does not exist or cannot be loaded.
    async fn is_member(
        &self,
        segment_id: SegmentId,
        target: &JsonValue,
    ) -> Result<bool, SegmentError>;
}

/// An in-memory matcher over a fixed set of segments.
///
/// Used in tests and anywhere the full segment store is already loaded.
#[derive(Default)]
pub struct InMemorySegmentMatcher {
    segments: Arc<Mutex<HashMap<SegmentId, Segment>>>,
}

impl InMemorySegmentMatcher {
    /// Creates an empty matcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a segment.
    pub fn insert(&self, segment: Segment) {
        self.segments
            .lock()
            .expect("segment map lock poisoned")
            .insert(segment.id, segment);
    }
}

#[async_trait]
impl SegmentMatcher for InMemorySegmentMatcher {
    async fn is_member(
        &self,
        segment_id: SegmentId,
        target: &JsonValue,
    ) -> Result<bool, SegmentError> {
        let segments = self
            .segments
            .lock()
            .expect("segment map lock poisoned");
        let segment = segments
            .get(&segment_id)
            .ok_or(SegmentError::NotFound { segment_id })?;
        Ok(segment.is_member(target))
    }
}
