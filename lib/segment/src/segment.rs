//! Segment definitions.

use crate::condition::ConditionGroup;
use amber_relay_core::SegmentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A saved, dynamically evaluated record filter.
///
/// Segments are authored once and referenced by id from automation
/// triggers and branch actions. Membership is always evaluated against
/// the live document, never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Unique identifier for this segment.
    pub id: SegmentId,
    /// Human-readable name.
    pub name: String,
    /// The record kind this segment filters (e.g. `ticket`, `customer`).
    pub record_kind: String,
    /// The filter itself.
    pub conditions: ConditionGroup,
    /// When this segment was created.
    pub created_at: DateTime<Utc>,
    /// When this segment was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Segment {
    /// Creates a new segment.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        record_kind: impl Into<String>,
        conditions: ConditionGroup,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: SegmentId::new(),
            name: name.into(),
            record_kind: record_kind.into(),
            conditions,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the target document is a member of this segment.
    #[must_use]
    pub fn is_member(&self, target: &JsonValue) -> bool {
        self.conditions.evaluate(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Condition, ConditionNode, Operator};
    use serde_json::json;

    #[test]
    fn segment_membership() {
        let segment = Segment::new(
            "Open tickets",
            "ticket",
            ConditionGroup::all(vec![ConditionNode::Property(Condition::new(
                "status",
                Operator::Equals,
                json!("open"),
            ))]),
        );

        assert!(segment.is_member(&json!({"status": "open"})));
        assert!(!segment.is_member(&json!({"status": "closed"})));
    }

    #[test]
    fn segment_serde_roundtrip() {
        let segment = Segment::new("Pro customers", "customer", ConditionGroup::all(vec![]));
        let encoded = serde_json::to_string(&segment).expect("serialize");
        let parsed: Segment = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(segment.id, parsed.id);
        assert_eq!(segment.record_kind, parsed.record_kind);
    }
}
