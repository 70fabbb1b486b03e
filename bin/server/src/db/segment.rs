//! Repository for segments, doubling as the engine's segment matcher.

use crate::db::decode_error;
use amber_relay_core::SegmentId;
use amber_relay_segment::{ConditionGroup, Segment, SegmentError, SegmentMatcher};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

/// Row type for segment queries.
#[derive(FromRow)]
struct SegmentRow {
    id: String,
    name: String,
    record_kind: String,
    conditions: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SegmentRow {
    fn try_into_segment(self) -> Result<Segment, sqlx::Error> {
        let id =
            SegmentId::from_str(&self.id).map_err(|e| decode_error("segment id", &self.id, e))?;
        let conditions: ConditionGroup = serde_json::from_value(self.conditions)
            .map_err(|e| decode_error("segment conditions", &self.id, e))?;

        Ok(Segment {
            id,
            name: self.name,
            record_kind: self.record_kind,
            conditions,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Repository for segments.
pub struct SegmentRepository {
    pool: PgPool,
}

impl SegmentRepository {
    /// Creates a new repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a new segment.
    pub async fn create(&self, segment: &Segment) -> Result<(), sqlx::Error> {
        let conditions = serde_json::to_value(&segment.conditions).unwrap_or_default();

        sqlx::query(
            r#"
            INSERT INTO segments (id, name, record_kind, conditions, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(segment.id.to_string())
        .bind(&segment.name)
        .bind(&segment.record_kind)
        .bind(&conditions)
        .bind(segment.created_at)
        .bind(segment.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Finds a segment by id.
    pub async fn find_by_id(&self, id: SegmentId) -> Result<Option<Segment>, sqlx::Error> {
        let row: Option<SegmentRow> = sqlx::query_as(
            r#"
            SELECT id, name, record_kind, conditions, created_at, updated_at
            FROM segments
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(r.try_into_segment()?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SegmentMatcher for SegmentRepository {
    async fn is_member(
        &self,
        segment_id: SegmentId,
        target: &JsonValue,
    ) -> Result<bool, SegmentError> {
        let segment = self
            .find_by_id(segment_id)
            .await
            .map_err(|e| SegmentError::StorageFailed {
                message: e.to_string(),
            })?
            .ok_or(SegmentError::NotFound { segment_id })?;

        Ok(segment.is_member(target))
    }
}
