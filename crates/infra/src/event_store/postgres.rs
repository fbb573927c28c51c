//! Postgres-backed event store.
//!
//! Events live in a single append-only `events` table. Mill isolation is a
//! `WHERE mill_id = $1` on every query; optimistic concurrency is a version
//! check inside the append transaction, backed by the unique constraint on
//! `(mill_id, aggregate_id, sequence_number)` for concurrent writers that
//! race past the check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use millbook_core::{AggregateId, ExpectedVersion, MillId};

use super::store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// Postgres-backed append-only event store.
///
/// All operations go through the SQLx connection pool; appends run in a
/// transaction so a batch is persisted atomically or not at all.
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: Arc<PgPool>,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the events table and its indexes if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), EventStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                event_id        UUID PRIMARY KEY,
                mill_id         UUID NOT NULL,
                aggregate_id    UUID NOT NULL,
                aggregate_type  TEXT NOT NULL,
                sequence_number BIGINT NOT NULL CHECK (sequence_number > 0),
                event_type      TEXT NOT NULL,
                event_version   INT NOT NULL,
                occurred_at     TIMESTAMPTZ NOT NULL,
                payload         JSONB NOT NULL,
                created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
                UNIQUE (mill_id, aggregate_id, sequence_number)
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_events_stream ON events (mill_id, aggregate_id)",
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;

        Ok(())
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[instrument(skip(self, events), fields(event_count = events.len()), err)]
    async fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }

        let mill_id = events[0].mill_id;
        let aggregate_id = events[0].aggregate_id;
        let aggregate_type = events[0].aggregate_type.clone();

        for (idx, e) in events.iter().enumerate() {
            if e.mill_id != mill_id {
                return Err(EventStoreError::MillIsolation(format!(
                    "batch contains multiple mill_ids (index {idx})"
                )));
            }
            if e.aggregate_id != aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains multiple aggregate_ids (index {idx})"
                )));
            }
            if e.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "batch contains multiple aggregate_types (index {idx})"
                )));
            }
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        let (current, existing_type) = stream_head(&mut tx, mill_id, aggregate_id).await?;

        if let Some(existing) = existing_type {
            if existing != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{existing}', attempted append with '{aggregate_type}'"
                )));
            }
        }

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        let mut next = current + 1;
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            sqlx::query(
                r#"
                INSERT INTO events (
                    event_id, mill_id, aggregate_id, aggregate_type,
                    sequence_number, event_type, event_version, occurred_at, payload
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(e.event_id)
            .bind(mill_id.as_uuid())
            .bind(aggregate_id.as_uuid())
            .bind(&e.aggregate_type)
            .bind(next as i64)
            .bind(&e.event_type)
            .bind(e.event_version as i32)
            .bind(e.occurred_at)
            .bind(&e.payload)
            .execute(&mut *tx)
            .await
            .map_err(|err| map_sqlx_error("append", err))?;

            committed.push(StoredEvent {
                event_id: e.event_id,
                mill_id: e.mill_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number: next,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            });
            next += 1;
        }

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(committed)
    }

    #[instrument(skip(self), err)]
    async fn load_stream(
        &self,
        mill_id: MillId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, mill_id, aggregate_id, aggregate_type,
                   sequence_number, event_type, event_version, occurred_at, payload
            FROM events
            WHERE mill_id = $1 AND aggregate_id = $2
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(mill_id.as_uuid())
        .bind(aggregate_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_stream", e))?;

        rows.iter().map(stored_event_from_row).collect()
    }
}

async fn stream_head(
    tx: &mut Transaction<'_, Postgres>,
    mill_id: MillId,
    aggregate_id: AggregateId,
) -> Result<(u64, Option<String>), EventStoreError> {
    let row = sqlx::query(
        r#"
        SELECT sequence_number, aggregate_type
        FROM events
        WHERE mill_id = $1 AND aggregate_id = $2
        ORDER BY sequence_number DESC
        LIMIT 1
        "#,
    )
    .bind(mill_id.as_uuid())
    .bind(aggregate_id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("stream_head", e))?;

    match row {
        None => Ok((0, None)),
        Some(row) => {
            let seq: i64 = row
                .try_get("sequence_number")
                .map_err(|e| EventStoreError::InvalidAppend(e.to_string()))?;
            let aggregate_type: String = row
                .try_get("aggregate_type")
                .map_err(|e| EventStoreError::InvalidAppend(e.to_string()))?;
            Ok((seq as u64, Some(aggregate_type)))
        }
    }
}

fn stored_event_from_row(row: &sqlx::postgres::PgRow) -> Result<StoredEvent, EventStoreError> {
    let invalid = |e: sqlx::Error| EventStoreError::InvalidAppend(format!("bad event row: {e}"));

    let event_id: Uuid = row.try_get("event_id").map_err(invalid)?;
    let mill_id: Uuid = row.try_get("mill_id").map_err(invalid)?;
    let aggregate_id: Uuid = row.try_get("aggregate_id").map_err(invalid)?;
    let aggregate_type: String = row.try_get("aggregate_type").map_err(invalid)?;
    let sequence_number: i64 = row.try_get("sequence_number").map_err(invalid)?;
    let event_type: String = row.try_get("event_type").map_err(invalid)?;
    let event_version: i32 = row.try_get("event_version").map_err(invalid)?;
    let occurred_at: DateTime<Utc> = row.try_get("occurred_at").map_err(invalid)?;
    let payload: serde_json::Value = row.try_get("payload").map_err(invalid)?;

    Ok(StoredEvent {
        event_id,
        mill_id: MillId::from_uuid(mill_id),
        aggregate_id: AggregateId::from_uuid(aggregate_id),
        aggregate_type,
        sequence_number: sequence_number as u64,
        event_type,
        event_version: event_version as u32,
        occurred_at,
        payload,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EventStoreError {
    if let sqlx::Error::Database(db) = &err {
        // 23505 unique_violation: a concurrent writer claimed the sequence number.
        if db.code().as_deref() == Some("23505") {
            return EventStoreError::Concurrency(format!("{operation}: {db}"));
        }
    }
    EventStoreError::InvalidAppend(format!("{operation}: {err}"))
}
