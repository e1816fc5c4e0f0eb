//! Postgres-backed event store implementation.
//!
//! Persists streams in an append-only `events` table with tenant isolation,
//! optimistic concurrency and append atomicity enforced at the database
//! level. Concurrent appends race on the unique constraint over
//! `(tenant_id, aggregate_id, sequence_number)` and surface as
//! [`EventStoreError::Concurrency`].

use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::instrument;

use revamp_core::{AggregateId, ExpectedVersion, TenantId};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// Postgres-backed append-only event store.
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

    /// Create the `events` table and its constraints if absent.
    pub async fn ensure_schema(&self) -> Result<(), EventStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                event_id        UUID PRIMARY KEY,
                tenant_id       UUID NOT NULL,
                aggregate_id    UUID NOT NULL,
                aggregate_type  TEXT NOT NULL,
                sequence_number BIGINT NOT NULL CHECK (sequence_number > 0),
                event_type      TEXT NOT NULL,
                event_version   INT NOT NULL,
                occurred_at     TIMESTAMPTZ NOT NULL,
                payload         JSONB NOT NULL,
                created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
                UNIQUE (tenant_id, aggregate_id, sequence_number)
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, aggregate_id = %aggregate_id))]
    pub async fn load_stream_async(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, tenant_id, aggregate_id, aggregate_type,
                   sequence_number, event_type, event_version, occurred_at, payload
            FROM events
            WHERE tenant_id = $1 AND aggregate_id = $2
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(aggregate_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_stream", e))?;

        let mut stored = Vec::with_capacity(rows.len());
        for row in rows {
            stored.push(row_to_stored_event(&row)?);
        }
        Ok(stored)
    }

    #[instrument(skip(self, events), fields(tenant_id = %tenant_id, aggregate_id = %aggregate_id))]
    pub async fn append_async(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }

        for (idx, e) in events.iter().enumerate() {
            if e.tenant_id != tenant_id {
                return Err(EventStoreError::TenantIsolation(format!(
                    "batch contains multiple tenant_ids (index {idx})"
                )));
            }
            if e.aggregate_id != aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains multiple aggregate_ids (index {idx})"
                )));
            }
        }
        let aggregate_type = events[0].aggregate_type.clone();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let row = sqlx::query(
            r#"
            SELECT COALESCE(MAX(sequence_number), 0) AS current_version,
                   MAX(aggregate_type) AS aggregate_type
            FROM events
            WHERE tenant_id = $1 AND aggregate_id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(aggregate_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("check_stream_version", e))?;

        let current_version: i64 = row
            .try_get("current_version")
            .map_err(|e| map_sqlx_error("check_stream_version", e))?;
        let current_version = current_version as u64;
        let existing_type: Option<String> = row
            .try_get("aggregate_type")
            .map_err(|e| map_sqlx_error("check_stream_version", e))?;

        if let Some(existing) = existing_type {
            if existing != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{existing}', attempted append with '{aggregate_type}'"
                )));
            }
        }

        if !expected_version.matches(current_version) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current_version}"
            )));
        }

        let mut committed = Vec::with_capacity(events.len());
        let mut next = current_version + 1;
        for event in events {
            sqlx::query(
                r#"
                INSERT INTO events (
                    event_id, tenant_id, aggregate_id, aggregate_type,
                    sequence_number, event_type, event_version, occurred_at, payload
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(event.event_id)
            .bind(tenant_id.as_uuid())
            .bind(aggregate_id.as_uuid())
            .bind(&aggregate_type)
            .bind(next as i64)
            .bind(&event.event_type)
            .bind(event.event_version as i32)
            .bind(event.occurred_at)
            .bind(&event.payload)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    EventStoreError::Concurrency(format!(
                        "concurrent append detected: sequence_number {next} already exists"
                    ))
                } else {
                    map_sqlx_error("insert_event", e)
                }
            })?;

            committed.push(StoredEvent {
                event_id: event.event_id,
                tenant_id: event.tenant_id,
                aggregate_id: event.aggregate_id,
                aggregate_type: event.aggregate_type,
                sequence_number: next,
                event_type: event.event_type,
                event_version: event.event_version,
                occurred_at: event.occurred_at,
                payload: event.payload,
            });
            next += 1;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(committed)
    }
}

// The EventStore trait is synchronous; bridge into async via the ambient
// tokio runtime (present in the API process). `block_in_place` keeps the
// bridge legal on multi-thread runtime workers.
impl EventStore for PostgresEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let handle = runtime_handle()?;
        if events.is_empty() {
            return Ok(vec![]);
        }
        let tenant_id = events[0].tenant_id;
        let aggregate_id = events[0].aggregate_id;
        tokio::task::block_in_place(|| {
            handle.block_on(self.append_async(tenant_id, aggregate_id, events, expected_version))
        })
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let handle = runtime_handle()?;
        tokio::task::block_in_place(|| {
            handle.block_on(self.load_stream_async(tenant_id, aggregate_id))
        })
    }
}

fn runtime_handle() -> Result<tokio::runtime::Handle, EventStoreError> {
    tokio::runtime::Handle::try_current().map_err(|_| {
        EventStoreError::InvalidAppend(
            "PostgresEventStore requires an ambient tokio runtime".to_string(),
        )
    })
}

fn row_to_stored_event(row: &sqlx::postgres::PgRow) -> Result<StoredEvent, EventStoreError> {
    let read = |field: &str, e: sqlx::Error| map_sqlx_error(field, e);

    let sequence_number: i64 = row
        .try_get("sequence_number")
        .map_err(|e| read("sequence_number", e))?;
    if sequence_number <= 0 {
        return Err(EventStoreError::InvalidAppend(format!(
            "stored event has non-positive sequence_number {sequence_number}"
        )));
    }
    let event_version: i32 = row
        .try_get("event_version")
        .map_err(|e| read("event_version", e))?;

    Ok(StoredEvent {
        event_id: row.try_get("event_id").map_err(|e| read("event_id", e))?,
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id").map_err(|e| read("tenant_id", e))?),
        aggregate_id: AggregateId::from_uuid(
            row.try_get("aggregate_id").map_err(|e| read("aggregate_id", e))?,
        ),
        aggregate_type: row
            .try_get("aggregate_type")
            .map_err(|e| read("aggregate_type", e))?,
        sequence_number: sequence_number as u64,
        event_type: row.try_get("event_type").map_err(|e| read("event_type", e))?,
        event_version: event_version as u32,
        occurred_at: row.try_get("occurred_at").map_err(|e| read("occurred_at", e))?,
        payload: row.try_get("payload").map_err(|e| read("payload", e))?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505")
    )
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EventStoreError {
    EventStoreError::InvalidAppend(format!("{operation}: {err}"))
}
