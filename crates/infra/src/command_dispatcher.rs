//! Command execution pipeline (application-level orchestration).
//!
//! The `CommandDispatcher` implements the full lifecycle for event-sourced
//! aggregates:
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store (tenant-scoped)
//!   ↓
//! 2. Rehydrate aggregate (apply historical events to rebuild state)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Persist events to store (append-only, optimistic concurrency check)
//!   ↓
//! 5. Publish events to bus (for projections, handlers, etc.)
//! ```
//!
//! One dispatch touches exactly one stream; the append in step 4 is the
//! atomic unit of every workflow operation. The expected version captured in
//! step 1 makes concurrent writers race explicitly: the loser gets
//! [`DispatchError::Concurrency`] instead of silently overwriting.
//!
//! This module contains no IO itself; it composes the `EventStore` and
//! `EventBus` traits, which keeps it testable with in-memory implementations.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use revamp_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, TenantId};
use revamp_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug)]
pub enum DispatchError {
    /// Optimistic concurrency failure (e.g. stale aggregate version).
    Concurrency(String),
    /// Tenant isolation violation (cross-tenant or cross-aggregate stream mixing).
    TenantIsolation(String),
    /// Domain validation failure (deterministic).
    Validation(String),
    /// Illegal state transition (deterministic).
    InvalidTransition(String),
    /// Domain invariant failure (deterministic).
    InvariantViolation(String),
    /// Domain authorization failure.
    Unauthorized,
    /// Domain-level not found.
    NotFound,
    /// Failed to deserialize historical event payloads into the aggregate event type.
    Deserialize(String),
    /// Persisting to the event store failed.
    Store(EventStoreError),
    /// Publication failed after a successful append (at-least-once; retry may duplicate).
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match &value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg.clone()),
            EventStoreError::TenantIsolation(msg) => DispatchError::TenantIsolation(msg.clone()),
            _ => DispatchError::Store(value),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvalidTransition(msg) => DispatchError::InvalidTransition(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Concurrency(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
        }
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Generic over the store and bus so tests can run fully in memory and
/// production can swap in Postgres without touching domain code.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch a command through the full pipeline.
    ///
    /// The `make_aggregate` closure produces a fresh instance for
    /// rehydration (e.g. `Batch::empty(..)`), keeping the dispatcher
    /// agnostic of aggregate construction.
    ///
    /// Returns the committed `StoredEvent`s (with assigned sequence numbers)
    /// on success. If publication fails after a successful append the events
    /// are already durable; the caller sees [`DispatchError::Publish`] and
    /// may republish (at-least-once semantics, consumers are idempotent).
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: revamp_events::Event + Serialize + DeserializeOwned,
    {
        // 1) Load history (tenant-scoped)
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        // 2) Rehydrate aggregate
        let mut aggregate = make_aggregate(tenant_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        // 3) Decide events (no mutation)
        let decided = aggregate.handle(&command).map_err(DispatchError::from)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        // 4) Persist (append-only, optimistic)
        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    tenant_id,
                    aggregate_id,
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        // 5) Publish committed events (after append)
        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // Enforce tenant isolation even if a buggy backend returns cross-tenant data.
    // Also ensure the stream is monotonically increasing by sequence number.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.tenant_id != tenant_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong tenant_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number == 0 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                "stored event has sequence_number=0".to_string(),
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    // Ensure deterministic ordering.
    let mut sorted = history.to_vec();
    sorted.sort_by_key(|e| e.sequence_number);

    for stored in sorted {
        let ev: A::Event = serde_json::from_value(stored.payload)
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;

    use revamp_batches::{Batch, BatchCommand, BatchId, CreateBatch, SendForReview};
    use revamp_events::InMemoryEventBus;
    use revamp_products::ProductId;

    use crate::event_store::InMemoryEventStore;

    type TestDispatcher =
        CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    fn dispatcher() -> TestDispatcher {
        CommandDispatcher::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
        )
    }

    fn create_cmd(tenant_id: TenantId, batch_id: BatchId) -> BatchCommand {
        BatchCommand::Create(CreateBatch {
            tenant_id,
            batch_id,
            owner: revamp_core::UserId::new(),
            name: "batch".to_string(),
            description: String::new(),
            products: vec![ProductId::new(AggregateId::new())],
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn dispatch_persists_and_rehydrates() {
        let d = dispatcher();
        let tenant_id = TenantId::new();
        let agg = AggregateId::new();
        let batch_id = BatchId::new(agg);

        let committed = d
            .dispatch::<Batch>(tenant_id, agg, "returns.batch", create_cmd(tenant_id, batch_id), |_, id| {
                Batch::empty(BatchId::new(id))
            })
            .unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].sequence_number, 1);

        // Second command rehydrates from the stream and sees the created batch.
        let committed = d
            .dispatch::<Batch>(
                tenant_id,
                agg,
                "returns.batch",
                BatchCommand::SendForReview(SendForReview {
                    tenant_id,
                    batch_id,
                    occurred_at: Utc::now(),
                }),
                |_, id| Batch::empty(BatchId::new(id)),
            )
            .unwrap();
        assert_eq!(committed[0].sequence_number, 2);
        assert_eq!(committed[0].event_type, "returns.batch.sent_for_review");
    }

    #[test]
    fn domain_rejection_leaves_stream_untouched() {
        let d = dispatcher();
        let tenant_id = TenantId::new();
        let agg = AggregateId::new();
        let batch_id = BatchId::new(agg);

        // Decide on a stream that has no batch: not found, nothing appended.
        let err = d
            .dispatch::<Batch>(
                tenant_id,
                agg,
                "returns.batch",
                BatchCommand::SendForReview(SendForReview {
                    tenant_id,
                    batch_id,
                    occurred_at: Utc::now(),
                }),
                |_, id| Batch::empty(BatchId::new(id)),
            )
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotFound));

        let (store, _bus) = d.into_parts();
        assert!(store.load_stream(tenant_id, agg).unwrap().is_empty());
    }

    #[test]
    fn subscribers_receive_committed_envelopes() {
        let store = Arc::new(InMemoryEventStore::new());
        let bus: Arc<InMemoryEventBus<EventEnvelope<JsonValue>>> = Arc::new(InMemoryEventBus::new());
        let sub = bus.subscribe();
        let d = CommandDispatcher::new(store, bus);

        let tenant_id = TenantId::new();
        let agg = AggregateId::new();
        d.dispatch::<Batch>(tenant_id, agg, "returns.batch", create_cmd(tenant_id, BatchId::new(agg)), |_, id| {
            Batch::empty(BatchId::new(id))
        })
        .unwrap();

        let env = sub.try_recv().unwrap();
        assert_eq!(env.aggregate_type(), "returns.batch");
        assert_eq!(env.sequence_number(), 1);
    }
}
