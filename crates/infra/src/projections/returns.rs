//! Returns read models: products and batches, joined across two streams.
//!
//! This projection consumes both `returns.product` and `returns.batch`
//! envelopes. Product workflow status (`in_batch`, `sent_for_review`,
//! `verified`/`rejected` via review, release back to `pending`) is written
//! here, driven by batch events — a single batch-stream append cascades to
//! every member inside one `apply_envelope` call, and the denormalized
//! counters are recomputed in that same application, never incrementally.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use revamp_batches::{BatchEvent, BatchId, BatchStatus, ReviewDecision};
use revamp_core::{AggregateId, TenantId, UserId};
use revamp_events::EventEnvelope;
use revamp_products::{ProductDetails, ProductEvent, ProductId, ProductStatus, QualityRating};

use crate::read_model::TenantStore;

/// Queryable product read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductReadModel {
    pub product_id: ProductId,
    pub owner: UserId,
    pub details: ProductDetails,
    pub status: ProductStatus,
    pub batch_id: Option<BatchId>,
    pub quality_rating: Option<QualityRating>,
    pub notes: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<UserId>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ProductReadModel {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Eligible for batching: pending, unbatched, not deleted.
    pub fn is_batchable(&self) -> bool {
        self.status == ProductStatus::Pending && self.batch_id.is_none() && !self.is_deleted()
    }
}

/// Queryable batch read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReadModel {
    pub batch_id: BatchId,
    pub owner: UserId,
    pub name: String,
    pub description: String,
    pub notes: Option<String>,
    pub status: BatchStatus,
    pub products: Vec<ProductId>,
    pub total_products: u32,
    pub verified_products: u32,
    pub sent_for_review_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<UserId>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum ReturnsProjectionError {
    #[error("failed to deserialize returns event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Projection over the returns domain (products ⋈ batches).
#[derive(Debug)]
pub struct ReturnsProjection<P, B>
where
    P: TenantStore<ProductId, ProductReadModel>,
    B: TenantStore<BatchId, BatchReadModel>,
{
    products: P,
    batches: B,
    cursors: RwLock<HashMap<CursorKey, u64>>,
    /// Serializes event application: the same envelope can arrive from both
    /// the inline write path and the bus subscriber.
    apply_lock: Mutex<()>,
}

impl<P, B> ReturnsProjection<P, B>
where
    P: TenantStore<ProductId, ProductReadModel>,
    B: TenantStore<BatchId, BatchReadModel>,
{
    pub fn new(products: P, batches: B) -> Self {
        Self {
            products,
            batches,
            cursors: RwLock::new(HashMap::new()),
            apply_lock: Mutex::new(()),
        }
    }

    pub fn product(&self, tenant_id: TenantId, product_id: &ProductId) -> Option<ProductReadModel> {
        self.products.get(tenant_id, product_id)
    }

    pub fn products(&self, tenant_id: TenantId) -> Vec<ProductReadModel> {
        self.products.list(tenant_id)
    }

    pub fn batch(&self, tenant_id: TenantId, batch_id: &BatchId) -> Option<BatchReadModel> {
        self.batches.get(tenant_id, batch_id)
    }

    pub fn batches(&self, tenant_id: TenantId) -> Vec<BatchReadModel> {
        self.batches.list(tenant_id)
    }

    fn cursor(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> u64 {
        match self.cursors.read() {
            Ok(cursors) => *cursors
                .get(&CursorKey { tenant_id, aggregate_id })
                .unwrap_or(&0),
            Err(_) => 0,
        }
    }

    fn update_cursor(&self, tenant_id: TenantId, aggregate_id: AggregateId, sequence_number: u64) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert(CursorKey { tenant_id, aggregate_id }, sequence_number);
        }
    }

    fn clear_cursors(&self, tenant_id: TenantId) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.retain(|k, _| k.tenant_id != tenant_id);
        }
    }

    /// Apply one committed envelope (idempotent; duplicates are skipped).
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ReturnsProjectionError> {
        let aggregate_type = envelope.aggregate_type();
        if aggregate_type != "returns.product" && aggregate_type != "returns.batch" {
            return Ok(());
        }

        let _guard = self
            .apply_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let last = self.cursor(tenant_id, aggregate_id);
        if seq == 0 {
            return Err(ReturnsProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 && last != 0 {
            return Err(ReturnsProjectionError::NonMonotonicSequence { last, found: seq });
        }

        match aggregate_type {
            "returns.product" => self.apply_product_event(tenant_id, aggregate_id, envelope)?,
            _ => self.apply_batch_event(tenant_id, aggregate_id, envelope)?,
        }

        self.update_cursor(tenant_id, aggregate_id, seq);
        Ok(())
    }

    fn apply_product_event(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ReturnsProjectionError> {
        let ev: ProductEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ReturnsProjectionError::Deserialize(e.to_string()))?;

        let (event_tenant, product_id) = match &ev {
            ProductEvent::Submitted(e) => (e.tenant_id, e.product_id),
            ProductEvent::Updated(e) => (e.tenant_id, e.product_id),
            ProductEvent::Rated(e) => (e.tenant_id, e.product_id),
            ProductEvent::Deleted(e) => (e.tenant_id, e.product_id),
            ProductEvent::Restored(e) => (e.tenant_id, e.product_id),
        };
        check_scoping(tenant_id, aggregate_id, event_tenant, product_id.0)?;

        match ev {
            ProductEvent::Submitted(e) => {
                self.products.upsert(
                    tenant_id,
                    e.product_id,
                    ProductReadModel {
                        product_id: e.product_id,
                        owner: e.owner,
                        details: e.details,
                        status: ProductStatus::Pending,
                        batch_id: None,
                        quality_rating: None,
                        notes: None,
                        verified_at: None,
                        verified_by: None,
                        deleted_at: None,
                    },
                );
            }
            ProductEvent::Updated(e) => {
                if let Some(mut rm) = self.products.get(tenant_id, &e.product_id) {
                    rm.details = e.details;
                    self.products.upsert(tenant_id, e.product_id, rm);
                }
            }
            ProductEvent::Rated(e) => {
                if let Some(mut rm) = self.products.get(tenant_id, &e.product_id) {
                    rm.quality_rating = Some(e.rating);
                    rm.notes = e.notes;
                    rm.verified_at = Some(e.occurred_at);
                    rm.verified_by = Some(e.rated_by);
                    rm.status = ProductStatus::Verified;
                    let batch_id = rm.batch_id;
                    self.products.upsert(tenant_id, e.product_id, rm);

                    // The override path keeps the owning batch's derived
                    // count consistent.
                    if let Some(batch_id) = batch_id {
                        self.recompute_verified(tenant_id, batch_id);
                    }
                }
            }
            ProductEvent::Deleted(e) => {
                if let Some(mut rm) = self.products.get(tenant_id, &e.product_id) {
                    rm.deleted_at = Some(e.occurred_at);
                    self.products.upsert(tenant_id, e.product_id, rm);
                }
            }
            ProductEvent::Restored(e) => {
                if let Some(mut rm) = self.products.get(tenant_id, &e.product_id) {
                    rm.deleted_at = None;
                    self.products.upsert(tenant_id, e.product_id, rm);
                }
            }
        }
        Ok(())
    }

    fn apply_batch_event(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ReturnsProjectionError> {
        let ev: BatchEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ReturnsProjectionError::Deserialize(e.to_string()))?;

        let (event_tenant, batch_id) = match &ev {
            BatchEvent::Created(e) => (e.tenant_id, e.batch_id),
            BatchEvent::SentForReview(e) => (e.tenant_id, e.batch_id),
            BatchEvent::Reviewed(e) => (e.tenant_id, e.batch_id),
            BatchEvent::Deleted(e) => (e.tenant_id, e.batch_id),
        };
        check_scoping(tenant_id, aggregate_id, event_tenant, batch_id.0)?;

        match ev {
            BatchEvent::Created(e) => {
                // Attach eligible members; anything already batched or no
                // longer pending is skipped so membership stays exclusive.
                let mut attached = Vec::with_capacity(e.products.len());
                for product_id in &e.products {
                    if let Some(mut rm) = self.products.get(tenant_id, product_id) {
                        if rm.is_batchable() {
                            rm.batch_id = Some(e.batch_id);
                            rm.status = ProductStatus::InBatch;
                            self.products.upsert(tenant_id, *product_id, rm);
                            attached.push(*product_id);
                        }
                    }
                }

                let total = attached.len() as u32;
                self.batches.upsert(
                    tenant_id,
                    e.batch_id,
                    BatchReadModel {
                        batch_id: e.batch_id,
                        owner: e.owner,
                        name: e.name,
                        description: e.description,
                        notes: None,
                        status: BatchStatus::Draft,
                        products: attached,
                        total_products: total,
                        verified_products: 0,
                        sent_for_review_at: None,
                        reviewed_at: None,
                        reviewed_by: None,
                    },
                );
            }
            BatchEvent::SentForReview(e) => {
                if let Some(mut rm) = self.batches.get(tenant_id, &e.batch_id) {
                    rm.status = BatchStatus::SentForReview;
                    rm.sent_for_review_at = Some(e.occurred_at);
                    let members = rm.products.clone();
                    self.batches.upsert(tenant_id, e.batch_id, rm);

                    self.for_each_member(tenant_id, e.batch_id, &members, |product| {
                        product.status = ProductStatus::SentForReview;
                    });
                }
            }
            BatchEvent::Reviewed(e) => {
                if let Some(mut rm) = self.batches.get(tenant_id, &e.batch_id) {
                    rm.status = match e.decision {
                        ReviewDecision::Approved => BatchStatus::Approved,
                        ReviewDecision::Rejected => BatchStatus::Rejected,
                    };
                    rm.reviewed_at = Some(e.occurred_at);
                    rm.reviewed_by = Some(e.reviewed_by);
                    rm.notes = e.notes.clone();
                    let members = rm.products.clone();
                    self.batches.upsert(tenant_id, e.batch_id, rm);

                    let occurred_at = e.occurred_at;
                    let reviewer = e.reviewed_by;
                    self.for_each_member(tenant_id, e.batch_id, &members, |product| {
                        match e.decision {
                            ReviewDecision::Approved => {
                                product.status = ProductStatus::Verified;
                                if product.verified_at.is_none() {
                                    product.verified_at = Some(occurred_at);
                                    product.verified_by = Some(reviewer);
                                }
                            }
                            ReviewDecision::Rejected => {
                                product.status = ProductStatus::Rejected;
                            }
                        }
                    });

                    self.recompute_verified(tenant_id, e.batch_id);
                }
            }
            BatchEvent::Deleted(e) => {
                if let Some(rm) = self.batches.get(tenant_id, &e.batch_id) {
                    self.for_each_member(tenant_id, e.batch_id, &rm.products, |product| {
                        product.batch_id = None;
                        product.status = ProductStatus::Pending;
                    });
                    self.batches.remove(tenant_id, &e.batch_id);
                }
            }
        }
        Ok(())
    }

    /// Mutate every product still referencing `batch_id`.
    fn for_each_member<F>(
        &self,
        tenant_id: TenantId,
        batch_id: BatchId,
        members: &[ProductId],
        mut mutate: F,
    ) where
        F: FnMut(&mut ProductReadModel),
    {
        for product_id in members {
            if let Some(mut rm) = self.products.get(tenant_id, product_id) {
                if rm.batch_id == Some(batch_id) {
                    mutate(&mut rm);
                    self.products.upsert(tenant_id, *product_id, rm);
                }
            }
        }
    }

    /// Recompute `verified_products` from current member statuses, within
    /// the same event application that changed them.
    fn recompute_verified(&self, tenant_id: TenantId, batch_id: BatchId) {
        if let Some(mut rm) = self.batches.get(tenant_id, &batch_id) {
            rm.verified_products = rm
                .products
                .iter()
                .filter_map(|p| self.products.get(tenant_id, p))
                .filter(|p| p.status == ProductStatus::Verified)
                .count() as u32;
            rm.total_products = rm.products.len() as u32;
            self.batches.upsert(tenant_id, batch_id, rm);
        }
    }

    /// Rebuild the read models from a full envelope set.
    ///
    /// Envelopes are replayed in UUIDv7 `event_id` order, which interleaves
    /// product and batch streams in commit order so cross-stream references
    /// resolve (a batch only attaches products that were submitted first).
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ReturnsProjectionError> {
        let mut envs: Vec<_> = envelopes.into_iter().collect();

        {
            let mut tenants = envs.iter().map(|e| e.tenant_id()).collect::<Vec<_>>();
            tenants.sort_by_key(|t| *t.as_uuid().as_bytes());
            tenants.dedup();
            for t in tenants {
                self.products.clear_tenant(t);
                self.batches.clear_tenant(t);
                self.clear_cursors(t);
            }
        }

        envs.sort_by_key(|e| *e.event_id().as_bytes());

        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}

fn check_scoping(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    event_tenant: TenantId,
    event_aggregate: AggregateId,
) -> Result<(), ReturnsProjectionError> {
    if event_tenant != tenant_id {
        return Err(ReturnsProjectionError::TenantIsolation(
            "event tenant_id does not match envelope tenant_id".to_string(),
        ));
    }
    if event_aggregate != aggregate_id {
        return Err(ReturnsProjectionError::TenantIsolation(
            "event aggregate id does not match envelope aggregate_id".to_string(),
        ));
    }
    Ok(())
}
