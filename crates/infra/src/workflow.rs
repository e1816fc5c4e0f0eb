//! The review workflow engine.
//!
//! Single entry point for every workflow mutation. Each operation:
//!
//! 1. runs the access policy for the explicit [`Actor`] (never ambient state),
//! 2. validates cross-aggregate eligibility against the returns read model,
//! 3. dispatches exactly one command to exactly one aggregate stream.
//!
//! The stream append in step 3 is the atomic unit: either the whole
//! transition (batch status, timestamps and, by projection, every member
//! product's derived status) commits, or nothing does. Concurrent writers
//! race on the expected stream version; the loser surfaces
//! [`WorkflowError::ConcurrentModification`] instead of silently winning.
//!
//! Committed events are applied to the engine's own read model inline (so
//! the engine reads its writes) and published on the bus for any other
//! consumer; the projection cursor makes the double application idempotent.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;
use thiserror::Error;

use revamp_auth::policy::{self, Action, Actor};
use revamp_auth::AuthzError;
use revamp_batches::{
    Batch, BatchCommand, BatchId, CreateBatch, DecideReview, DeleteBatch, ReviewDecision,
    SendForReview,
};
use revamp_core::{AggregateId, TenantId};
use revamp_events::{EventBus, EventEnvelope};
use revamp_products::{
    DeleteProduct, Product, ProductCommand, ProductDetails, ProductId, ProductStatus,
    QualityRating, RateProduct, RestoreProduct, SubmitProduct, UpdateProduct,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, StoredEvent};
use crate::projections::{BatchReadModel, ProductReadModel, ReturnsProjection};
use crate::read_model::TenantStore;

/// Workflow operation failure.
///
/// The engine's taxonomy maps one-to-one onto boundary responses:
/// authorization → 403, invalid transition → 422, validation → 400,
/// not found → 404, concurrent modification → 409.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("authorization failed: {0}")]
    Authorization(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found")]
    NotFound,

    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<AuthzError> for WorkflowError {
    fn from(value: AuthzError) -> Self {
        WorkflowError::Authorization(value.to_string())
    }
}

impl From<DispatchError> for WorkflowError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Concurrency(msg) => WorkflowError::ConcurrentModification(msg),
            DispatchError::Validation(msg) => WorkflowError::Validation(msg),
            DispatchError::InvalidTransition(msg) => WorkflowError::InvalidTransition(msg),
            DispatchError::InvariantViolation(msg) => WorkflowError::InvalidTransition(msg),
            DispatchError::Unauthorized => WorkflowError::Authorization("unauthorized".to_string()),
            DispatchError::NotFound => WorkflowError::NotFound,
            DispatchError::TenantIsolation(msg) => WorkflowError::Authorization(msg),
            DispatchError::Deserialize(msg) => WorkflowError::Storage(msg),
            DispatchError::Store(e) => WorkflowError::Storage(e.to_string()),
            DispatchError::Publish(msg) => WorkflowError::Storage(msg),
        }
    }
}

/// Input for batch creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBatch {
    pub name: String,
    pub description: String,
    pub products: Vec<ProductId>,
}

/// Visibility-scoped status counts for the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct DashboardSummary {
    pub total_products: u32,
    pub pending_products: u32,
    pub in_batch_products: u32,
    pub sent_for_review_products: u32,
    pub verified_products: u32,
    pub rejected_products: u32,
    pub total_batches: u32,
    pub draft_batches: u32,
    pub in_review_batches: u32,
    pub approved_batches: u32,
    pub rejected_batches: u32,
}

/// The workflow engine (commands + visibility-scoped reads).
#[derive(Debug)]
pub struct ReviewWorkflow<S, B, PS, BS>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    PS: TenantStore<ProductId, ProductReadModel>,
    BS: TenantStore<BatchId, BatchReadModel>,
{
    dispatcher: CommandDispatcher<S, B>,
    returns: Arc<ReturnsProjection<PS, BS>>,
}

impl<S, B, PS, BS> ReviewWorkflow<S, B, PS, BS>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    PS: TenantStore<ProductId, ProductReadModel>,
    BS: TenantStore<BatchId, BatchReadModel>,
{
    pub fn new(dispatcher: CommandDispatcher<S, B>, returns: Arc<ReturnsProjection<PS, BS>>) -> Self {
        Self { dispatcher, returns }
    }

    pub fn returns(&self) -> &Arc<ReturnsProjection<PS, BS>> {
        &self.returns
    }

    // ─────────────────────────────────────────────────────────────────────
    // Product operations
    // ─────────────────────────────────────────────────────────────────────

    /// Submit a single product; the actor becomes its owner.
    pub fn submit_product(
        &self,
        actor: &Actor,
        tenant_id: TenantId,
        details: ProductDetails,
    ) -> Result<ProductId, WorkflowError> {
        policy::check(actor, Action::SubmitProduct, None)?;

        let agg = AggregateId::new();
        let product_id = ProductId::new(agg);
        let cmd = ProductCommand::Submit(SubmitProduct {
            tenant_id,
            product_id,
            owner: actor.user_id,
            details,
            occurred_at: Utc::now(),
        });

        let committed = self.dispatch_product(tenant_id, agg, cmd)?;
        self.project(&committed);
        Ok(product_id)
    }

    /// Consume a set of already-parsed rows from the bulk import boundary.
    ///
    /// Every row is validated before the first dispatch, so a malformed row
    /// rejects the whole import without creating anything.
    pub fn import_products(
        &self,
        actor: &Actor,
        tenant_id: TenantId,
        rows: Vec<ProductDetails>,
    ) -> Result<Vec<ProductId>, WorkflowError> {
        policy::check(actor, Action::SubmitProduct, None)?;

        if rows.is_empty() {
            return Err(WorkflowError::Validation("import contains no rows".to_string()));
        }
        for (idx, row) in rows.iter().enumerate() {
            row.validate()
                .map_err(|e| WorkflowError::Validation(format!("row {idx}: {e}")))?;
        }

        let mut created = Vec::with_capacity(rows.len());
        for details in rows {
            created.push(self.submit_product(actor, tenant_id, details)?);
        }
        Ok(created)
    }

    /// Update a product's intrinsic attributes.
    pub fn update_product(
        &self,
        actor: &Actor,
        tenant_id: TenantId,
        product_id: ProductId,
        details: ProductDetails,
    ) -> Result<(), WorkflowError> {
        let rm = self
            .returns
            .product(tenant_id, &product_id)
            .ok_or(WorkflowError::NotFound)?;
        policy::check(actor, Action::EditProduct, Some(rm.owner))?;

        let cmd = ProductCommand::Update(UpdateProduct {
            tenant_id,
            product_id,
            details,
            occurred_at: Utc::now(),
        });
        let committed = self.dispatch_product(tenant_id, product_id.0, cmd)?;
        self.project(&committed);
        Ok(())
    }

    /// Admin quality override: rate a product and force it `verified`.
    pub fn rate_product(
        &self,
        actor: &Actor,
        tenant_id: TenantId,
        product_id: ProductId,
        rating: QualityRating,
        notes: Option<String>,
    ) -> Result<(), WorkflowError> {
        let rm = self
            .returns
            .product(tenant_id, &product_id)
            .ok_or(WorkflowError::NotFound)?;
        policy::check(actor, Action::RateProduct, Some(rm.owner))?;

        let cmd = ProductCommand::Rate(RateProduct {
            tenant_id,
            product_id,
            rating,
            notes,
            rated_by: actor.user_id,
            occurred_at: Utc::now(),
        });
        let committed = self.dispatch_product(tenant_id, product_id.0, cmd)?;
        self.project(&committed);
        Ok(())
    }

    /// Soft-delete a product (recoverable via [`Self::restore_product`]).
    pub fn delete_product(
        &self,
        actor: &Actor,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<(), WorkflowError> {
        let rm = self
            .returns
            .product(tenant_id, &product_id)
            .ok_or(WorkflowError::NotFound)?;
        policy::check(actor, Action::DeleteProduct, Some(rm.owner))?;

        let cmd = ProductCommand::Delete(DeleteProduct {
            tenant_id,
            product_id,
            occurred_at: Utc::now(),
        });
        let committed = self.dispatch_product(tenant_id, product_id.0, cmd)?;
        self.project(&committed);
        Ok(())
    }

    pub fn restore_product(
        &self,
        actor: &Actor,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<(), WorkflowError> {
        let rm = self
            .returns
            .product(tenant_id, &product_id)
            .ok_or(WorkflowError::NotFound)?;
        policy::check(actor, Action::RestoreProduct, Some(rm.owner))?;

        let cmd = ProductCommand::Restore(RestoreProduct {
            tenant_id,
            product_id,
            occurred_at: Utc::now(),
        });
        let committed = self.dispatch_product(tenant_id, product_id.0, cmd)?;
        self.project(&committed);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Batch operations
    // ─────────────────────────────────────────────────────────────────────

    /// Create a draft batch from a set of eligible, actor-owned products.
    pub fn create_batch(
        &self,
        actor: &Actor,
        tenant_id: TenantId,
        new_batch: NewBatch,
    ) -> Result<BatchId, WorkflowError> {
        policy::check(actor, Action::CreateBatch, None)?;

        for product_id in &new_batch.products {
            let rm = self
                .returns
                .product(tenant_id, product_id)
                .ok_or(WorkflowError::NotFound)?;
            if rm.owner != actor.user_id {
                return Err(WorkflowError::Authorization(format!(
                    "product {product_id} belongs to another vendor"
                )));
            }
            if rm.is_deleted() {
                return Err(WorkflowError::Validation(format!(
                    "product {product_id} is deleted"
                )));
            }
            if rm.batch_id.is_some() {
                return Err(WorkflowError::Validation(format!(
                    "product {product_id} is already in a batch"
                )));
            }
            if rm.status != ProductStatus::Pending {
                return Err(WorkflowError::InvalidTransition(format!(
                    "product {product_id} is not pending"
                )));
            }
        }

        let agg = AggregateId::new();
        let batch_id = BatchId::new(agg);
        let cmd = BatchCommand::Create(CreateBatch {
            tenant_id,
            batch_id,
            owner: actor.user_id,
            name: new_batch.name,
            description: new_batch.description,
            products: new_batch.products,
            occurred_at: Utc::now(),
        });

        let committed = self.dispatch_batch(tenant_id, agg, cmd)?;
        self.project(&committed);
        Ok(batch_id)
    }

    /// Owner hands a draft batch over for review; cascades to every member.
    pub fn send_batch_for_review(
        &self,
        actor: &Actor,
        tenant_id: TenantId,
        batch_id: BatchId,
    ) -> Result<(), WorkflowError> {
        let rm = self
            .returns
            .batch(tenant_id, &batch_id)
            .ok_or(WorkflowError::NotFound)?;
        policy::check(actor, Action::SendBatchForReview, Some(rm.owner))?;

        let cmd = BatchCommand::SendForReview(SendForReview {
            tenant_id,
            batch_id,
            occurred_at: Utc::now(),
        });
        let committed = self.dispatch_batch(tenant_id, batch_id.0, cmd)?;
        self.project(&committed);
        Ok(())
    }

    /// Reviewer renders the decision; cascades `verified`/`rejected` to
    /// every member. Exactly one of two racing decisions is accepted.
    pub fn decide_batch_review(
        &self,
        actor: &Actor,
        tenant_id: TenantId,
        batch_id: BatchId,
        decision: ReviewDecision,
        notes: Option<String>,
    ) -> Result<(), WorkflowError> {
        let rm = self
            .returns
            .batch(tenant_id, &batch_id)
            .ok_or(WorkflowError::NotFound)?;
        policy::check(actor, Action::DecideBatchReview, Some(rm.owner))?;

        let cmd = BatchCommand::DecideReview(DecideReview {
            tenant_id,
            batch_id,
            decision,
            notes,
            reviewed_by: actor.user_id,
            occurred_at: Utc::now(),
        });
        let committed = self.dispatch_batch(tenant_id, batch_id.0, cmd)?;
        self.project(&committed);
        Ok(())
    }

    /// Delete a draft batch, releasing every member back to `pending`.
    pub fn delete_batch(
        &self,
        actor: &Actor,
        tenant_id: TenantId,
        batch_id: BatchId,
    ) -> Result<(), WorkflowError> {
        let rm = self
            .returns
            .batch(tenant_id, &batch_id)
            .ok_or(WorkflowError::NotFound)?;
        policy::check(actor, Action::DeleteBatch, Some(rm.owner))?;

        let cmd = BatchCommand::Delete(DeleteBatch {
            tenant_id,
            batch_id,
            occurred_at: Utc::now(),
        });
        let committed = self.dispatch_batch(tenant_id, batch_id.0, cmd)?;
        self.project(&committed);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reads (visibility-scoped)
    // ─────────────────────────────────────────────────────────────────────

    /// Fetch a product; out-of-visibility ids answer `NotFound` so resource
    /// existence does not leak across vendors.
    pub fn get_product(
        &self,
        actor: &Actor,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<ProductReadModel, WorkflowError> {
        let rm = self
            .returns
            .product(tenant_id, &product_id)
            .ok_or(WorkflowError::NotFound)?;
        if policy::check(actor, Action::ViewProduct, Some(rm.owner)).is_err() {
            return Err(WorkflowError::NotFound);
        }
        Ok(rm)
    }

    /// List live (non-deleted) products visible to the actor.
    pub fn list_products(&self, actor: &Actor, tenant_id: TenantId) -> Vec<ProductReadModel> {
        self.returns
            .products(tenant_id)
            .into_iter()
            .filter(|rm| !rm.is_deleted())
            .filter(|rm| actor.is_reviewer() || rm.owner == actor.user_id)
            .collect()
    }

    pub fn get_batch(
        &self,
        actor: &Actor,
        tenant_id: TenantId,
        batch_id: BatchId,
    ) -> Result<BatchReadModel, WorkflowError> {
        let rm = self
            .returns
            .batch(tenant_id, &batch_id)
            .ok_or(WorkflowError::NotFound)?;
        if policy::check(actor, Action::ViewBatch, Some(rm.owner)).is_err() {
            return Err(WorkflowError::NotFound);
        }
        Ok(rm)
    }

    pub fn list_batches(&self, actor: &Actor, tenant_id: TenantId) -> Vec<BatchReadModel> {
        self.returns
            .batches(tenant_id)
            .into_iter()
            .filter(|rm| actor.is_reviewer() || rm.owner == actor.user_id)
            .collect()
    }

    /// Status counts over everything the actor can see.
    pub fn summary(&self, actor: &Actor, tenant_id: TenantId) -> DashboardSummary {
        let mut summary = DashboardSummary::default();

        for product in self.list_products(actor, tenant_id) {
            summary.total_products += 1;
            match product.status {
                ProductStatus::Pending => summary.pending_products += 1,
                ProductStatus::InBatch => summary.in_batch_products += 1,
                ProductStatus::SentForReview => summary.sent_for_review_products += 1,
                ProductStatus::Verified => summary.verified_products += 1,
                ProductStatus::Rejected => summary.rejected_products += 1,
            }
        }

        for batch in self.list_batches(actor, tenant_id) {
            summary.total_batches += 1;
            match batch.status {
                revamp_batches::BatchStatus::Draft => summary.draft_batches += 1,
                revamp_batches::BatchStatus::SentForReview => summary.in_review_batches += 1,
                revamp_batches::BatchStatus::Approved => summary.approved_batches += 1,
                revamp_batches::BatchStatus::Rejected => summary.rejected_batches += 1,
            }
        }

        summary
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    fn dispatch_product(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        command: ProductCommand,
    ) -> Result<Vec<StoredEvent>, WorkflowError> {
        self.dispatcher
            .dispatch::<Product>(tenant_id, aggregate_id, "returns.product", command, |_, id| {
                Product::empty(ProductId::new(id))
            })
            .map_err(WorkflowError::from)
    }

    fn dispatch_batch(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        command: BatchCommand,
    ) -> Result<Vec<StoredEvent>, WorkflowError> {
        self.dispatcher
            .dispatch::<Batch>(tenant_id, aggregate_id, "returns.batch", command, |_, id| {
                Batch::empty(BatchId::new(id))
            })
            .map_err(WorkflowError::from)
    }

    /// Apply committed events to the engine's read model inline.
    ///
    /// The bus subscriber applies the same envelopes again; the projection
    /// cursor skips the duplicates. A failure here is logged and not
    /// surfaced: the events are durable and replayable.
    fn project(&self, committed: &[StoredEvent]) {
        for stored in committed {
            if let Err(e) = self.returns.apply_envelope(&stored.to_envelope()) {
                tracing::warn!("read model apply failed: {e}");
            }
        }
    }
}
