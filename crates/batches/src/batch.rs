use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use revamp_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, UserId};
use revamp_events::Event;
use revamp_products::ProductId;

/// Batch identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub AggregateId);

impl BatchId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for BatchId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Batch status lifecycle.
///
/// `draft → sent_for_review → approved | rejected`; deletion is only legal
/// while `draft`. Every other transition is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Draft,
    SentForReview,
    Approved,
    Rejected,
}

/// Reviewer decision on a batch in `sent_for_review`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

/// Aggregate root: Batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    id: BatchId,
    tenant_id: Option<TenantId>,
    owner: Option<UserId>,
    name: String,
    description: String,
    notes: Option<String>,
    products: Vec<ProductId>,
    status: BatchStatus,
    sent_for_review_at: Option<DateTime<Utc>>,
    reviewed_at: Option<DateTime<Utc>>,
    reviewed_by: Option<UserId>,
    deleted: bool,
    version: u64,
    created: bool,
}

impl Batch {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: BatchId) -> Self {
        Self {
            id,
            tenant_id: None,
            owner: None,
            name: String::new(),
            description: String::new(),
            notes: None,
            products: Vec::new(),
            status: BatchStatus::Draft,
            sent_for_review_at: None,
            reviewed_at: None,
            reviewed_by: None,
            deleted: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> BatchId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn owner(&self) -> Option<UserId> {
        self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn products(&self) -> &[ProductId] {
        &self.products
    }

    pub fn status(&self) -> BatchStatus {
        self.status
    }

    pub fn sent_for_review_at(&self) -> Option<DateTime<Utc>> {
        self.sent_for_review_at
    }

    pub fn reviewed_at(&self) -> Option<DateTime<Utc>> {
        self.reviewed_at
    }

    pub fn reviewed_by(&self) -> Option<UserId> {
        self.reviewed_by
    }

    pub fn is_draft(&self) -> bool {
        matches!(self.status, BatchStatus::Draft)
    }

    /// Review has been rendered (terminal states).
    pub fn is_reviewed(&self) -> bool {
        matches!(self.status, BatchStatus::Approved | BatchStatus::Rejected)
    }

    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_live(&self) -> Result<(), DomainError> {
        if !self.created || self.deleted {
            return Err(DomainError::not_found());
        }
        Ok(())
    }
}

impl AggregateRoot for Batch {
    type Id = BatchId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateBatch.
///
/// The member set is fixed at creation time; eligibility of each member
/// (owned by the same vendor, pending, unbatched, not deleted) is validated
/// by the workflow engine against the read model before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBatch {
    pub tenant_id: TenantId,
    pub batch_id: BatchId,
    pub owner: UserId,
    pub name: String,
    pub description: String,
    pub products: Vec<ProductId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SendForReview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendForReview {
    pub tenant_id: TenantId,
    pub batch_id: BatchId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DecideReview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecideReview {
    pub tenant_id: TenantId,
    pub batch_id: BatchId,
    pub decision: ReviewDecision,
    pub notes: Option<String>,
    pub reviewed_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteBatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteBatch {
    pub tenant_id: TenantId,
    pub batch_id: BatchId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchCommand {
    Create(CreateBatch),
    SendForReview(SendForReview),
    DecideReview(DecideReview),
    Delete(DeleteBatch),
}

/// Event: BatchCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCreated {
    pub tenant_id: TenantId,
    pub batch_id: BatchId,
    pub owner: UserId,
    pub name: String,
    pub description: String,
    pub products: Vec<ProductId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchSentForReview.
///
/// Cascades (via projection) to every member product: status becomes
/// `sent_for_review`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSentForReview {
    pub tenant_id: TenantId,
    pub batch_id: BatchId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchReviewed.
///
/// Cascades (via projection) to every member product: `verified` on
/// approval, `rejected` otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReviewed {
    pub tenant_id: TenantId,
    pub batch_id: BatchId,
    pub decision: ReviewDecision,
    pub notes: Option<String>,
    pub reviewed_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchDeleted.
///
/// Cascades (via projection) to every member product: batch reference
/// cleared, status reset to `pending`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDeleted {
    pub tenant_id: TenantId,
    pub batch_id: BatchId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchEvent {
    Created(BatchCreated),
    SentForReview(BatchSentForReview),
    Reviewed(BatchReviewed),
    Deleted(BatchDeleted),
}

impl Event for BatchEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BatchEvent::Created(_) => "returns.batch.created",
            BatchEvent::SentForReview(_) => "returns.batch.sent_for_review",
            BatchEvent::Reviewed(_) => "returns.batch.reviewed",
            BatchEvent::Deleted(_) => "returns.batch.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BatchEvent::Created(e) => e.occurred_at,
            BatchEvent::SentForReview(e) => e.occurred_at,
            BatchEvent::Reviewed(e) => e.occurred_at,
            BatchEvent::Deleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Batch {
    type Command = BatchCommand;
    type Event = BatchEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BatchEvent::Created(e) => {
                self.id = e.batch_id;
                self.tenant_id = Some(e.tenant_id);
                self.owner = Some(e.owner);
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.products = e.products.clone();
                self.status = BatchStatus::Draft;
                self.created = true;
            }
            BatchEvent::SentForReview(e) => {
                self.status = BatchStatus::SentForReview;
                self.sent_for_review_at = Some(e.occurred_at);
            }
            BatchEvent::Reviewed(e) => {
                self.status = match e.decision {
                    ReviewDecision::Approved => BatchStatus::Approved,
                    ReviewDecision::Rejected => BatchStatus::Rejected,
                };
                self.reviewed_at = Some(e.occurred_at);
                self.reviewed_by = Some(e.reviewed_by);
                self.notes = e.notes.clone();
            }
            BatchEvent::Deleted(_) => {
                self.deleted = true;
                self.products.clear();
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            BatchCommand::Create(cmd) => self.handle_create(cmd),
            BatchCommand::SendForReview(cmd) => self.handle_send_for_review(cmd),
            BatchCommand::DecideReview(cmd) => self.handle_decide_review(cmd),
            BatchCommand::Delete(cmd) => self.handle_delete(cmd),
        }
    }
}

impl Batch {
    fn handle_create(&self, cmd: &CreateBatch) -> Result<Vec<BatchEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("batch already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.products.is_empty() {
            return Err(DomainError::validation(
                "batch must contain at least one product",
            ));
        }
        let unique: HashSet<&ProductId> = cmd.products.iter().collect();
        if unique.len() != cmd.products.len() {
            return Err(DomainError::validation("duplicate product in batch"));
        }

        Ok(vec![BatchEvent::Created(BatchCreated {
            tenant_id: cmd.tenant_id,
            batch_id: cmd.batch_id,
            owner: cmd.owner,
            name: cmd.name.trim().to_string(),
            description: cmd.description.clone(),
            products: cmd.products.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_send_for_review(
        &self,
        cmd: &SendForReview,
    ) -> Result<Vec<BatchEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if !self.is_draft() {
            return Err(DomainError::invalid_transition(
                "only draft batches can be sent for review",
            ));
        }

        Ok(vec![BatchEvent::SentForReview(BatchSentForReview {
            tenant_id: cmd.tenant_id,
            batch_id: cmd.batch_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_decide_review(&self, cmd: &DecideReview) -> Result<Vec<BatchEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.status != BatchStatus::SentForReview {
            return Err(DomainError::invalid_transition(
                "only batches sent for review can be decided",
            ));
        }

        Ok(vec![BatchEvent::Reviewed(BatchReviewed {
            tenant_id: cmd.tenant_id,
            batch_id: cmd.batch_id,
            decision: cmd.decision,
            notes: cmd.notes.clone(),
            reviewed_by: cmd.reviewed_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteBatch) -> Result<Vec<BatchEvent>, DomainError> {
        self.ensure_live()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if !self.is_draft() {
            return Err(DomainError::invalid_transition(
                "only draft batches can be deleted",
            ));
        }

        Ok(vec![BatchEvent::Deleted(BatchDeleted {
            tenant_id: cmd.tenant_id,
            batch_id: cmd.batch_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revamp_events::execute;

    fn test_products(n: usize) -> Vec<ProductId> {
        (0..n).map(|_| ProductId::new(AggregateId::new())).collect()
    }

    fn created_batch(products: Vec<ProductId>) -> (Batch, TenantId, UserId) {
        let tenant_id = TenantId::new();
        let owner = UserId::new();
        let mut batch = Batch::empty(BatchId::new(AggregateId::new()));
        let cmd = BatchCommand::Create(CreateBatch {
            tenant_id,
            batch_id: batch.id_typed(),
            owner,
            name: "November returns".to_string(),
            description: "mixed electronics".to_string(),
            products,
            occurred_at: Utc::now(),
        });
        execute(&mut batch, &cmd).unwrap();
        (batch, tenant_id, owner)
    }

    #[test]
    fn create_starts_in_draft_with_members() {
        let products = test_products(3);
        let (batch, _, owner) = created_batch(products.clone());
        assert_eq!(batch.status(), BatchStatus::Draft);
        assert_eq!(batch.products(), products.as_slice());
        assert_eq!(batch.owner(), Some(owner));
        assert!(batch.sent_for_review_at().is_none());
    }

    #[test]
    fn create_rejects_empty_member_set() {
        let batch = Batch::empty(BatchId::new(AggregateId::new()));
        let cmd = BatchCommand::Create(CreateBatch {
            tenant_id: TenantId::new(),
            batch_id: batch.id_typed(),
            owner: UserId::new(),
            name: "empty".to_string(),
            description: String::new(),
            products: vec![],
            occurred_at: Utc::now(),
        });
        assert!(matches!(
            batch.handle(&cmd),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn create_rejects_duplicate_members() {
        let batch = Batch::empty(BatchId::new(AggregateId::new()));
        let product = ProductId::new(AggregateId::new());
        let cmd = BatchCommand::Create(CreateBatch {
            tenant_id: TenantId::new(),
            batch_id: batch.id_typed(),
            owner: UserId::new(),
            name: "dupes".to_string(),
            description: String::new(),
            products: vec![product, product],
            occurred_at: Utc::now(),
        });
        assert!(matches!(
            batch.handle(&cmd),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn send_for_review_sets_timestamp() {
        let (mut batch, tenant_id, _) = created_batch(test_products(2));
        let cmd = BatchCommand::SendForReview(SendForReview {
            tenant_id,
            batch_id: batch.id_typed(),
            occurred_at: Utc::now(),
        });
        execute(&mut batch, &cmd).unwrap();
        assert_eq!(batch.status(), BatchStatus::SentForReview);
        assert!(batch.sent_for_review_at().is_some());
    }

    #[test]
    fn second_send_for_review_fails_without_mutation() {
        let (mut batch, tenant_id, _) = created_batch(test_products(2));
        let cmd = BatchCommand::SendForReview(SendForReview {
            tenant_id,
            batch_id: batch.id_typed(),
            occurred_at: Utc::now(),
        });
        execute(&mut batch, &cmd).unwrap();
        let first_sent_at = batch.sent_for_review_at();
        let version = batch.version();

        let cmd = BatchCommand::SendForReview(SendForReview {
            tenant_id,
            batch_id: batch.id_typed(),
            occurred_at: Utc::now(),
        });
        assert!(matches!(
            batch.handle(&cmd),
            Err(DomainError::InvalidTransition(_))
        ));
        assert_eq!(batch.sent_for_review_at(), first_sent_at);
        assert_eq!(batch.version(), version);
    }

    #[test]
    fn decide_requires_sent_for_review() {
        let (batch, tenant_id, _) = created_batch(test_products(1));
        let cmd = BatchCommand::DecideReview(DecideReview {
            tenant_id,
            batch_id: batch.id_typed(),
            decision: ReviewDecision::Approved,
            notes: None,
            reviewed_by: UserId::new(),
            occurred_at: Utc::now(),
        });
        assert!(matches!(
            batch.handle(&cmd),
            Err(DomainError::InvalidTransition(_))
        ));
    }

    #[test]
    fn approval_records_reviewer_and_notes() {
        let (mut batch, tenant_id, _) = created_batch(test_products(2));
        let reviewer = UserId::new();

        let cmd = BatchCommand::SendForReview(SendForReview {
            tenant_id,
            batch_id: batch.id_typed(),
            occurred_at: Utc::now(),
        });
        execute(&mut batch, &cmd).unwrap();

        let cmd = BatchCommand::DecideReview(DecideReview {
            tenant_id,
            batch_id: batch.id_typed(),
            decision: ReviewDecision::Approved,
            notes: Some("ok".to_string()),
            reviewed_by: reviewer,
            occurred_at: Utc::now(),
        });
        execute(&mut batch, &cmd).unwrap();

        assert_eq!(batch.status(), BatchStatus::Approved);
        assert!(batch.is_reviewed());
        assert_eq!(batch.reviewed_by(), Some(reviewer));
        assert_eq!(batch.notes(), Some("ok"));
        assert!(batch.reviewed_at().is_some());
    }

    #[test]
    fn rejection_is_terminal() {
        let (mut batch, tenant_id, _) = created_batch(test_products(1));
        let cmd = BatchCommand::SendForReview(SendForReview {
            tenant_id,
            batch_id: batch.id_typed(),
            occurred_at: Utc::now(),
        });
        execute(&mut batch, &cmd).unwrap();

        let cmd = BatchCommand::DecideReview(DecideReview {
            tenant_id,
            batch_id: batch.id_typed(),
            decision: ReviewDecision::Rejected,
            notes: None,
            reviewed_by: UserId::new(),
            occurred_at: Utc::now(),
        });
        execute(&mut batch, &cmd).unwrap();
        assert_eq!(batch.status(), BatchStatus::Rejected);

        // No further transitions from a terminal state.
        let cmd = BatchCommand::SendForReview(SendForReview {
            tenant_id,
            batch_id: batch.id_typed(),
            occurred_at: Utc::now(),
        });
        assert!(matches!(
            batch.handle(&cmd),
            Err(DomainError::InvalidTransition(_))
        ));
        let cmd = BatchCommand::Delete(DeleteBatch {
            tenant_id,
            batch_id: batch.id_typed(),
            occurred_at: Utc::now(),
        });
        assert!(matches!(
            batch.handle(&cmd),
            Err(DomainError::InvalidTransition(_))
        ));
    }

    #[test]
    fn delete_is_draft_only() {
        let (mut batch, tenant_id, _) = created_batch(test_products(3));

        let cmd = BatchCommand::SendForReview(SendForReview {
            tenant_id,
            batch_id: batch.id_typed(),
            occurred_at: Utc::now(),
        });
        execute(&mut batch, &cmd).unwrap();

        let cmd = BatchCommand::Delete(DeleteBatch {
            tenant_id,
            batch_id: batch.id_typed(),
            occurred_at: Utc::now(),
        });
        assert!(matches!(
            batch.handle(&cmd),
            Err(DomainError::InvalidTransition(_))
        ));
    }

    #[test]
    fn deleted_batch_rejects_all_commands() {
        let (mut batch, tenant_id, _) = created_batch(test_products(1));
        let cmd = BatchCommand::Delete(DeleteBatch {
            tenant_id,
            batch_id: batch.id_typed(),
            occurred_at: Utc::now(),
        });
        execute(&mut batch, &cmd).unwrap();

        let cmd = BatchCommand::SendForReview(SendForReview {
            tenant_id,
            batch_id: batch.id_typed(),
            occurred_at: Utc::now(),
        });
        assert_eq!(batch.handle(&cmd), Err(DomainError::NotFound));
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let (batch, tenant_id, _) = created_batch(test_products(2));
        let version = batch.version();
        let status = batch.status();

        let cmd = BatchCommand::SendForReview(SendForReview {
            tenant_id,
            batch_id: batch.id_typed(),
            occurred_at: Utc::now(),
        });
        let events1 = batch.handle(&cmd).unwrap();
        let events2 = batch.handle(&cmd).unwrap();

        assert_eq!(batch.version(), version);
        assert_eq!(batch.status(), status);
        assert_eq!(events1, events2);
    }
}
