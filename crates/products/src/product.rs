use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use revamp_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money, TenantId, UserId};
use revamp_events::Event;

/// Product identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Physical condition of a returned item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    New,
    LikeNew,
    VeryGood,
    Good,
    Acceptable,
}

/// Quality grade assigned during review, independent of pass/fail outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityRating {
    A,
    B,
    C,
}

/// Product workflow status.
///
/// The aggregate itself only ever moves between `Pending` and `Verified`
/// (via the rating override); the batching states are derived in the read
/// model from the owning batch's stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Pending,
    InBatch,
    SentForReview,
    Verified,
    Rejected,
}

/// Intrinsic (vendor-editable) product attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub title: String,
    pub brand: String,
    pub category: String,
    pub condition: Condition,
    pub original_price: Money,
    pub listing_price: Money,
    pub quantity: u32,
    pub description: String,
}

impl ProductDetails {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.title.trim().is_empty() {
            return Err(DomainError::validation("title cannot be empty"));
        }
        if self.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if self.listing_price.is_zero() {
            return Err(DomainError::validation("listing_price must be positive"));
        }
        Ok(())
    }
}

/// Aggregate root: Product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    tenant_id: Option<TenantId>,
    owner: Option<UserId>,
    details: Option<ProductDetails>,
    status: ProductStatus,
    quality_rating: Option<QualityRating>,
    notes: Option<String>,
    verified_at: Option<DateTime<Utc>>,
    verified_by: Option<UserId>,
    deleted_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            tenant_id: None,
            owner: None,
            details: None,
            status: ProductStatus::Pending,
            quality_rating: None,
            notes: None,
            verified_at: None,
            verified_by: None,
            deleted_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn owner(&self) -> Option<UserId> {
        self.owner
    }

    pub fn details(&self) -> Option<&ProductDetails> {
        self.details.as_ref()
    }

    pub fn status(&self) -> ProductStatus {
        self.status
    }

    pub fn quality_rating(&self) -> Option<QualityRating> {
        self.quality_rating
    }

    pub fn verified_at(&self) -> Option<DateTime<Utc>> {
        self.verified_at
    }

    pub fn verified_by(&self) -> Option<UserId> {
        self.verified_by
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
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

    fn ensure_exists(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn ensure_not_deleted(&self) -> Result<(), DomainError> {
        if self.is_deleted() {
            return Err(DomainError::invariant("product is deleted"));
        }
        Ok(())
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: SubmitProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub owner: UserId,
    pub details: ProductDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateProduct (intrinsic attributes only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RateProduct (admin quality override).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub rating: QualityRating,
    pub notes: Option<String>,
    pub rated_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteProduct (soft delete).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RestoreProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreProduct {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    Submit(SubmitProduct),
    Update(UpdateProduct),
    Rate(RateProduct),
    Delete(DeleteProduct),
    Restore(RestoreProduct),
}

/// Event: ProductSubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSubmitted {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub owner: UserId,
    pub details: ProductDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub details: ProductDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductRated.
///
/// The privileged override path: rating forces `verified` from any prior
/// status, without passing through the batch cascade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRated {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub rating: QualityRating,
    pub notes: Option<String>,
    pub rated_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductDeleted (soft).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDeleted {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductRestored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRestored {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    Submitted(ProductSubmitted),
    Updated(ProductUpdated),
    Rated(ProductRated),
    Deleted(ProductDeleted),
    Restored(ProductRestored),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::Submitted(_) => "returns.product.submitted",
            ProductEvent::Updated(_) => "returns.product.updated",
            ProductEvent::Rated(_) => "returns.product.rated",
            ProductEvent::Deleted(_) => "returns.product.deleted",
            ProductEvent::Restored(_) => "returns.product.restored",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::Submitted(e) => e.occurred_at,
            ProductEvent::Updated(e) => e.occurred_at,
            ProductEvent::Rated(e) => e.occurred_at,
            ProductEvent::Deleted(e) => e.occurred_at,
            ProductEvent::Restored(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::Submitted(e) => {
                self.id = e.product_id;
                self.tenant_id = Some(e.tenant_id);
                self.owner = Some(e.owner);
                self.details = Some(e.details.clone());
                self.status = ProductStatus::Pending;
                self.created = true;
            }
            ProductEvent::Updated(e) => {
                self.details = Some(e.details.clone());
            }
            ProductEvent::Rated(e) => {
                self.quality_rating = Some(e.rating);
                self.notes = e.notes.clone();
                self.verified_at = Some(e.occurred_at);
                self.verified_by = Some(e.rated_by);
                self.status = ProductStatus::Verified;
            }
            ProductEvent::Deleted(e) => {
                self.deleted_at = Some(e.occurred_at);
            }
            ProductEvent::Restored(_) => {
                self.deleted_at = None;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::Submit(cmd) => self.handle_submit(cmd),
            ProductCommand::Update(cmd) => self.handle_update(cmd),
            ProductCommand::Rate(cmd) => self.handle_rate(cmd),
            ProductCommand::Delete(cmd) => self.handle_delete(cmd),
            ProductCommand::Restore(cmd) => self.handle_restore(cmd),
        }
    }
}

impl Product {
    fn handle_submit(&self, cmd: &SubmitProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        cmd.details.validate()?;

        Ok(vec![ProductEvent::Submitted(ProductSubmitted {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            owner: cmd.owner,
            details: cmd.details.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_not_deleted()?;
        cmd.details.validate()?;

        Ok(vec![ProductEvent::Updated(ProductUpdated {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            details: cmd.details.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_rate(&self, cmd: &RateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_not_deleted()?;

        Ok(vec![ProductEvent::Rated(ProductRated {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            rating: cmd.rating,
            notes: cmd.notes.clone(),
            rated_by: cmd.rated_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;
        if self.is_deleted() {
            return Ok(vec![]);
        }

        Ok(vec![ProductEvent::Deleted(ProductDeleted {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_restore(&self, cmd: &RestoreProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;
        if !self.is_deleted() {
            return Err(DomainError::invalid_transition(
                "product is not deleted",
            ));
        }

        Ok(vec![ProductEvent::Restored(ProductRestored {
            tenant_id: cmd.tenant_id,
            product_id: cmd.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revamp_events::execute;

    fn details() -> ProductDetails {
        ProductDetails {
            title: "Refurb laptop".to_string(),
            brand: "Lenovo".to_string(),
            category: "electronics".to_string(),
            condition: Condition::VeryGood,
            original_price: Money::from_cents(120_000),
            listing_price: Money::from_cents(79_999),
            quantity: 1,
            description: "light scratches on lid".to_string(),
        }
    }

    fn submitted_product() -> (Product, TenantId, UserId) {
        let tenant_id = TenantId::new();
        let owner = UserId::new();
        let mut product = Product::empty(ProductId::new(AggregateId::new()));
        let cmd = ProductCommand::Submit(SubmitProduct {
            tenant_id,
            product_id: product.id_typed(),
            owner,
            details: details(),
            occurred_at: Utc::now(),
        });
        execute(&mut product, &cmd).unwrap();
        (product, tenant_id, owner)
    }

    #[test]
    fn submit_creates_pending_product() {
        let (product, _, owner) = submitted_product();
        assert_eq!(product.status(), ProductStatus::Pending);
        assert_eq!(product.owner(), Some(owner));
        assert!(product.quality_rating().is_none());
        assert!(!product.is_deleted());
    }

    #[test]
    fn submit_rejects_zero_quantity() {
        let product = Product::empty(ProductId::new(AggregateId::new()));
        let mut bad = details();
        bad.quantity = 0;
        let cmd = ProductCommand::Submit(SubmitProduct {
            tenant_id: TenantId::new(),
            product_id: product.id_typed(),
            owner: UserId::new(),
            details: bad,
            occurred_at: Utc::now(),
        });
        assert!(matches!(
            product.handle(&cmd),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn rate_forces_verified_and_sets_audit_fields() {
        let (mut product, tenant_id, _) = submitted_product();
        let reviewer = UserId::new();
        let cmd = ProductCommand::Rate(RateProduct {
            tenant_id,
            product_id: product.id_typed(),
            rating: QualityRating::B,
            notes: Some("minor wear".to_string()),
            rated_by: reviewer,
            occurred_at: Utc::now(),
        });
        execute(&mut product, &cmd).unwrap();

        assert_eq!(product.status(), ProductStatus::Verified);
        assert_eq!(product.quality_rating(), Some(QualityRating::B));
        assert_eq!(product.verified_by(), Some(reviewer));
        assert!(product.verified_at().is_some());
    }

    #[test]
    fn rate_deleted_product_fails() {
        let (mut product, tenant_id, _) = submitted_product();
        let cmd = ProductCommand::Delete(DeleteProduct {
            tenant_id,
            product_id: product.id_typed(),
            occurred_at: Utc::now(),
        });
        execute(&mut product, &cmd).unwrap();

        let cmd = ProductCommand::Rate(RateProduct {
            tenant_id,
            product_id: product.id_typed(),
            rating: QualityRating::A,
            notes: None,
            rated_by: UserId::new(),
            occurred_at: Utc::now(),
        });
        assert!(matches!(
            product.handle(&cmd),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn delete_then_restore_roundtrip() {
        let (mut product, tenant_id, _) = submitted_product();
        let cmd = ProductCommand::Delete(DeleteProduct {
            tenant_id,
            product_id: product.id_typed(),
            occurred_at: Utc::now(),
        });
        execute(&mut product, &cmd).unwrap();
        assert!(product.is_deleted());

        // Deleting again is a no-op, not an error.
        let cmd = ProductCommand::Delete(DeleteProduct {
            tenant_id,
            product_id: product.id_typed(),
            occurred_at: Utc::now(),
        });
        assert!(product.handle(&cmd).unwrap().is_empty());

        let cmd = ProductCommand::Restore(RestoreProduct {
            tenant_id,
            product_id: product.id_typed(),
            occurred_at: Utc::now(),
        });
        execute(&mut product, &cmd).unwrap();
        assert!(!product.is_deleted());
    }

    #[test]
    fn restore_of_live_product_is_invalid() {
        let (product, tenant_id, _) = submitted_product();
        let cmd = ProductCommand::Restore(RestoreProduct {
            tenant_id,
            product_id: product.id_typed(),
            occurred_at: Utc::now(),
        });
        assert!(matches!(
            product.handle(&cmd),
            Err(DomainError::InvalidTransition(_))
        ));
    }

    #[test]
    fn cross_tenant_command_is_rejected() {
        let (product, _, _) = submitted_product();
        let cmd = ProductCommand::Update(UpdateProduct {
            tenant_id: TenantId::new(),
            product_id: product.id_typed(),
            details: details(),
            occurred_at: Utc::now(),
        });
        assert!(matches!(
            product.handle(&cmd),
            Err(DomainError::InvariantViolation(_))
        ));
    }
}
