//! Request/response DTOs and JSON mapping helpers.

use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use revamp_infra::projections::{BatchReadModel, ProductReadModel, UserReadModel};
use revamp_products::ProductDetails;

use crate::app::errors;

#[derive(Debug, Deserialize)]
pub struct ProductRequest {
    pub title: String,
    pub brand: String,
    pub category: String,
    pub condition: String,
    /// Decimal amount, e.g. "129.99".
    pub original_price: String,
    pub listing_price: String,
    pub quantity: u32,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkImportRequest {
    pub products: Vec<ProductRequest>,
}

#[derive(Debug, Deserialize)]
pub struct RateProductRequest {
    pub rating: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBatchRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub product_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    /// "approved" or "rejected".
    pub status: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterUserRequest {
    pub email: String,
    pub display_name: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignRoleRequest {
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct SuspendUserRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

pub fn product_details_from_request(
    req: &ProductRequest,
) -> Result<ProductDetails, axum::response::Response> {
    Ok(ProductDetails {
        title: req.title.clone(),
        brand: req.brand.clone(),
        category: req.category.clone(),
        condition: errors::parse_condition(&req.condition)?,
        original_price: errors::parse_money("original_price", &req.original_price)?,
        listing_price: errors::parse_money("listing_price", &req.listing_price)?,
        quantity: req.quantity,
        description: req.description.clone().unwrap_or_default(),
    })
}

pub fn product_to_json(rm: ProductReadModel) -> JsonValue {
    json!({
        "id": rm.product_id.to_string(),
        "owner": rm.owner.to_string(),
        "title": rm.details.title,
        "brand": rm.details.brand,
        "category": rm.details.category,
        "condition": rm.details.condition,
        "original_price": rm.details.original_price.to_string(),
        "listing_price": rm.details.listing_price.to_string(),
        "quantity": rm.details.quantity,
        "description": rm.details.description,
        "status": rm.status,
        "batch_id": rm.batch_id.map(|id| id.to_string()),
        "quality_rating": rm.quality_rating,
        "notes": rm.notes,
        "verified_at": rm.verified_at,
        "verified_by": rm.verified_by.map(|id| id.to_string()),
        "deleted_at": rm.deleted_at,
    })
}

pub fn batch_to_json(rm: BatchReadModel) -> JsonValue {
    json!({
        "id": rm.batch_id.to_string(),
        "owner": rm.owner.to_string(),
        "name": rm.name,
        "description": rm.description,
        "notes": rm.notes,
        "status": rm.status,
        "product_ids": rm.products.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
        "total_products": rm.total_products,
        "verified_products": rm.verified_products,
        "sent_for_review_at": rm.sent_for_review_at,
        "reviewed_at": rm.reviewed_at,
        "reviewed_by": rm.reviewed_by.map(|id| id.to_string()),
    })
}

pub fn user_to_json(rm: UserReadModel) -> JsonValue {
    json!({
        "id": rm.user_id.to_string(),
        "email": rm.email,
        "display_name": rm.display_name,
        "role": rm.role,
        "status": rm.status,
    })
}
