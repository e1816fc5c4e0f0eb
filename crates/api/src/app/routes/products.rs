use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use revamp_core::AggregateId;
use revamp_products::ProductId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(submit_product).get(list_products))
        .route("/bulk", post(import_products))
        .route(
            "/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/:id/restore", post(restore_product))
        .route("/:id/rate", post(rate_product))
}

fn parse_product_id(id: &str) -> Result<ProductId, axum::response::Response> {
    id.parse::<AggregateId>()
        .map(ProductId::new)
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid product id"))
}

pub async fn submit_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::ProductRequest>,
) -> axum::response::Response {
    let actor = match errors::require_actor(&principal) {
        Ok(actor) => actor,
        Err(res) => return res,
    };
    let details = match dto::product_details_from_request(&body) {
        Ok(details) => details,
        Err(res) => return res,
    };

    match services
        .workflow()
        .submit_product(&actor, tenant.tenant_id(), details)
    {
        Ok(id) => (
            StatusCode::CREATED,
            Json(serde_json::json!({"id": id.to_string()})),
        )
            .into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

pub async fn import_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::BulkImportRequest>,
) -> axum::response::Response {
    let actor = match errors::require_actor(&principal) {
        Ok(actor) => actor,
        Err(res) => return res,
    };

    let mut rows = Vec::with_capacity(body.products.len());
    for req in &body.products {
        match dto::product_details_from_request(req) {
            Ok(details) => rows.push(details),
            Err(res) => return res,
        }
    }

    match services
        .workflow()
        .import_products(&actor, tenant.tenant_id(), rows)
    {
        Ok(ids) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "ids": ids.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
            })),
        )
            .into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    let actor = match errors::require_actor(&principal) {
        Ok(actor) => actor,
        Err(res) => return res,
    };

    let items = services
        .workflow()
        .list_products(&actor, tenant.tenant_id())
        .into_iter()
        .map(dto::product_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let actor = match errors::require_actor(&principal) {
        Ok(actor) => actor,
        Err(res) => return res,
    };
    let product_id = match parse_product_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match services
        .workflow()
        .get_product(&actor, tenant.tenant_id(), product_id)
    {
        Ok(rm) => (StatusCode::OK, Json(dto::product_to_json(rm))).into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

pub async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ProductRequest>,
) -> axum::response::Response {
    let actor = match errors::require_actor(&principal) {
        Ok(actor) => actor,
        Err(res) => return res,
    };
    let product_id = match parse_product_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };
    let details = match dto::product_details_from_request(&body) {
        Ok(details) => details,
        Err(res) => return res,
    };

    match services
        .workflow()
        .update_product(&actor, tenant.tenant_id(), product_id, details)
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

pub async fn delete_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let actor = match errors::require_actor(&principal) {
        Ok(actor) => actor,
        Err(res) => return res,
    };
    let product_id = match parse_product_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match services
        .workflow()
        .delete_product(&actor, tenant.tenant_id(), product_id)
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

pub async fn restore_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let actor = match errors::require_actor(&principal) {
        Ok(actor) => actor,
        Err(res) => return res,
    };
    let product_id = match parse_product_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match services
        .workflow()
        .restore_product(&actor, tenant.tenant_id(), product_id)
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

pub async fn rate_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RateProductRequest>,
) -> axum::response::Response {
    let actor = match errors::require_actor(&principal) {
        Ok(actor) => actor,
        Err(res) => return res,
    };
    let product_id = match parse_product_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };
    let rating = match errors::parse_rating(&body.rating) {
        Ok(rating) => rating,
        Err(res) => return res,
    };

    match services
        .workflow()
        .rate_product(&actor, tenant.tenant_id(), product_id, rating, body.notes)
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}
