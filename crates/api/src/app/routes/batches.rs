use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use revamp_batches::BatchId;
use revamp_core::AggregateId;
use revamp_infra::workflow::NewBatch;
use revamp_products::ProductId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_batch).get(list_batches))
        .route("/:id", get(get_batch).delete(delete_batch))
        .route("/:id/send-for-review", post(send_for_review))
        .route("/:id/review", post(review_batch))
}

fn parse_batch_id(id: &str) -> Result<BatchId, axum::response::Response> {
    id.parse::<AggregateId>()
        .map(BatchId::new)
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid batch id"))
}

pub async fn create_batch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateBatchRequest>,
) -> axum::response::Response {
    let actor = match errors::require_actor(&principal) {
        Ok(actor) => actor,
        Err(res) => return res,
    };

    let mut products = Vec::with_capacity(body.product_ids.len());
    for raw in &body.product_ids {
        match raw.parse::<AggregateId>() {
            Ok(agg) => products.push(ProductId::new(agg)),
            Err(_) => {
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_id",
                    format!("invalid product id: {raw}"),
                );
            }
        }
    }

    let new_batch = NewBatch {
        name: body.name,
        description: body.description.unwrap_or_default(),
        products,
    };

    match services
        .workflow()
        .create_batch(&actor, tenant.tenant_id(), new_batch)
    {
        Ok(id) => (
            StatusCode::CREATED,
            Json(serde_json::json!({"id": id.to_string()})),
        )
            .into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

pub async fn list_batches(
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
        .list_batches(&actor, tenant.tenant_id())
        .into_iter()
        .map(dto::batch_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn get_batch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let actor = match errors::require_actor(&principal) {
        Ok(actor) => actor,
        Err(res) => return res,
    };
    let batch_id = match parse_batch_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match services
        .workflow()
        .get_batch(&actor, tenant.tenant_id(), batch_id)
    {
        Ok(rm) => (StatusCode::OK, Json(dto::batch_to_json(rm))).into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

pub async fn delete_batch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let actor = match errors::require_actor(&principal) {
        Ok(actor) => actor,
        Err(res) => return res,
    };
    let batch_id = match parse_batch_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match services
        .workflow()
        .delete_batch(&actor, tenant.tenant_id(), batch_id)
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

pub async fn send_for_review(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let actor = match errors::require_actor(&principal) {
        Ok(actor) => actor,
        Err(res) => return res,
    };
    let batch_id = match parse_batch_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match services
        .workflow()
        .send_batch_for_review(&actor, tenant.tenant_id(), batch_id)
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

pub async fn review_batch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReviewRequest>,
) -> axum::response::Response {
    let actor = match errors::require_actor(&principal) {
        Ok(actor) => actor,
        Err(res) => return res,
    };
    let batch_id = match parse_batch_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };
    let decision = match errors::parse_decision(&body.status) {
        Ok(decision) => decision,
        Err(res) => return res,
    };

    match services.workflow().decide_batch_review(
        &actor,
        tenant.tenant_id(),
        batch_id,
        decision,
        body.notes,
    ) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}
