use std::sync::Arc;

use axum::{Json, Router, extract::Extension, http::StatusCode, response::IntoResponse, routing::get};

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new().route("/summary", get(summary))
}

pub async fn summary(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    let actor = match errors::require_actor(&principal) {
        Ok(actor) => actor,
        Err(res) => return res,
    };

    let summary = services.workflow().summary(&actor, tenant.tenant_id());
    (StatusCode::OK, Json(summary)).into_response()
}
