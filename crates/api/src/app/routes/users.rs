use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use revamp_core::UserId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_user).get(list_users))
        .route("/:id/role", post(assign_role))
        .route("/:id/suspend", post(suspend_user))
        .route("/:id/activate", post(activate_user))
}

fn parse_user_id(id: &str) -> Result<UserId, axum::response::Response> {
    id.parse::<UserId>()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid user id"))
}

pub async fn register_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::RegisterUserRequest>,
) -> axum::response::Response {
    let actor = match errors::require_actor(&principal) {
        Ok(actor) => actor,
        Err(res) => return res,
    };
    let role = match errors::parse_role(&body.role) {
        Ok(role) => role,
        Err(res) => return res,
    };

    match services.register_user(
        &actor,
        tenant.tenant_id(),
        body.email,
        body.display_name,
        role,
    ) {
        Ok(id) => (
            StatusCode::CREATED,
            Json(serde_json::json!({"id": id.to_string()})),
        )
            .into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    let actor = match errors::require_actor(&principal) {
        Ok(actor) => actor,
        Err(res) => return res,
    };

    match services.list_users(&actor, tenant.tenant_id()) {
        Ok(users) => {
            let items = users.into_iter().map(dto::user_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::workflow_error_to_response(e),
    }
}

pub async fn assign_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AssignRoleRequest>,
) -> axum::response::Response {
    let actor = match errors::require_actor(&principal) {
        Ok(actor) => actor,
        Err(res) => return res,
    };
    let user_id = match parse_user_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };
    let role = match errors::parse_role(&body.role) {
        Ok(role) => role,
        Err(res) => return res,
    };

    match services.assign_role(&actor, tenant.tenant_id(), user_id, role) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

pub async fn suspend_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::SuspendUserRequest>,
) -> axum::response::Response {
    let actor = match errors::require_actor(&principal) {
        Ok(actor) => actor,
        Err(res) => return res,
    };
    let user_id = match parse_user_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match services.suspend_user(
        &actor,
        tenant.tenant_id(),
        user_id,
        body.reason.unwrap_or_default(),
    ) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

pub async fn activate_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let actor = match errors::require_actor(&principal) {
        Ok(actor) => actor,
        Err(res) => return res,
    };
    let user_id = match parse_user_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match services.activate_user(&actor, tenant.tenant_id(), user_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}
