use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use revamp_auth::policy::Actor;
use revamp_auth::Role;
use revamp_batches::ReviewDecision;
use revamp_core::Money;
use revamp_infra::workflow::WorkflowError;
use revamp_products::{Condition, QualityRating};

use crate::context::PrincipalContext;

/// Map an engine failure onto the boundary's HTTP contract.
pub fn workflow_error_to_response(err: WorkflowError) -> axum::response::Response {
    match err {
        WorkflowError::Authorization(msg) => {
            json_error(StatusCode::FORBIDDEN, "authorization_error", msg)
        }
        WorkflowError::InvalidTransition(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invalid_transition", msg)
        }
        WorkflowError::Validation(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        WorkflowError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        WorkflowError::ConcurrentModification(msg) => {
            json_error(StatusCode::CONFLICT, "concurrent_modification", msg)
        }
        WorkflowError::Storage(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", msg)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Resolve the workflow actor for the request, or a 403.
pub fn require_actor(principal: &PrincipalContext) -> Result<Actor, axum::response::Response> {
    principal.actor().ok_or_else(|| {
        json_error(
            StatusCode::FORBIDDEN,
            "authorization_error",
            "no known role granted",
        )
    })
}

pub fn parse_condition(s: &str) -> Result<Condition, axum::response::Response> {
    match s {
        "new" => Ok(Condition::New),
        "like_new" => Ok(Condition::LikeNew),
        "very_good" => Ok(Condition::VeryGood),
        "good" => Ok(Condition::Good),
        "acceptable" => Ok(Condition::Acceptable),
        _ => Err(json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "condition must be one of: new, like_new, very_good, good, acceptable",
        )),
    }
}

pub fn parse_rating(s: &str) -> Result<QualityRating, axum::response::Response> {
    match s {
        "A" => Ok(QualityRating::A),
        "B" => Ok(QualityRating::B),
        "C" => Ok(QualityRating::C),
        _ => Err(json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "rating must be one of: A, B, C",
        )),
    }
}

pub fn parse_decision(s: &str) -> Result<ReviewDecision, axum::response::Response> {
    match s {
        "approved" => Ok(ReviewDecision::Approved),
        "rejected" => Ok(ReviewDecision::Rejected),
        _ => Err(json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "status must be one of: approved, rejected",
        )),
    }
}

pub fn parse_role(s: &str) -> Result<Role, axum::response::Response> {
    match s {
        "vendor" => Ok(Role::vendor()),
        "admin" => Ok(Role::admin()),
        "superadmin" => Ok(Role::superadmin()),
        _ => Err(json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "role must be one of: vendor, admin, superadmin",
        )),
    }
}

pub fn parse_money(field: &str, s: &str) -> Result<Money, axum::response::Response> {
    s.parse().map_err(|_| {
        json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            format!("{field} must be a non-negative decimal amount with at most two fractional digits"),
        )
    })
}
