//! Central access policy for the review workflow.
//!
//! Every workflow operation asks this module one question: may `actor`
//! perform `action` on a resource owned by `owner`? Authorization logic
//! lives here and nowhere else, as a pure (actor, action, resource) check.
//! The actor is always passed in explicitly; there is no ambient
//! "current user" anywhere in the workspace.

use std::collections::HashSet;

use thiserror::Error;

use revamp_core::UserId;

use crate::{Permission, Role};

/// Authorization failure (pure policy decision, no IO).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),

    #[error("forbidden: not the owner of the resource")]
    NotOwner,
}

/// An authenticated actor, resolved from request context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    /// Resolve an actor from a set of granted roles, keeping the most
    /// privileged one. Returns `None` when no known role is present.
    pub fn from_roles(user_id: UserId, roles: &[Role]) -> Option<Self> {
        roles
            .iter()
            .filter(|r| role_level(r) > 0)
            .max_by_key(|r| role_level(r))
            .map(|role| Self::new(user_id, role.clone()))
    }

    pub fn is_vendor(&self) -> bool {
        self.role.as_str() == "vendor"
    }

    pub fn is_admin(&self) -> bool {
        self.role.as_str() == "admin"
    }

    pub fn is_superadmin(&self) -> bool {
        self.role.as_str() == "superadmin"
    }

    /// Reviewers (admin or superadmin) act on any tenant resource.
    pub fn is_reviewer(&self) -> bool {
        self.is_admin() || self.is_superadmin()
    }
}

/// Numeric privilege level of a role (higher wins).
pub fn role_level(role: &Role) -> u8 {
    match role.as_str() {
        "superadmin" => 100,
        "admin" => 50,
        "vendor" => 10,
        _ => 0,
    }
}

/// Static role → permission mapping.
///
/// Mirrors the RBAC rows of the platform: vendors get the returns-domain
/// permissions scoped to their own resources, admins get the wildcard.
pub fn permissions_for_role(role: &Role) -> Vec<Permission> {
    match role.as_str() {
        "admin" | "superadmin" => vec![Permission::new("*")],
        "vendor" => vec![
            Permission::new("returns.products.submit"),
            Permission::new("returns.products.view"),
            Permission::new("returns.products.edit"),
            Permission::new("returns.products.delete"),
            Permission::new("returns.products.restore"),
            Permission::new("returns.batches.create"),
            Permission::new("returns.batches.view"),
            Permission::new("returns.batches.send_for_review"),
            Permission::new("returns.batches.delete"),
        ],
        _ => Vec::new(),
    }
}

/// Workflow actions subject to authorization.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Action {
    SubmitProduct,
    ViewProduct,
    EditProduct,
    DeleteProduct,
    RestoreProduct,
    RateProduct,
    CreateBatch,
    ViewBatch,
    SendBatchForReview,
    DecideBatchReview,
    DeleteBatch,
    ManageUsers,
}

impl Action {
    /// The permission gating this action.
    pub fn required_permission(&self) -> Permission {
        match self {
            Action::SubmitProduct => Permission::new("returns.products.submit"),
            Action::ViewProduct => Permission::new("returns.products.view"),
            Action::EditProduct => Permission::new("returns.products.edit"),
            Action::DeleteProduct => Permission::new("returns.products.delete"),
            Action::RestoreProduct => Permission::new("returns.products.restore"),
            Action::RateProduct => Permission::new("returns.products.rate"),
            Action::CreateBatch => Permission::new("returns.batches.create"),
            Action::ViewBatch => Permission::new("returns.batches.view"),
            Action::SendBatchForReview => Permission::new("returns.batches.send_for_review"),
            Action::DecideBatchReview => Permission::new("returns.batches.review"),
            Action::DeleteBatch => Permission::new("returns.batches.delete"),
            Action::ManageUsers => Permission::new("auth.users.manage"),
        }
    }

    /// Whether non-reviewer actors must own the target resource.
    fn owner_scoped(&self) -> bool {
        !matches!(self, Action::SubmitProduct | Action::CreateBatch | Action::ManageUsers)
    }
}

/// May `actor` perform `action` on a resource owned by `owner`?
///
/// Two gates, in order:
/// 1. the actor's role must grant the action's permission;
/// 2. for owner-scoped actions, non-reviewer actors must own the resource.
///
/// Callers that answer reads should translate [`AuthzError::NotOwner`] into
/// a not-found response so resource existence does not leak across vendors.
pub fn check(actor: &Actor, action: Action, owner: Option<UserId>) -> Result<(), AuthzError> {
    let granted: HashSet<String> = permissions_for_role(&actor.role)
        .iter()
        .map(|p| p.as_str().to_string())
        .collect();

    let required = action.required_permission();
    if !granted.contains("*") && !granted.contains(required.as_str()) {
        return Err(AuthzError::Forbidden(required.as_str().to_string()));
    }

    if action.owner_scoped() && !actor.is_reviewer() && owner != Some(actor.user_id) {
        return Err(AuthzError::NotOwner);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vendor() -> Actor {
        Actor::new(UserId::new(), Role::vendor())
    }

    fn admin() -> Actor {
        Actor::new(UserId::new(), Role::admin())
    }

    #[test]
    fn vendor_may_act_on_own_resources() {
        let actor = vendor();
        assert!(check(&actor, Action::EditProduct, Some(actor.user_id)).is_ok());
        assert!(check(&actor, Action::SendBatchForReview, Some(actor.user_id)).is_ok());
    }

    #[test]
    fn vendor_may_not_act_on_foreign_resources() {
        let actor = vendor();
        let err = check(&actor, Action::EditProduct, Some(UserId::new())).unwrap_err();
        assert_eq!(err, AuthzError::NotOwner);
    }

    #[test]
    fn vendor_may_not_review_or_rate() {
        let actor = vendor();
        // Not even on their own resources.
        assert!(matches!(
            check(&actor, Action::DecideBatchReview, Some(actor.user_id)),
            Err(AuthzError::Forbidden(_))
        ));
        assert!(matches!(
            check(&actor, Action::RateProduct, Some(actor.user_id)),
            Err(AuthzError::Forbidden(_))
        ));
    }

    #[test]
    fn admin_may_act_on_any_resource() {
        let actor = admin();
        assert!(check(&actor, Action::RateProduct, Some(UserId::new())).is_ok());
        assert!(check(&actor, Action::DecideBatchReview, Some(UserId::new())).is_ok());
        assert!(check(&actor, Action::DeleteBatch, Some(UserId::new())).is_ok());
    }

    #[test]
    fn unknown_role_has_no_permissions() {
        let actor = Actor::new(UserId::new(), Role::new("intern"));
        assert!(matches!(
            check(&actor, Action::SubmitProduct, None),
            Err(AuthzError::Forbidden(_))
        ));
    }

    #[test]
    fn most_privileged_role_wins() {
        let user_id = UserId::new();
        let actor =
            Actor::from_roles(user_id, &[Role::vendor(), Role::admin()]).unwrap();
        assert!(actor.is_admin());

        assert!(Actor::from_roles(user_id, &[Role::new("intern")]).is_none());
    }
}
