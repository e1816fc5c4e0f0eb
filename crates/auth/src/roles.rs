use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role identifier used for RBAC.
///
/// Roles are intentionally opaque strings at this layer; mapping roles to
/// levels and permissions is done by the policy module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// The vendor role: owns products and batches, initiates submission.
    pub fn vendor() -> Self {
        Self::new("vendor")
    }

    /// The admin role: renders review decisions and quality ratings.
    pub fn admin() -> Self {
        Self::new("admin")
    }

    /// The superadmin role: admin plus user/role administration.
    pub fn superadmin() -> Self {
        Self::new("superadmin")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
