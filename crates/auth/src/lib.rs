//! `revamp-auth` — authentication/authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage. All
//! authorization logic for the review workflow lives in [`policy`]; nothing
//! else in the workspace makes allow/deny decisions.

pub mod claims;
pub mod permissions;
pub mod policy;
pub mod principal;
pub mod roles;
pub mod user;

pub use claims::{
    validate_claims, Hs256JwtValidator, JwtClaims, JwtValidator, TokenValidationError,
};
pub use permissions::Permission;
pub use policy::{Action, Actor, AuthzError};
pub use principal::PrincipalId;
pub use roles::Role;
pub use user::{User, UserCommand, UserEvent, UserStatus};
