//! User aggregate for identity management (event-sourced).
//!
//! # Invariants
//! - A user belongs to exactly one tenant (tenant_id is immutable after creation).
//! - A user carries exactly one role at a time; reassignment replaces it.
//! - Suspended users cannot be assigned new roles.
//! - Role assignment cannot escalate above the assigning actor's own level.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use revamp_core::{Aggregate, AggregateRoot, DomainError, TenantId, UserId};
use revamp_events::Event;

use crate::policy::role_level;
use crate::Role;

/// User account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    /// User is active and can authenticate/transact.
    #[default]
    Active,
    /// User is suspended and cannot authenticate.
    Suspended,
}

impl core::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            UserStatus::Active => write!(f, "active"),
            UserStatus::Suspended => write!(f, "suspended"),
        }
    }
}

/// Aggregate root: User (actor directory entry).
#[derive(Debug, Clone)]
pub struct User {
    id: UserId,
    tenant_id: Option<TenantId>,
    email: String,
    display_name: String,
    role: Role,
    status: UserStatus,
    version: u64,
    created: bool,
}

impl User {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: UserId) -> Self {
        Self {
            id,
            tenant_id: None,
            email: String::new(),
            display_name: String::new(),
            role: Role::vendor(),
            status: UserStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> UserId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn status(&self) -> UserStatus {
        self.status
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

    fn ensure_not_suspended(&self) -> Result<(), DomainError> {
        if self.status == UserStatus::Suspended {
            return Err(DomainError::invariant("user is suspended"));
        }
        Ok(())
    }
}

impl AggregateRoot for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Command: register a new user with an initial role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterUser {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

/// Command: replace a user's role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignRole {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub role: Role,
    /// Role of the actor performing this operation (for the escalation check).
    pub actor_role: Role,
    pub occurred_at: DateTime<Utc>,
}

/// Command: suspend a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspendUser {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: reactivate a suspended user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateUser {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserCommand {
    Register(RegisterUser),
    AssignRole(AssignRole),
    Suspend(SuspendUser),
    Activate(ActivateUser),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRegistered {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRoleAssigned {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSuspended {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserActivated {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserEvent {
    Registered(UserRegistered),
    RoleAssigned(UserRoleAssigned),
    Suspended(UserSuspended),
    Activated(UserActivated),
}

impl Event for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::Registered(_) => "auth.user.registered",
            UserEvent::RoleAssigned(_) => "auth.user.role_assigned",
            UserEvent::Suspended(_) => "auth.user.suspended",
            UserEvent::Activated(_) => "auth.user.activated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            UserEvent::Registered(e) => e.occurred_at,
            UserEvent::RoleAssigned(e) => e.occurred_at,
            UserEvent::Suspended(e) => e.occurred_at,
            UserEvent::Activated(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate implementation
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for User {
    type Command = UserCommand;
    type Event = UserEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            UserEvent::Registered(e) => {
                self.id = e.user_id;
                self.tenant_id = Some(e.tenant_id);
                self.email = e.email.clone();
                self.display_name = e.display_name.clone();
                self.role = e.role.clone();
                self.status = UserStatus::Active;
                self.created = true;
            }
            UserEvent::RoleAssigned(e) => {
                self.role = e.role.clone();
            }
            UserEvent::Suspended(_) => {
                self.status = UserStatus::Suspended;
            }
            UserEvent::Activated(_) => {
                self.status = UserStatus::Active;
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            UserCommand::Register(cmd) => self.handle_register(cmd),
            UserCommand::AssignRole(cmd) => self.handle_assign_role(cmd),
            UserCommand::Suspend(cmd) => self.handle_suspend(cmd),
            UserCommand::Activate(cmd) => self.handle_activate(cmd),
        }
    }
}

impl User {
    fn handle_register(&self, cmd: &RegisterUser) -> Result<Vec<UserEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("user already exists"));
        }
        if cmd.email.trim().is_empty() || !cmd.email.contains('@') {
            return Err(DomainError::validation("invalid email format"));
        }
        if cmd.display_name.trim().is_empty() {
            return Err(DomainError::validation("display name cannot be empty"));
        }
        if role_level(&cmd.role) == 0 {
            return Err(DomainError::validation(format!(
                "unknown role: {}",
                cmd.role
            )));
        }

        Ok(vec![UserEvent::Registered(UserRegistered {
            tenant_id: cmd.tenant_id,
            user_id: cmd.user_id,
            email: cmd.email.trim().to_lowercase(),
            display_name: cmd.display_name.trim().to_string(),
            role: cmd.role.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_assign_role(&self, cmd: &AssignRole) -> Result<Vec<UserEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_not_suspended()?;

        if role_level(&cmd.role) == 0 {
            return Err(DomainError::validation(format!(
                "unknown role: {}",
                cmd.role
            )));
        }

        // Privilege escalation guard: nobody hands out a role above their own.
        if role_level(&cmd.role) > role_level(&cmd.actor_role) {
            return Err(DomainError::Unauthorized);
        }

        if self.role == cmd.role {
            return Ok(vec![]);
        }

        Ok(vec![UserEvent::RoleAssigned(UserRoleAssigned {
            tenant_id: cmd.tenant_id,
            user_id: cmd.user_id,
            role: cmd.role.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_suspend(&self, cmd: &SuspendUser) -> Result<Vec<UserEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;

        if self.status == UserStatus::Suspended {
            return Ok(vec![]);
        }

        Ok(vec![UserEvent::Suspended(UserSuspended {
            tenant_id: cmd.tenant_id,
            user_id: cmd.user_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_activate(&self, cmd: &ActivateUser) -> Result<Vec<UserEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_tenant(cmd.tenant_id)?;

        if self.status == UserStatus::Active {
            return Ok(vec![]);
        }

        Ok(vec![UserEvent::Activated(UserActivated {
            tenant_id: cmd.tenant_id,
            user_id: cmd.user_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revamp_events::execute;

    fn register(user: &mut User, tenant_id: TenantId, role: Role) {
        let cmd = UserCommand::Register(RegisterUser {
            tenant_id,
            user_id: user.id_typed(),
            email: "Vendor@Example.com".to_string(),
            display_name: "Vendor One".to_string(),
            role,
            occurred_at: Utc::now(),
        });
        execute(user, &cmd).unwrap();
    }

    #[test]
    fn register_normalizes_email() {
        let mut user = User::empty(UserId::new());
        register(&mut user, TenantId::new(), Role::vendor());
        assert_eq!(user.email(), "vendor@example.com");
        assert_eq!(user.status(), UserStatus::Active);
    }

    #[test]
    fn register_rejects_unknown_role() {
        let user = User::empty(UserId::new());
        let cmd = UserCommand::Register(RegisterUser {
            tenant_id: TenantId::new(),
            user_id: user.id_typed(),
            email: "a@b.c".to_string(),
            display_name: "A".to_string(),
            role: Role::new("intern"),
            occurred_at: Utc::now(),
        });
        assert!(matches!(
            user.handle(&cmd),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn assign_role_blocks_escalation() {
        let tenant_id = TenantId::new();
        let mut user = User::empty(UserId::new());
        register(&mut user, tenant_id, Role::vendor());

        let cmd = UserCommand::AssignRole(AssignRole {
            tenant_id,
            user_id: user.id_typed(),
            role: Role::superadmin(),
            actor_role: Role::admin(),
            occurred_at: Utc::now(),
        });
        assert_eq!(user.handle(&cmd), Err(DomainError::Unauthorized));
    }

    #[test]
    fn suspended_user_cannot_get_new_role() {
        let tenant_id = TenantId::new();
        let mut user = User::empty(UserId::new());
        register(&mut user, tenant_id, Role::vendor());

        let cmd = UserCommand::Suspend(SuspendUser {
            tenant_id,
            user_id: user.id_typed(),
            reason: "policy violation".to_string(),
            occurred_at: Utc::now(),
        });
        execute(&mut user, &cmd).unwrap();
        assert_eq!(user.status(), UserStatus::Suspended);

        let cmd = UserCommand::AssignRole(AssignRole {
            tenant_id,
            user_id: user.id_typed(),
            role: Role::admin(),
            actor_role: Role::superadmin(),
            occurred_at: Utc::now(),
        });
        assert!(matches!(
            user.handle(&cmd),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn reassigning_same_role_is_a_noop() {
        let tenant_id = TenantId::new();
        let mut user = User::empty(UserId::new());
        register(&mut user, tenant_id, Role::vendor());

        let cmd = UserCommand::AssignRole(AssignRole {
            tenant_id,
            user_id: user.id_typed(),
            role: Role::vendor(),
            actor_role: Role::superadmin(),
            occurred_at: Utc::now(),
        });
        assert!(user.handle(&cmd).unwrap().is_empty());
    }
}
