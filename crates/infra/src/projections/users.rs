//! Actor directory read model.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use serde_json::Value as JsonValue;
use thiserror::Error;

use revamp_auth::{Role, UserEvent, UserStatus};
use revamp_core::{AggregateId, TenantId, UserId};
use revamp_events::EventEnvelope;

use crate::read_model::TenantStore;

/// Queryable user read model (directory entry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserReadModel {
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub status: UserStatus,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum UsersProjectionError {
    #[error("failed to deserialize user event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Projection over `auth.user` streams.
#[derive(Debug)]
pub struct UsersProjection<S>
where
    S: TenantStore<UserId, UserReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
    /// Serializes event application (inline write path + bus subscriber).
    apply_lock: Mutex<()>,
}

impl<S> UsersProjection<S>
where
    S: TenantStore<UserId, UserReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
            apply_lock: Mutex::new(()),
        }
    }

    pub fn get(&self, tenant_id: TenantId, user_id: &UserId) -> Option<UserReadModel> {
        self.store.get(tenant_id, user_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<UserReadModel> {
        self.store.list(tenant_id)
    }

    fn cursor(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> u64 {
        match self.cursors.read() {
            Ok(cursors) => *cursors
                .get(&CursorKey { tenant_id, aggregate_id })
                .unwrap_or(&0),
            Err(_) => 0,
        }
    }

    fn update_cursor(&self, tenant_id: TenantId, aggregate_id: AggregateId, sequence_number: u64) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert(CursorKey { tenant_id, aggregate_id }, sequence_number);
        }
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), UsersProjectionError> {
        if envelope.aggregate_type() != "auth.user" {
            return Ok(());
        }

        let _guard = self
            .apply_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let last = self.cursor(tenant_id, aggregate_id);
        if seq == 0 {
            return Err(UsersProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 && last != 0 {
            return Err(UsersProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let ev: UserEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| UsersProjectionError::Deserialize(e.to_string()))?;

        let (event_tenant, user_id) = match &ev {
            UserEvent::Registered(e) => (e.tenant_id, e.user_id),
            UserEvent::RoleAssigned(e) => (e.tenant_id, e.user_id),
            UserEvent::Suspended(e) => (e.tenant_id, e.user_id),
            UserEvent::Activated(e) => (e.tenant_id, e.user_id),
        };
        if event_tenant != tenant_id {
            return Err(UsersProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        if user_id.as_uuid() != aggregate_id.as_uuid() {
            return Err(UsersProjectionError::TenantIsolation(
                "event user_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            UserEvent::Registered(e) => {
                self.store.upsert(
                    tenant_id,
                    e.user_id,
                    UserReadModel {
                        user_id: e.user_id,
                        email: e.email,
                        display_name: e.display_name,
                        role: e.role,
                        status: UserStatus::Active,
                    },
                );
            }
            UserEvent::RoleAssigned(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.user_id) {
                    rm.role = e.role;
                    self.store.upsert(tenant_id, e.user_id, rm);
                }
            }
            UserEvent::Suspended(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.user_id) {
                    rm.status = UserStatus::Suspended;
                    self.store.upsert(tenant_id, e.user_id, rm);
                }
            }
            UserEvent::Activated(e) => {
                if let Some(mut rm) = self.store.get(tenant_id, &e.user_id) {
                    rm.status = UserStatus::Active;
                    self.store.upsert(tenant_id, e.user_id, rm);
                }
            }
        }

        self.update_cursor(tenant_id, aggregate_id, seq);
        Ok(())
    }
}
