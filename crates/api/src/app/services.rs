//! Infrastructure wiring: event store, bus, projections, workflow engine.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;

use revamp_auth::policy::{self, Action, Actor};
use revamp_auth::user::{ActivateUser, AssignRole, RegisterUser, SuspendUser};
use revamp_auth::{Role, User, UserCommand};
use revamp_batches::BatchId;
use revamp_core::{AggregateId, TenantId, UserId};
use revamp_events::{EventBus, EventEnvelope, InMemoryEventBus};
use revamp_infra::command_dispatcher::CommandDispatcher;
use revamp_infra::event_store::{EventStore, InMemoryEventStore, StoredEvent};
use revamp_infra::projections::{
    BatchReadModel, ProductReadModel, ReturnsProjection, UserReadModel, UsersProjection,
};
use revamp_infra::read_model::InMemoryTenantStore;
use revamp_infra::workflow::{ReviewWorkflow, WorkflowError};
use revamp_products::ProductId;

#[cfg(feature = "postgres")]
use revamp_infra::event_store::PostgresEventStore;
#[cfg(feature = "postgres")]
use sqlx::PgPool;

type AppStore = Arc<dyn EventStore>;
type AppBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
type AppReturns = ReturnsProjection<
    Arc<InMemoryTenantStore<ProductId, ProductReadModel>>,
    Arc<InMemoryTenantStore<BatchId, BatchReadModel>>,
>;
type AppWorkflow = ReviewWorkflow<
    AppStore,
    AppBus,
    Arc<InMemoryTenantStore<ProductId, ProductReadModel>>,
    Arc<InMemoryTenantStore<BatchId, BatchReadModel>>,
>;
type AppUsers = UsersProjection<Arc<InMemoryTenantStore<UserId, UserReadModel>>>;

pub struct AppServices {
    workflow: Arc<AppWorkflow>,
    dispatcher: Arc<CommandDispatcher<AppStore, AppBus>>,
    users_projection: Arc<AppUsers>,
}

pub async fn build_services() -> AppServices {
    let store = build_event_store().await;
    let bus: AppBus = Arc::new(InMemoryEventBus::new());

    let returns: Arc<AppReturns> = Arc::new(ReturnsProjection::new(
        Arc::new(InMemoryTenantStore::new()),
        Arc::new(InMemoryTenantStore::new()),
    ));
    let users_projection: Arc<AppUsers> = Arc::new(UsersProjection::new(Arc::new(
        InMemoryTenantStore::new(),
    )));

    // Background subscriber: bus -> projections. The workflow engine also
    // applies its own commits inline; cursors make the overlap idempotent.
    {
        let sub = bus.subscribe();
        let returns = returns.clone();
        let users_projection = users_projection.clone();
        tokio::task::spawn_blocking(move || {
            loop {
                match sub.recv() {
                    Ok(env) => {
                        let applied = match env.aggregate_type() {
                            "returns.product" | "returns.batch" => {
                                returns.apply_envelope(&env).map_err(|e| e.to_string())
                            }
                            "auth.user" => {
                                users_projection.apply_envelope(&env).map_err(|e| e.to_string())
                            }
                            _ => Ok(()),
                        };
                        if let Err(e) = applied {
                            tracing::warn!("projection apply failed: {e}");
                        }
                    }
                    Err(_) => break,
                }
            }
        });
    }

    let workflow = Arc::new(ReviewWorkflow::new(
        CommandDispatcher::new(store.clone(), bus.clone()),
        returns,
    ));
    let dispatcher = Arc::new(CommandDispatcher::new(store, bus));

    AppServices {
        workflow,
        dispatcher,
        users_projection,
    }
}

async fn build_event_store() -> AppStore {
    let use_persistent = std::env::var("USE_PERSISTENT_STORES")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false);

    if use_persistent {
        #[cfg(feature = "postgres")]
        {
            let database_url = std::env::var("DATABASE_URL")
                .expect("DATABASE_URL must be set when USE_PERSISTENT_STORES=true");
            let pool = PgPool::connect(&database_url)
                .await
                .expect("failed to connect to Postgres");
            let store = PostgresEventStore::new(pool);
            store
                .ensure_schema()
                .await
                .expect("failed to ensure events schema");
            return Arc::new(store);
        }
        #[cfg(not(feature = "postgres"))]
        {
            tracing::warn!(
                "USE_PERSISTENT_STORES=true but postgres feature not enabled, falling back to in-memory"
            );
        }
    }

    Arc::new(InMemoryEventStore::new())
}

impl AppServices {
    pub fn workflow(&self) -> &Arc<AppWorkflow> {
        &self.workflow
    }

    // ─────────────────────────────────────────────────────────────────────
    // User directory (admin-only)
    // ─────────────────────────────────────────────────────────────────────

    pub fn register_user(
        &self,
        actor: &Actor,
        tenant_id: TenantId,
        email: String,
        display_name: String,
        role: Role,
    ) -> Result<UserId, WorkflowError> {
        policy::check(actor, Action::ManageUsers, None)
            .map_err(|e| WorkflowError::Authorization(e.to_string()))?;

        let agg = AggregateId::new();
        let user_id = UserId::from(agg);
        let cmd = UserCommand::Register(RegisterUser {
            tenant_id,
            user_id,
            email,
            display_name,
            role,
            occurred_at: Utc::now(),
        });
        let committed = self.dispatch_user(tenant_id, agg, cmd)?;
        self.project_users(&committed);
        Ok(user_id)
    }

    pub fn assign_role(
        &self,
        actor: &Actor,
        tenant_id: TenantId,
        user_id: UserId,
        role: Role,
    ) -> Result<(), WorkflowError> {
        policy::check(actor, Action::ManageUsers, None)
            .map_err(|e| WorkflowError::Authorization(e.to_string()))?;

        let cmd = UserCommand::AssignRole(AssignRole {
            tenant_id,
            user_id,
            role,
            actor_role: actor.role.clone(),
            occurred_at: Utc::now(),
        });
        let committed = self.dispatch_user(tenant_id, AggregateId::from(user_id), cmd)?;
        self.project_users(&committed);
        Ok(())
    }

    pub fn suspend_user(
        &self,
        actor: &Actor,
        tenant_id: TenantId,
        user_id: UserId,
        reason: String,
    ) -> Result<(), WorkflowError> {
        policy::check(actor, Action::ManageUsers, None)
            .map_err(|e| WorkflowError::Authorization(e.to_string()))?;

        let cmd = UserCommand::Suspend(SuspendUser {
            tenant_id,
            user_id,
            reason,
            occurred_at: Utc::now(),
        });
        let committed = self.dispatch_user(tenant_id, AggregateId::from(user_id), cmd)?;
        self.project_users(&committed);
        Ok(())
    }

    pub fn activate_user(
        &self,
        actor: &Actor,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<(), WorkflowError> {
        policy::check(actor, Action::ManageUsers, None)
            .map_err(|e| WorkflowError::Authorization(e.to_string()))?;

        let cmd = UserCommand::Activate(ActivateUser {
            tenant_id,
            user_id,
            occurred_at: Utc::now(),
        });
        let committed = self.dispatch_user(tenant_id, AggregateId::from(user_id), cmd)?;
        self.project_users(&committed);
        Ok(())
    }

    pub fn list_users(
        &self,
        actor: &Actor,
        tenant_id: TenantId,
    ) -> Result<Vec<UserReadModel>, WorkflowError> {
        policy::check(actor, Action::ManageUsers, None)
            .map_err(|e| WorkflowError::Authorization(e.to_string()))?;
        Ok(self.users_projection.list(tenant_id))
    }

    fn dispatch_user(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        command: UserCommand,
    ) -> Result<Vec<StoredEvent>, WorkflowError> {
        self.dispatcher
            .dispatch::<User>(tenant_id, aggregate_id, "auth.user", command, |_, id| {
                User::empty(UserId::from(id))
            })
            .map_err(WorkflowError::from)
    }

    fn project_users(&self, committed: &[StoredEvent]) {
        for stored in committed {
            if let Err(e) = self.users_projection.apply_envelope(&stored.to_envelope()) {
                tracing::warn!("users read model apply failed: {e}");
            }
        }
    }
}
