//! Infrastructure layer: event store, command dispatch, read models,
//! projections, and the review workflow engine.

pub mod command_dispatcher;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod workflow;

pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use workflow::{DashboardSummary, NewBatch, ReviewWorkflow, WorkflowError};
