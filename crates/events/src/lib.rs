//! `revamp-events` — domain event abstractions.
//!
//! Events are immutable facts. This crate carries the trait and the
//! transport-agnostic plumbing shared by every domain crate, with no storage
//! assumptions.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
