//! Read-model builders fed by the event bus.

pub mod returns;
pub mod users;

pub use returns::{BatchReadModel, ProductReadModel, ReturnsProjection, ReturnsProjectionError};
pub use users::{UserReadModel, UsersProjection, UsersProjectionError};
