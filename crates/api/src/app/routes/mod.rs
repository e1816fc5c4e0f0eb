use axum::{Router, routing::get};

pub mod batches;
pub mod dashboard;
pub mod products;
pub mod system;
pub mod users;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/products", products::router())
        .nest("/batches", batches::router())
        .nest("/dashboard", dashboard::router())
        .nest("/users", users::router())
}
