pub mod client;
pub mod error;
pub mod handlers;
pub mod server;

use pkg_state::Registry;

/// Shared application state injected into all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
}
