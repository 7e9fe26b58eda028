pub mod client;
pub mod error;
pub mod registry;
pub mod watch;

pub use client::StateStore;
pub use error::StoreError;
pub use registry::Registry;
