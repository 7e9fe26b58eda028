pub mod config;
pub mod coredump;
pub mod crd;
pub mod identity;
pub mod pod;
pub mod quantity;
pub mod quota;
pub mod validate;

pub use quantity::Quantity;
