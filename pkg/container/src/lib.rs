pub mod cri;
pub mod docker;
pub mod inspect;
pub mod naming;
pub mod runtime;

pub use inspect::{ContainerHandle, ContainerInspector, IdentityError, ProcessTable};
pub use runtime::{RuntimeKind, inspector_for};
