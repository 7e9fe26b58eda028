pub mod error;
pub mod matcher;
pub mod pipeline;
pub mod storage;
pub mod validator;

pub use error::DumpError;
pub use matcher::{ProcessMatch, ProcessMatcher};
pub use pipeline::{CoredumpRegistrar, DumpEvent, DumpOutcome, DumpPipeline};
pub use storage::{DumpStorage, PersistedDump};
pub use validator::{IdentityValidator, PodLookup, Validation};
