pub mod quota;
pub mod reconciler;

pub use quota::QuotaController;
pub use reconciler::{AdmissionDecision, AdmitOutcome, QuotaReconciler, check_admission};
