//! Student-ID verification requests

mod memory;
mod model;
mod service;
mod store;

pub use memory::InMemoryVerificationStore;
pub use model::{
    Applicant, ListVerificationsQuery, ReviewOutcome, ReviewVerificationRequest, SubmitOutcome,
    SubmitVerificationRequest, Verification, VerificationStatus,
};
pub use service::{VerificationError, VerificationService};
pub use store::{PgVerificationStore, VerificationStore};
