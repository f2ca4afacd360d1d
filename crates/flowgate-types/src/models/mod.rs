//! Domain models shared across the Flowgate crates.

mod account;
mod job;

pub use account::{AccountConfig, AccountSnapshot, AccountStatus};
pub use job::{
    GenerationKind, GenerationRequest, JobState, Orientation, ProgressPayload, ReferenceImage,
};
