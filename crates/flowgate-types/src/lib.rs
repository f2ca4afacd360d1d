//! # Flowgate Types
//!
//! Core types, models, and error definitions for Flowgate.
//!
//! This crate provides the foundational type system for the Flowgate gateway:
//!
//! - **`error`** - Typed error hierarchy for admission, refresh, jobs, and the store
//! - **`models`** - Domain models (Account, Job, GenerationRequest)
//! - **`protocol`** - OpenAI chat-completions wire types (boundary adapter)
//!
//! All types are designed to be:
//! - **Serializable** via serde for API responses and config
//! - **Clone** for cheap sharing across async boundaries
//! - **PartialEq** for testing and comparison

pub mod error;
pub mod models;
pub mod protocol;

// Re-export error types for convenience
pub use error::{AdmissionError, JobError, RefreshError, Result, StoreError, TypedError};

// Re-export core model types
pub use models::{
    AccountConfig, AccountSnapshot, AccountStatus, GenerationKind, GenerationRequest, JobState,
    Orientation, ProgressPayload,
};
