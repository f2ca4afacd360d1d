//! Typed error definitions for Flowgate.
//!
//! This module provides a structured error hierarchy with specific error types
//! for each stage of the orchestration pipeline. All errors are designed to be:
//!
//! - **Serializable** for API responses via serde
//! - **Displayable** for logging via Display trait
//! - **Matchable** for error handling logic via enum variants
//! - **Composable** via thiserror derive macros

mod admission;
mod job;
mod refresh;
mod store;

pub use admission::AdmissionError;
pub use job::{JobError, TerminalReason};
pub use refresh::RefreshError;
pub use store::StoreError;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type that wraps all domain-specific errors.
///
/// Use this when you need a single error type that can represent
/// any Flowgate error.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "domain", content = "error")]
pub enum TypedError {
    /// Wraps an admission/selection error
    #[error("Admission error: {0}")]
    Admission(#[from] AdmissionError),

    /// Wraps a token refresh error
    #[error("Refresh error: {0}")]
    Refresh(#[from] RefreshError),

    /// Wraps a job lifecycle error
    #[error("Job error: {0}")]
    Job(#[from] JobError),

    /// Wraps a credential store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Standard Result type using TypedError.
pub type Result<T> = std::result::Result<T, TypedError>;
