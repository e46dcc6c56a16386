//! Error types for provisioning runs.
//!
//! Remote errors are categorized so the retry policy can tell transient
//! failures from permanent ones. Run-level errors carry the partial
//! report so callers can see exactly what was and was not done.

use crate::executor::{ApplyReport, DestroyReport};
use crate::types::ResourceId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for provisioning operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of provider errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// Network or throttling issue (transient, retryable)
    Transient,
    /// Target or one of its dependencies does not exist
    NotFound,
    /// Target is still referenced or locked by another resource
    Conflict,
    /// The provider rejected the request as invalid
    Validation,
}

impl RemoteErrorKind {
    /// Whether this category is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Get a user-friendly description of this category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Transient => "Transient provider error",
            Self::NotFound => "Resource not found",
            Self::Conflict => "Resource conflict",
            Self::Validation => "Rejected by provider",
        }
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A failed provider call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind} on {resource}: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub resource: ResourceId,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, resource: &ResourceId, message: impl Into<String>) -> Self {
        Self {
            kind,
            resource: resource.clone(),
            message: message.into(),
        }
    }

    pub fn transient(resource: &ResourceId, message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Transient, resource, message)
    }

    pub fn not_found(resource: &ResourceId, message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::NotFound, resource, message)
    }

    pub fn conflict(resource: &ResourceId, message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Conflict, resource, message)
    }

    pub fn validation(resource: &ResourceId, message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Validation, resource, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Errors that can end a provisioning run.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad input graph, detected before any remote call
    #[error("invalid declaration: {0}")]
    Declaration(String),

    /// Dependency cycle, detected before any remote call
    #[error("dependency cycle: {}", format_cycle(.members))]
    Cycle {
        /// Resources on the cycle, in edge order
        members: Vec<ResourceId>,
    },

    /// A single provider call failed
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// One or more resources failed (or were never attempted) during apply
    #[error("apply incomplete: {0}")]
    PartialApply(Box<ApplyReport>),

    /// One or more resources could not be deleted
    #[error("destroy incomplete: {0}")]
    PartialDestroy(Box<DestroyReport>),

    /// A lifecycle operation is not valid for the target right now
    #[error("cannot operate on {resource}: {reason}")]
    InvalidTransition { resource: ResourceId, reason: String },

    /// The caller declined a confirmation
    #[error("aborted: confirmation declined")]
    Aborted,

    /// Worker threads for a concurrent run could not be started
    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    /// Whether the error was raised before any remote call was made.
    pub fn is_pre_execution(&self) -> bool {
        matches!(self, Self::Declaration(_) | Self::Cycle { .. } | Self::Aborted)
    }
}

fn format_cycle(members: &[ResourceId]) -> String {
    let mut names: Vec<String> = members.iter().map(ToString::to_string).collect();
    if let Some(first) = names.first().cloned() {
        names.push(first);
    }
    names.join(" -> ")
}
