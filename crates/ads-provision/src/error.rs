//! Error types for control-plane calls and provisioning runs.

use std::time::Duration;

use ads_core::config::ConfigError;
use thiserror::Error;

use crate::report::Step;

/// Result type alias for control-plane admin calls.
pub type AdminResult<T> = Result<T, AdminError>;

/// A control-plane failure, already classified by the collaborator that saw it.
///
/// Implementations of the admin traits map their native error codes onto
/// these kinds; raw transport errors never cross the trait boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdminError {
    #[error("{op}: already exists: {message}")]
    AlreadyExists { op: &'static str, message: String },

    #[error("{op}: not found: {message}")]
    NotFound { op: &'static str, message: String },

    #[error("{op}: not ready: {message}")]
    NotReady { op: &'static str, message: String },

    #[error("{op}: throttled: {message}")]
    Throttled { op: &'static str, message: String },

    #[error("{op}: access denied: {message}")]
    AccessDenied { op: &'static str, message: String },

    #[error("{op}: invalid request: {message}")]
    InvalidRequest { op: &'static str, message: String },

    #[error("{op}: timed out after {waited:?}: {message}")]
    Timeout {
        op: &'static str,
        waited: Duration,
        message: String,
    },

    #[error("{op}: transport error: {message}")]
    Transport { op: &'static str, message: String },

    #[error("{op}: backend error: {message}")]
    Backend { op: &'static str, message: String },
}

/// How a failure affects the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The desired state already holds; treat as success.
    AlreadySatisfied,
    /// The control plane is still converging; retry within a bound.
    Transient,
    /// Anything else.
    Fatal,
}

impl AdminError {
    pub fn class(&self) -> ErrorClass {
        match self {
            AdminError::AlreadyExists { .. } => ErrorClass::AlreadySatisfied,
            AdminError::NotReady { .. } | AdminError::Throttled { .. } => ErrorClass::Transient,
            AdminError::NotFound { .. }
            | AdminError::AccessDenied { .. }
            | AdminError::InvalidRequest { .. }
            | AdminError::Timeout { .. }
            | AdminError::Transport { .. }
            | AdminError::Backend { .. } => ErrorClass::Fatal,
        }
    }

    pub fn is_already_satisfied(&self) -> bool {
        self.class() == ErrorClass::AlreadySatisfied
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    pub fn already_exists(op: &'static str, message: impl Into<String>) -> Self {
        AdminError::AlreadyExists {
            op,
            message: message.into(),
        }
    }

    pub fn not_found(op: &'static str, message: impl Into<String>) -> Self {
        AdminError::NotFound {
            op,
            message: message.into(),
        }
    }

    pub fn not_ready(op: &'static str, message: impl Into<String>) -> Self {
        AdminError::NotReady {
            op,
            message: message.into(),
        }
    }

    pub fn invalid(op: &'static str, message: impl Into<String>) -> Self {
        AdminError::InvalidRequest {
            op,
            message: message.into(),
        }
    }

    pub fn backend(op: &'static str, message: impl Into<String>) -> Self {
        AdminError::Backend {
            op,
            message: message.into(),
        }
    }
}

/// A failure that halts the whole run.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("step {step} failed: {source}")]
    Blocking {
        step: Step,
        #[source]
        source: AdminError,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl ProvisionError {
    pub fn blocking(step: Step, source: AdminError) -> Self {
        ProvisionError::Blocking { step, source }
    }
}
