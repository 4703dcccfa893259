//! The closed error taxonomy for the governance core.
//!
//! Every public, fallible operation returns `Result<T, GovernanceError>`.
//! Internal helpers that chain several fallible steps may use
//! `anyhow::Result` and convert to a `GovernanceError` at the module
//! boundary — the same layering `ccswarm` uses between internal
//! `anyhow` helpers and its public `CCSwarmError`-returning API
//! (`crates/ccswarm/src/error.rs`).

use serde::{Deserialize, Serialize};

/// The closed set of error codes surfaced to callers. Kept separate from
/// `GovernanceError` so it can be serialized into the response envelope
/// without dragging the `Display` message or source chain along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    MissingParameter,
    InvalidParameter,
    MissingConfig,
    AuthFailed,
    IdentityInUse,
    IdentityExists,
    LockUnavailable,
    Timeout,
    RateLimited,
    NotFound,
    InvariantViolated,
    DependencyMissing,
    InternalError,
}

/// Optional recovery guidance attached to an error envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recovery {
    pub action: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_tools: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum GovernanceError {
    #[error("missing parameter: {0}")]
    MissingParameter(String),

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("missing configuration key: {0}")]
    MissingConfig(String),

    #[error("authentication failed")]
    AuthFailed,

    #[error("identity already in use")]
    IdentityInUse,

    #[error("identity already exists")]
    IdentityExists,

    #[error("lock unavailable for identity {identity_id}: {reason}")]
    LockUnavailable { identity_id: String, reason: String },

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: std::time::Duration },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invariant violated: {0}")]
    InvariantViolated(String),

    #[error("dependency unavailable: {0}")]
    DependencyMissing(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl GovernanceError {
    pub fn code(&self) -> ErrorCode {
        match self {
            GovernanceError::MissingParameter(_) => ErrorCode::MissingParameter,
            GovernanceError::InvalidParameter { .. } => ErrorCode::InvalidParameter,
            GovernanceError::MissingConfig(_) => ErrorCode::MissingConfig,
            GovernanceError::AuthFailed => ErrorCode::AuthFailed,
            GovernanceError::IdentityInUse => ErrorCode::IdentityInUse,
            GovernanceError::IdentityExists => ErrorCode::IdentityExists,
            GovernanceError::LockUnavailable { .. } => ErrorCode::LockUnavailable,
            GovernanceError::Timeout(_) => ErrorCode::Timeout,
            GovernanceError::RateLimited { .. } => ErrorCode::RateLimited,
            GovernanceError::NotFound(_) => ErrorCode::NotFound,
            GovernanceError::InvariantViolated(_) => ErrorCode::InvariantViolated,
            GovernanceError::DependencyMissing(_) => ErrorCode::DependencyMissing,
            GovernanceError::Internal(_) | GovernanceError::Io(_) | GovernanceError::Serde(_) => {
                ErrorCode::InternalError
            }
        }
    }

    /// Default recovery guidance per error kind; lock contention in
    /// particular always comes with an actionable hint.
    pub fn recovery(&self) -> Option<Recovery> {
        match self {
            GovernanceError::LockUnavailable { .. } => Some(Recovery {
                action: "wait and retry; check for other sessions holding this identity".into(),
                related_tools: vec!["status".into(), "health_check".into()],
            }),
            GovernanceError::IdentityInUse => Some(Recovery {
                action: "choose a different name or re-authenticate with the existing session"
                    .into(),
                related_tools: vec!["onboard".into()],
            }),
            GovernanceError::RateLimited { .. } => Some(Recovery {
                action: "retry after the indicated duration".into(),
                related_tools: vec![],
            }),
            GovernanceError::DependencyMissing(_) => Some(Recovery {
                action: "retry once; if it persists, check external dependency health".into(),
                related_tools: vec!["health_check".into()],
            }),
            _ => None,
        }
    }
}

impl From<aegis_session::SessionError> for GovernanceError {
    fn from(e: aegis_session::SessionError) -> Self {
        match e {
            aegis_session::SessionError::IdentityInUse => GovernanceError::IdentityInUse,
            aegis_session::SessionError::LockUnavailable(id, attempts) => {
                GovernanceError::LockUnavailable {
                    identity_id: id,
                    reason: format!("exhausted {attempts} retries"),
                }
            }
            aegis_session::SessionError::LockTimeout(d) => GovernanceError::Timeout(d),
            aegis_session::SessionError::NotBound(key) => {
                GovernanceError::NotFound(format!("session key {key}"))
            }
            aegis_session::SessionError::Io(e) => GovernanceError::Io(e),
            aegis_session::SessionError::Other(e) => GovernanceError::Internal(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, GovernanceError>;
