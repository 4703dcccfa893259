//! Error types for session binding, cache, and lock management.

use std::fmt;

/// Opaque identity/session identifier used only for error display; this
/// crate does not know about `aegis_core`'s richer identity types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OpaqueId(pub String);

impl fmt::Display for OpaqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session/lock error type.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session key not bound: {0}")]
    NotBound(String),

    #[error("identity already has an active session binding")]
    IdentityInUse,

    #[error("lock unavailable for identity {0} after {1} attempts")]
    LockUnavailable(String, u32),

    #[error("lock acquisition timed out after {0:?}")]
    LockTimeout(std::time::Duration),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;
