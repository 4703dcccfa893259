//! Session binding, cache, and per-identity locking for aegis-core.
//!
//! This crate is the local path dependency that owns everything the
//! identity resolver and session/lock manager need but that is
//! otherwise orthogonal to thermodynamic state or governance semantics:
//! the session-key -> identity mapping (cache + durable store) and the
//! per-identity exclusive lock with stale-holder recovery.

pub mod binding;
pub mod cache;
pub mod error;
pub mod lock;

pub use binding::{SessionBinding, SessionStore, SharedSessionStore};
pub use cache::SessionCache;
pub use error::{SessionError, SessionResult};
pub use lock::{LockConfig, LockGuard, LockManager, ProcessLiveness};

/// Library version, following the convention of exposing it for
/// diagnostics (`health_check`, `describe_tool`).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
