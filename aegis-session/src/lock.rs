//! Per-identity exclusive lock manager.
//!
//! Real deployments of this contract commonly use filesystem advisory
//! locks or a distributed lock service; what this contract actually
//! requires is an in-memory map keyed by identity with stale-holder
//! detection, so that is what this module provides. The holder record
//! carries a `holder_pid` exactly as a lock file would, and staleness
//! is judged the same way a file-based implementation would: age past
//! a threshold *and* a dead-process check, via `kill(pid, None)`
//! (signal 0), the standard Unix liveness probe.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::time::sleep;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{SessionError, SessionResult};

/// Holder metadata, mirroring the `(holder_pid, acquired_at)` content a
/// filesystem lock file would carry.
#[derive(Debug, Clone)]
struct LockHolder {
    holder_pid: u32,
    acquired_at: DateTime<Utc>,
}

/// A held lock; dropping it releases the lock even on an unexpected
/// unwind, giving the "release on every exit path including panics"
/// guarantee without caller-side cleanup code.
pub struct LockGuard<'a> {
    manager: &'a LockManager,
    identity_id: Uuid,
    released: bool,
}

impl<'a> LockGuard<'a> {
    pub fn release(mut self) {
        self.manager.release(self.identity_id);
        self.released = true;
    }
}

impl<'a> Drop for LockGuard<'a> {
    fn drop(&mut self) {
        if !self.released {
            self.manager.release(self.identity_id);
        }
    }
}

#[derive(Debug, Clone)]
pub struct LockConfig {
    pub stale_threshold: Duration,
    pub acquire_timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            stale_threshold: Duration::from_secs(60),
            acquire_timeout: Duration::from_secs(5),
            max_retries: 3,
            backoff_base: Duration::from_millis(200),
        }
    }
}

/// Process-liveness check. Production builds use `kill(pid, None)`
/// (signal 0); this is factored out so tests can simulate dead holders
/// without needing a real dead PID lying around.
pub trait ProcessLiveness: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
}

#[derive(Default)]
pub struct UnixProcessLiveness;

impl ProcessLiveness for UnixProcessLiveness {
    #[cfg(unix)]
    fn is_alive(&self, pid: u32) -> bool {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }

    #[cfg(not(unix))]
    fn is_alive(&self, _pid: u32) -> bool {
        // Non-Unix targets have no portable signal-0 probe; treat every
        // holder as alive and rely purely on the age threshold.
        true
    }
}

/// Per-identity exclusive lock manager.
pub struct LockManager {
    holders: Mutex<HashMap<Uuid, LockHolder>>,
    config: LockConfig,
    liveness: Box<dyn ProcessLiveness>,
    self_pid: u32,
}

impl LockManager {
    pub fn new(config: LockConfig) -> Self {
        Self {
            holders: Mutex::new(HashMap::new()),
            config,
            liveness: Box::new(UnixProcessLiveness),
            self_pid: std::process::id(),
        }
    }

    pub fn with_liveness(config: LockConfig, liveness: Box<dyn ProcessLiveness>) -> Self {
        Self {
            holders: Mutex::new(HashMap::new()),
            config,
            liveness,
            self_pid: std::process::id(),
        }
    }

    fn is_stale(&self, holder: &LockHolder) -> bool {
        let age = Utc::now().signed_duration_since(holder.acquired_at);
        let age_std = age.to_std().unwrap_or(Duration::ZERO);
        age_std > self.config.stale_threshold && !self.liveness.is_alive(holder.holder_pid)
    }

    /// Sweep a stale lock for `identity_id` if one is present. Returns
    /// true if a stale lock was removed.
    pub fn sweep_one(&self, identity_id: Uuid) -> bool {
        let mut holders = self.holders.lock().expect("lock map mutex poisoned");
        let stale = holders
            .get(&identity_id)
            .map(|h| self.is_stale(h))
            .unwrap_or(false);
        if stale {
            holders.remove(&identity_id);
            warn!(%identity_id, "swept stale lock");
        }
        stale
    }

    /// Background sweeper pass over every held lock; run on an interval
    /// (every 5 minutes) from `spawn_sweeper`.
    pub fn sweep_all(&self) -> usize {
        let stale_ids: Vec<Uuid> = {
            let holders = self.holders.lock().expect("lock map mutex poisoned");
            holders
                .iter()
                .filter(|(_, h)| self.is_stale(h))
                .map(|(id, _)| *id)
                .collect()
        };

        let mut holders = self.holders.lock().expect("lock map mutex poisoned");
        for id in &stale_ids {
            holders.remove(id);
        }
        if !stale_ids.is_empty() {
            info!(count = stale_ids.len(), "background sweep removed stale locks");
        }
        stale_ids.len()
    }

    fn try_acquire_once(&self, identity_id: Uuid) -> bool {
        let mut holders = self.holders.lock().expect("lock map mutex poisoned");
        if holders.contains_key(&identity_id) {
            return false;
        }
        holders.insert(
            identity_id,
            LockHolder {
                holder_pid: self.self_pid,
                acquired_at: Utc::now(),
            },
        );
        true
    }

    pub(crate) fn release(&self, identity_id: Uuid) {
        self.holders
            .lock()
            .expect("lock map mutex poisoned")
            .remove(&identity_id);
    }

    /// Acquire the exclusive lock for `identity_id`: sweep, attempt,
    /// and on failure retry with exponential backoff up to
    /// `max_retries`, re-sweeping before each retry. On final failure,
    /// perform one last emergency sweep before giving up.
    pub async fn acquire(&self, identity_id: Uuid) -> SessionResult<LockGuard<'_>> {
        self.sweep_one(identity_id);

        if self.try_acquire_once(identity_id) {
            return Ok(LockGuard {
                manager: self,
                identity_id,
                released: false,
            });
        }

        let deadline = tokio::time::Instant::now() + self.config.acquire_timeout;
        for attempt in 0..self.config.max_retries {
            let backoff = self.config.backoff_base * 2u32.pow(attempt);
            let jitter_ms = rand::rng().random_range(0..=10u64);
            sleep(backoff + Duration::from_millis(jitter_ms)).await;

            self.sweep_one(identity_id);
            if self.try_acquire_once(identity_id) {
                return Ok(LockGuard {
                    manager: self,
                    identity_id,
                    released: false,
                });
            }

            if tokio::time::Instant::now() >= deadline {
                break;
            }
        }

        // Emergency sweep before surfacing failure.
        self.sweep_one(identity_id);
        if self.try_acquire_once(identity_id) {
            return Ok(LockGuard {
                manager: self,
                identity_id,
                released: false,
            });
        }

        Err(SessionError::LockUnavailable(
            identity_id.to_string(),
            self.config.max_retries,
        ))
    }

    /// Spawn the periodic background sweeper. The returned
    /// `JoinHandle` can be aborted on shutdown.
    pub fn spawn_sweeper(
        self: std::sync::Arc<Self>,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.sweep_all();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysDead;
    impl ProcessLiveness for AlwaysDead {
        fn is_alive(&self, _pid: u32) -> bool {
            false
        }
    }

    struct AlwaysAlive;
    impl ProcessLiveness for AlwaysAlive {
        fn is_alive(&self, _pid: u32) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn acquire_and_release_round_trip() {
        let manager = LockManager::new(LockConfig::default());
        let id = Uuid::new_v4();
        let guard = manager.acquire(id).await.unwrap();
        drop(guard);

        // Should be immediately re-acquirable once released.
        let _guard2 = manager.acquire(id).await.unwrap();
    }

    #[tokio::test]
    async fn second_concurrent_acquire_waits_then_fails_if_never_released() {
        let config = LockConfig {
            stale_threshold: Duration::from_secs(3600),
            acquire_timeout: Duration::from_millis(50),
            max_retries: 2,
            backoff_base: Duration::from_millis(5),
        };
        let manager = LockManager::with_liveness(config, Box::new(AlwaysAlive));
        let id = Uuid::new_v4();
        let _guard = manager.acquire(id).await.unwrap();

        let result = manager.acquire(id).await;
        assert!(matches!(result, Err(SessionError::LockUnavailable(_, _))));
    }

    #[tokio::test]
    async fn stale_lock_with_dead_holder_is_recovered() {
        let config = LockConfig {
            stale_threshold: Duration::from_millis(1),
            acquire_timeout: Duration::from_secs(1),
            max_retries: 3,
            backoff_base: Duration::from_millis(5),
        };
        let manager = LockManager::with_liveness(config, Box::new(AlwaysDead));
        let id = Uuid::new_v4();

        // Simulate a held lock from a dead holder, acquired in the past.
        {
            let mut holders = manager.holders.lock().unwrap();
            holders.insert(
                id,
                LockHolder {
                    holder_pid: 999_999,
                    acquired_at: Utc::now() - chrono::Duration::seconds(120),
                },
            );
        }

        tokio::time::sleep(Duration::from_millis(5)).await;
        let guard = manager.acquire(id).await.unwrap();
        drop(guard);
    }

    #[tokio::test]
    async fn background_sweeper_removes_stale_locks() {
        let config = LockConfig {
            stale_threshold: Duration::from_millis(1),
            ..LockConfig::default()
        };
        let manager = std::sync::Arc::new(LockManager::with_liveness(config, Box::new(AlwaysDead)));
        let id = Uuid::new_v4();
        {
            let mut holders = manager.holders.lock().unwrap();
            holders.insert(
                id,
                LockHolder {
                    holder_pid: 999_999,
                    acquired_at: Utc::now() - chrono::Duration::seconds(120),
                },
            );
        }

        let removed = manager.sweep_all();
        assert_eq!(removed, 1);
    }
}
