//! Per-author rolling-hour rate limit on `knowledge.store`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::{GovernanceError, Result};
use crate::ids::IdentityId;

const ROLLING_WINDOW: Duration = Duration::from_secs(3600);

pub struct RateLimiter {
    per_author: Mutex<HashMap<IdentityId, Vec<Instant>>>,
    limit_per_hour: u32,
}

impl RateLimiter {
    pub fn new(limit_per_hour: u32) -> Self {
        Self {
            per_author: Mutex::new(HashMap::new()),
            limit_per_hour,
        }
    }

    /// Record a `store` call for `author`, failing if it would exceed
    /// the rolling-hour cap. Emits a telemetry warning for the
    /// "poisoning" pattern (an author consistently hitting the cap).
    pub fn check_and_record(&self, author: IdentityId) -> Result<()> {
        let mut map = self.per_author.lock().expect("rate limiter mutex poisoned");
        let now = Instant::now();
        let entry = map.entry(author).or_default();
        entry.retain(|t| now.duration_since(*t) < ROLLING_WINDOW);

        if entry.len() as u32 >= self.limit_per_hour {
            warn!(%author, count = entry.len(), "knowledge store rate limit hit, possible poisoning pattern");
            let oldest = entry.first().copied().unwrap_or(now);
            let retry_after = ROLLING_WINDOW.saturating_sub(now.duration_since(oldest));
            return Err(GovernanceError::RateLimited { retry_after });
        }

        entry.push(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit_then_rejects() {
        let limiter = RateLimiter::new(3);
        let author = IdentityId::new();
        for _ in 0..3 {
            limiter.check_and_record(author).unwrap();
        }
        let result = limiter.check_and_record(author);
        assert!(matches!(result, Err(GovernanceError::RateLimited { .. })));
    }

    #[test]
    fn different_authors_have_independent_budgets() {
        let limiter = RateLimiter::new(1);
        let a = IdentityId::new();
        let b = IdentityId::new();
        limiter.check_and_record(a).unwrap();
        limiter.check_and_record(b).unwrap();
    }
}
