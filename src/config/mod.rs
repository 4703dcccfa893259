//! Runtime configuration surface.
//!
//! Built on the `config = "0.15"` dependency: defaults live on
//! `GovernanceConfig::default()`, and an optional JSON overlay
//! (typically supplied by the environment) is layered on top via the
//! `config` crate's `Environment`/`File` sources. Unknown keys in the
//! overlay are rejected — `#[serde(deny_unknown_fields)]` enforces an
//! "unknown keys are errors" policy rather than silently ignoring a typo.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GovernanceError, Result};

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GovernanceConfig {
    /// Φ band upper bound for a `proceed`-equivalent verdict.
    pub risk_approve_threshold: f64,
    /// Φ band upper bound for `guide`.
    pub risk_revise_threshold: f64,
    /// Coherence below this forces a pause regardless of Φ.
    pub coherence_critical_threshold: f64,

    pub void_threshold_initial: f64,
    pub void_threshold_min: f64,
    pub void_threshold_max: f64,

    pub lambda1_min: f64,
    pub lambda1_max: f64,

    pub target_coherence: f64,
    pub target_void_freq: f64,

    pub confidence_gate_threshold: f64,

    #[serde(with = "duration_secs")]
    pub stale_lock_threshold_seconds: Duration,
    #[serde(with = "duration_secs")]
    pub session_idle_timeout_seconds: Duration,

    pub dialectic_max_rounds: u32,
    #[serde(with = "duration_secs")]
    pub dialectic_timeout_seconds: Duration,

    pub knowledge_store_rate_per_hour: u32,
    pub history_bound_per_agent: usize,
}

mod duration_secs {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            risk_approve_threshold: 0.30,
            risk_revise_threshold: 0.50,
            coherence_critical_threshold: 0.60,

            void_threshold_initial: 0.15,
            void_threshold_min: 0.10,
            void_threshold_max: 0.30,

            lambda1_min: 0.05,
            lambda1_max: 0.20,

            target_coherence: 0.85,
            target_void_freq: 0.02,

            confidence_gate_threshold: 0.80,

            stale_lock_threshold_seconds: secs(60),
            session_idle_timeout_seconds: secs(3600),

            dialectic_max_rounds: 5,
            dialectic_timeout_seconds: secs(7200),

            knowledge_store_rate_per_hour: 20,
            history_bound_per_agent: 1000,
        }
    }
}

impl GovernanceConfig {
    /// Load defaults, optionally layering a JSON overlay blob (e.g. read
    /// from an environment variable by the caller). Unknown keys in the
    /// overlay are a hard error, not a silently ignored typo.
    pub fn load(overlay_json: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default()).map_err(|e| {
                GovernanceError::Internal(format!("failed to seed config defaults: {e}"))
            })?);

        if let Some(json) = overlay_json {
            builder = builder.add_source(config::File::from_str(json, config::FileFormat::Json));
        }

        let built = builder
            .build()
            .map_err(|e| GovernanceError::MissingConfig(e.to_string()))?;

        built
            .try_deserialize()
            .map_err(|e| GovernanceError::InvalidParameter {
                name: "config_overlay".to_string(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = GovernanceConfig::default();
        assert_eq!(cfg.risk_approve_threshold, 0.30);
        assert_eq!(cfg.lambda1_min, 0.05);
        assert_eq!(cfg.lambda1_max, 0.20);
        assert_eq!(cfg.history_bound_per_agent, 1000);
    }

    #[test]
    fn overlay_overrides_a_single_key() {
        let cfg = GovernanceConfig::load(Some(r#"{"confidence_gate_threshold": 0.5}"#)).unwrap();
        assert_eq!(cfg.confidence_gate_threshold, 0.5);
        // Unrelated keys remain at default.
        assert_eq!(cfg.lambda1_min, 0.05);
    }

    #[test]
    fn overlay_with_unknown_key_is_rejected() {
        let result = GovernanceConfig::load(Some(r#"{"not_a_real_key": 1}"#));
        assert!(result.is_err());
    }
}
