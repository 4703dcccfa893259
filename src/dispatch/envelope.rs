//! Response envelope and response-mode shaping.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::agent::MetricsEnvelope;
use crate::error::{ErrorCode, GovernanceError, Recovery};
use crate::governance::Verdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    Auto,
    Minimal,
    Compact,
    Standard,
    Full,
}

impl Default for ResponseMode {
    fn default() -> Self {
        ResponseMode::Auto
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery: Option<Recovery>,
}

impl From<&GovernanceError> for ErrorPayload {
    fn from(e: &GovernanceError) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
            recovery: e.recovery(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl Envelope {
    pub fn error(e: &GovernanceError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(e.into()),
        }
    }

    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Shape a `MetricsEnvelope` into a response `data` value per the
    /// caller's requested mode. `auto` picks a concrete
    /// mode from verdict severity before shaping.
    pub fn from_metrics(metrics: &MetricsEnvelope, mode: ResponseMode) -> Self {
        let resolved = match mode {
            ResponseMode::Auto => match metrics.verdict {
                Verdict::Proceed => ResponseMode::Minimal,
                Verdict::Guide => ResponseMode::Compact,
                Verdict::Pause | Verdict::Reject => ResponseMode::Standard,
            },
            other => other,
        };

        let mut data = json!({
            "verdict": metrics.verdict,
            "state": metrics.state,
            "basin": metrics.basin,
            "margin": (metrics.state.i - 0.5).abs(),
        });

        if matches!(
            resolved,
            ResponseMode::Compact | ResponseMode::Standard | ResponseMode::Full
        ) {
            data["phi"] = json!(metrics.phi);
            data["risk_band"] = json!(metrics.risk_band);
            data["phase"] = json!(metrics.phase);
            data["void_active"] = json!(metrics.void_active);
            data["update_count"] = json!(metrics.update_count);
        }

        if matches!(resolved, ResponseMode::Standard | ResponseMode::Full) {
            data["interpretation"] = json!(interpret(metrics));
            data["void_warning"] = json!(metrics.void_warning);
        }

        if resolved == ResponseMode::Full {
            data["theta"] = json!(metrics.theta);
            data["corrected_confidence"] = json!(metrics.corrected_confidence);
            data["confidence_insufficient_samples"] = json!(metrics.confidence_insufficient_samples);
            data["simulation"] = json!(metrics.simulation);
        }

        Self::ok(data)
    }
}

fn interpret(metrics: &MetricsEnvelope) -> String {
    match metrics.verdict {
        Verdict::Proceed => "operating within safe bounds".to_string(),
        Verdict::Guide => format!("borderline coherence in {:?} phase, proceed with guidance", metrics.phase),
        Verdict::Pause => {
            if metrics.void_active {
                "paused: void threshold exceeded".to_string()
            } else {
                "paused: sustained low-integrity basin".to_string()
            }
        }
        Verdict::Reject => "rejected: failed to recover after sustained pause".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::{Basin, Phase, RiskBand, StateVector, Theta};

    fn metrics(verdict: Verdict) -> MetricsEnvelope {
        MetricsEnvelope {
            state: StateVector { e: 0.5, i: 0.6, s: 0.1, v: 0.0 },
            theta: Theta::default(),
            phi: 0.2,
            risk_band: RiskBand::Safe,
            phase: Phase::Integration,
            basin: Basin::High,
            void_active: false,
            void_warning: false,
            verdict,
            corrected_confidence: Some(0.8),
            confidence_insufficient_samples: Some(false),
            update_count: 5,
            simulation: false,
        }
    }

    #[test]
    fn auto_picks_minimal_for_proceed() {
        let envelope = Envelope::from_metrics(&metrics(Verdict::Proceed), ResponseMode::Auto);
        let data = envelope.data.unwrap();
        assert!(data.get("phi").is_none());
    }

    #[test]
    fn auto_picks_standard_for_pause() {
        let envelope = Envelope::from_metrics(&metrics(Verdict::Pause), ResponseMode::Auto);
        let data = envelope.data.unwrap();
        assert!(data.get("interpretation").is_some());
        assert!(data.get("theta").is_none());
    }

    #[test]
    fn full_includes_everything() {
        let envelope = Envelope::from_metrics(&metrics(Verdict::Proceed), ResponseMode::Full);
        let data = envelope.data.unwrap();
        assert!(data.get("theta").is_some());
        assert!(data.get("simulation").is_some());
    }
}
