//! Per-agent stateful monitor: the concurrency-safety boundary
//! around one identity's state snapshot. Nothing outside this module
//! touches a snapshot directly — every mutation goes through
//! `process_update`, which builds the entire next state before
//! swapping it in, giving the all-or-nothing commit guarantee without
//! real transactions.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::calibration::CalibrationTable;
use crate::dynamics::{
    check_basin, coherence, detect_phase, objective, parameter_coherence, step, Basin,
    DynamicsParams, EthicalDrift, ObjectiveWeights, ParameterFingerprint, Phase, PhaseSample,
    PiController, PiControllerState, RiskBand, StateVector, Theta,
};
use crate::error::{GovernanceError, Result};
use crate::governance::{adjust_phi_for_trust, decide, DecisionInput, Verdict};
use crate::identity::TrustTier;
use crate::ids::IdentityId;

use super::snapshot::{AgentHistory, AgentStateSnapshot, HistoryEntry};

#[derive(Debug, Clone)]
pub struct AgentReport {
    pub complexity: f64,
    pub confidence: f64,
    pub response_text: String,
    pub parameters: Option<ParameterFingerprint>,
    pub ethical_drift: Option<EthicalDrift>,
}

impl AgentReport {
    /// Clip reported fields to range and reject NaN/Inf.
    fn validate(&self) -> Result<(f64, f64)> {
        if self.complexity.is_nan() || self.complexity.is_infinite() {
            return Err(GovernanceError::InvalidParameter {
                name: "complexity".into(),
                reason: "NaN or Inf".into(),
            });
        }
        if self.confidence.is_nan() || self.confidence.is_infinite() {
            return Err(GovernanceError::InvalidParameter {
                name: "confidence".into(),
                reason: "NaN or Inf".into(),
            });
        }
        Ok((self.complexity.clamp(0.0, 1.0), self.confidence.clamp(0.0, 1.0)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsEnvelope {
    pub state: StateVector,
    pub theta: Theta,
    pub phi: f64,
    pub risk_band: RiskBand,
    pub phase: Phase,
    pub basin: Basin,
    pub void_active: bool,
    pub void_warning: bool,
    pub verdict: Verdict,
    /// `None` for `get_metrics` (no confidence report to correct that
    /// cycle); `Some` for `process_update`/`simulate`.
    pub corrected_confidence: Option<f64>,
    pub confidence_insufficient_samples: Option<bool>,
    pub update_count: u64,
    pub simulation: bool,
}

/// Thresholds and tunables the monitor needs that are not part of the
/// pure dynamics kernel itself (risk bands, void thresholds, the
/// confidence gate). Sourced from `config::GovernanceConfig` by the
/// owning facade.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MonitorThresholds {
    pub risk_approve_threshold: f64,
    pub risk_revise_threshold: f64,
    /// Coherence below this forces a pause regardless of Φ (§6.4
    /// `coherence_critical_threshold`).
    pub coherence_critical_threshold: f64,
    /// Current soft `|V|` warning threshold. Starts at
    /// `void_threshold_initial` and adapts within
    /// `[void_threshold_min, void_threshold_max]` the same PI cycle
    /// that nudges `theta.eta1` (§4.1.4, §6.4).
    pub void_max_soft: f64,
    pub void_threshold_min: f64,
    pub void_threshold_max: f64,
    pub void_hard: f64,
    pub confidence_gate_threshold: f64,
    pub reject_window: u32,
}

impl Default for MonitorThresholds {
    fn default() -> Self {
        Self {
            risk_approve_threshold: 0.30,
            risk_revise_threshold: 0.50,
            coherence_critical_threshold: 0.60,
            void_max_soft: 0.15,
            void_threshold_min: 0.10,
            void_threshold_max: 0.30,
            void_hard: 1.0,
            confidence_gate_threshold: 0.80,
            reject_window: 5,
        }
    }
}

pub struct AgentMonitor {
    identity_id: IdentityId,
    snapshot: AgentStateSnapshot,
    history: AgentHistory,
    phase_samples: Vec<PhaseSample>,
    pi_state: PiControllerState,
    controller: PiController,
    params: DynamicsParams,
    weights: ObjectiveWeights,
    thresholds: MonitorThresholds,
    trust_tier: TrustTier,
    consecutive_low_basin: u32,
    consecutive_failed_recovery: u32,
    last_parameters: Option<ParameterFingerprint>,
    drift_ema: [f64; 3],
    /// EMA of the void-event indicator (1.0 if `|V| > void_max_soft`
    /// else 0.0), compared against `controller.target_void_freq` to
    /// adapt `thresholds.void_max_soft` within
    /// `[void_threshold_min, void_threshold_max]` (§6.4).
    void_freq_ema: f64,
    /// Scales `beta_i` on the *next* dynamics step. Starts at 1.0 (no correction available yet) and is
    /// replaced by this cycle's calibration-corrected confidence once
    /// `process_update` commits.
    confidence_scale: f64,
}

const DRIFT_EMA_ALPHA: f64 = 0.2;
const VOID_FREQ_EMA_ALPHA: f64 = 0.2;
/// Fraction of the gap between measured and target void frequency
/// corrected per PI cycle, mirroring the controller's own step size.
const VOID_THRESHOLD_ADJUST_RATE: f64 = 0.1;

impl AgentMonitor {
    pub fn new(identity_id: IdentityId, history_bound: usize) -> Self {
        Self {
            snapshot: AgentStateSnapshot::new(identity_id),
            history: AgentHistory::new(history_bound),
            phase_samples: Vec::new(),
            pi_state: PiControllerState::default(),
            controller: PiController::default(),
            params: DynamicsParams::default(),
            weights: ObjectiveWeights::default(),
            thresholds: MonitorThresholds::default(),
            trust_tier: TrustTier::default(),
            consecutive_low_basin: 0,
            consecutive_failed_recovery: 0,
            last_parameters: None,
            drift_ema: [0.0, 0.0, 0.0],
            void_freq_ema: 0.0,
            confidence_scale: 1.0,
            identity_id,
        }
    }

    /// `self.params` with `beta_i` scaled by the last cycle's
    /// calibration-corrected confidence.
    fn effective_params(&self) -> DynamicsParams {
        DynamicsParams {
            beta_i: self.params.beta_i * self.confidence_scale,
            ..self.params
        }
    }

    pub fn set_trust_tier(&mut self, trust_tier: TrustTier) {
        self.trust_tier = trust_tier;
    }

    pub fn set_thresholds(&mut self, thresholds: MonitorThresholds) {
        self.thresholds = thresholds;
    }

    pub fn thresholds(&self) -> MonitorThresholds {
        self.thresholds
    }

    pub fn set_dynamics_params(&mut self, params: DynamicsParams) {
        self.params = params;
    }

    pub fn set_controller(&mut self, controller: PiController) {
        self.controller = controller;
    }

    pub fn get_metrics(&self) -> MetricsEnvelope {
        self.build_envelope(self.snapshot.state, self.snapshot.theta, false)
    }

    pub fn snapshot(&self) -> &AgentStateSnapshot {
        &self.snapshot
    }

    pub fn history(&self) -> &AgentHistory {
        &self.history
    }

    fn resolve_drift(&mut self, reported: Option<EthicalDrift>, commit: bool) -> EthicalDrift {
        match reported {
            Some(drift) => {
                if commit {
                    for axis in 0..3 {
                        self.drift_ema[axis] =
                            DRIFT_EMA_ALPHA * drift.0[axis] + (1.0 - DRIFT_EMA_ALPHA) * self.drift_ema[axis];
                    }
                }
                drift
            }
            None => EthicalDrift(self.drift_ema),
        }
    }

    fn build_envelope(&self, state: StateVector, theta: Theta, simulation: bool) -> MetricsEnvelope {
        let void_warning = state.v.abs() > self.thresholds.void_max_soft;
        let void_active = state.v.abs() > self.thresholds.void_hard;
        let basin = check_basin(state.i, 0.5, 0.05);
        let phase = self.snapshot.phase;

        let phi = objective(&state, &EthicalDrift(self.drift_ema), &self.weights);
        let adjusted_phi = adjust_phi_for_trust(phi, self.trust_tier);
        let risk_band = RiskBand::from_phi_with_thresholds(
            adjusted_phi,
            self.thresholds.risk_approve_threshold,
            self.thresholds.risk_revise_threshold,
        );
        let coherence_critical =
            coherence(state.v, &theta, &self.params) < self.thresholds.coherence_critical_threshold;

        let decision = decide(DecisionInput {
            risk_band,
            phase,
            basin,
            void_active,
            coherence_critical,
            trust_tier: self.trust_tier,
            consecutive_low_basin: self.consecutive_low_basin,
            consecutive_failed_recovery: self.consecutive_failed_recovery,
            reject_window: self.thresholds.reject_window,
        });

        MetricsEnvelope {
            state,
            theta,
            phi,
            risk_band,
            phase,
            basin,
            void_active,
            void_warning,
            verdict: decision,
            corrected_confidence: None,
            confidence_insufficient_samples: None,
            update_count: self.snapshot.update_count,
            simulation,
        }
    }

    /// One full update cycle: validate, advance dynamics, correct
    /// confidence, maybe run the PI controller, append history, and
    /// commit. Returns the metrics envelope. `calibration` is mutated
    /// in place with this update's prediction record — the caller
    /// persists it alongside the snapshot as one logical unit.
    #[instrument(skip(self, report, calibration), fields(identity_id = %self.identity_id))]
    pub fn process_update(
        &mut self,
        report: &AgentReport,
        calibration: &mut CalibrationTable,
    ) -> Result<MetricsEnvelope> {
        let (complexity, raw_confidence) = report.validate()?;

        if let Some(params) = &report.parameters {
            if let Some(previous) = &self.last_parameters {
                let _param_coherence = parameter_coherence(params, previous, &self.params);
                // External-monitoring-only signal; intentionally not
                // threaded into the dynamics step.
            }
            self.last_parameters = Some(*params);
        }

        let drift = self.resolve_drift(report.ethical_drift, true);
        let effective_params = self.effective_params();
        let (next_state, _derivatives) =
            step(&self.snapshot.state, &self.snapshot.theta, &effective_params, &drift, complexity);

        let corrected = calibration.correct(raw_confidence);
        calibration.record_prediction(raw_confidence, raw_confidence >= self.thresholds.confidence_gate_threshold);

        let basin = check_basin(next_state.i, 0.5, 0.05);
        if basin == Basin::Low {
            self.consecutive_low_basin += 1;
        } else {
            self.consecutive_low_basin = 0;
        }

        self.phase_samples.push(PhaseSample {
            i: next_state.i,
            s: next_state.s,
            complexity,
        });
        let phase = detect_phase(&self.phase_samples);

        let skip_lambda1 = raw_confidence < self.thresholds.confidence_gate_threshold;
        let next_update_count = self.snapshot.update_count + 1;
        let mut next_theta = self.snapshot.theta;
        if !skip_lambda1 && self.controller.should_run(next_update_count) {
            let coherence_value = coherence(next_state.v, &self.snapshot.theta, &self.params);
            let void_events = if next_state.v.abs() > self.thresholds.void_max_soft {
                1.0
            } else {
                0.0
            };
            self.void_freq_ema =
                VOID_FREQ_EMA_ALPHA * void_events + (1.0 - VOID_FREQ_EMA_ALPHA) * self.void_freq_ema;
            let void_freq_error = self.void_freq_ema - self.controller.target_void_freq;
            self.thresholds.void_max_soft = (self.thresholds.void_max_soft
                + VOID_THRESHOLD_ADJUST_RATE * void_freq_error)
                .clamp(self.thresholds.void_threshold_min, self.thresholds.void_threshold_max);
            next_theta.eta1 = self.controller.step(
                &mut self.pi_state,
                self.snapshot.theta.eta1,
                coherence_value,
                void_events,
            );
        } else {
            warn!(confidence = raw_confidence, "lambda1 adaptive update skipped this cycle");
        }

        let phi = objective(&next_state, &drift, &self.weights);
        let adjusted_phi = adjust_phi_for_trust(phi, self.trust_tier);
        let void_active = next_state.v.abs() > self.thresholds.void_hard;
        let void_warning = next_state.v.abs() > self.thresholds.void_max_soft;
        let risk_band = RiskBand::from_phi_with_thresholds(
            adjusted_phi,
            self.thresholds.risk_approve_threshold,
            self.thresholds.risk_revise_threshold,
        );
        let coherence_critical = coherence(next_state.v, &next_theta, &self.params)
            < self.thresholds.coherence_critical_threshold;

        let verdict = decide(DecisionInput {
            risk_band,
            phase,
            basin,
            void_active,
            coherence_critical,
            trust_tier: self.trust_tier,
            consecutive_low_basin: self.consecutive_low_basin,
            consecutive_failed_recovery: self.consecutive_failed_recovery,
            reject_window: self.thresholds.reject_window,
        });

        if matches!(verdict, Verdict::Pause | Verdict::Reject) {
            self.consecutive_failed_recovery += 1;
        } else {
            self.consecutive_failed_recovery = 0;
        }

        // Commit: everything above has succeeded, so swap the whole
        // next state in at once.
        self.snapshot.state = next_state;
        self.snapshot.theta = next_theta;
        self.snapshot.update_count = next_update_count;
        self.snapshot.phase = phase;
        self.snapshot.last_verdict = Some(verdict);
        self.snapshot.recorded_at = Utc::now();
        // Scale the *next* step's beta_i by this cycle's corrected
        // confidence, not the raw reported value.
        self.confidence_scale = corrected.value;

        self.history.push(HistoryEntry {
            recorded_at_seq: self.snapshot.update_count,
            v: next_state.v,
            coherence: coherence(next_state.v, &self.snapshot.theta, &self.params),
            phi,
            verdict,
        });

        if void_warning {
            warn!(v = next_state.v, "void warning threshold crossed");
        }
        info!(update_count = self.snapshot.update_count, ?verdict, "agent update committed");

        Ok(MetricsEnvelope {
            state: next_state,
            theta: next_theta,
            phi,
            risk_band,
            phase,
            basin,
            void_active,
            void_warning,
            verdict,
            corrected_confidence: Some(corrected.value),
            confidence_insufficient_samples: Some(corrected.insufficient_samples),
            update_count: self.snapshot.update_count,
            simulation: false,
        })
    }

    /// Pure dry-run: same computation as `process_update`, but no
    /// mutation of `self` and no calibration write. The caller's
    /// `get_metrics` before and after must be byte-identical.
    pub fn simulate(&self, report: &AgentReport, calibration: &CalibrationTable) -> Result<MetricsEnvelope> {
        let (complexity, raw_confidence) = report.validate()?;
        let drift = match report.ethical_drift {
            Some(d) => d,
            None => EthicalDrift(self.drift_ema),
        };

        let (next_state, _) =
            step(&self.snapshot.state, &self.snapshot.theta, &self.effective_params(), &drift, complexity);
        let corrected = calibration.correct(raw_confidence);

        let basin = check_basin(next_state.i, 0.5, 0.05);
        let mut phase_samples = self.phase_samples.clone();
        phase_samples.push(PhaseSample {
            i: next_state.i,
            s: next_state.s,
            complexity,
        });
        let phase = detect_phase(&phase_samples);

        let phi = objective(&next_state, &drift, &self.weights);
        let adjusted_phi = adjust_phi_for_trust(phi, self.trust_tier);
        let void_active = next_state.v.abs() > self.thresholds.void_hard;
        let void_warning = next_state.v.abs() > self.thresholds.void_max_soft;
        let risk_band = RiskBand::from_phi_with_thresholds(
            adjusted_phi,
            self.thresholds.risk_approve_threshold,
            self.thresholds.risk_revise_threshold,
        );
        let coherence_critical = coherence(next_state.v, &self.snapshot.theta, &self.params)
            < self.thresholds.coherence_critical_threshold;

        let verdict = decide(DecisionInput {
            risk_band,
            phase,
            basin,
            void_active,
            coherence_critical,
            trust_tier: self.trust_tier,
            consecutive_low_basin: self.consecutive_low_basin,
            consecutive_failed_recovery: self.consecutive_failed_recovery,
            reject_window: self.thresholds.reject_window,
        });

        Ok(MetricsEnvelope {
            state: next_state,
            theta: self.snapshot.theta,
            phi,
            risk_band,
            phase,
            basin,
            void_active,
            void_warning,
            verdict,
            corrected_confidence: Some(corrected.value),
            confidence_insufficient_samples: Some(corrected.insufficient_samples),
            update_count: self.snapshot.update_count,
            simulation: true,
        })
    }

    /// Re-initialize to default state; the caller is responsible for
    /// archiving the returned previous snapshot/history if it wants
    /// them preserved.
    pub fn reset(&mut self) -> (AgentStateSnapshot, AgentHistory) {
        let previous_snapshot = self.snapshot.clone();
        let previous_history =
            std::mem::replace(&mut self.history, AgentHistory::new(self.history.capacity_hint()));

        self.snapshot = AgentStateSnapshot::new(self.identity_id);
        self.phase_samples.clear();
        self.pi_state = PiControllerState::default();
        self.consecutive_low_basin = 0;
        self.consecutive_failed_recovery = 0;
        self.last_parameters = None;
        self.drift_ema = [0.0, 0.0, 0.0];
        self.void_freq_ema = 0.0;
        self.confidence_scale = 1.0;

        (previous_snapshot, previous_history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(confidence: f64, complexity: f64) -> AgentReport {
        AgentReport {
            complexity,
            confidence,
            response_text: "did the thing".into(),
            parameters: None,
            ethical_drift: Some(EthicalDrift([0.0, 0.0, 0.0])),
        }
    }

    #[test]
    fn first_update_count_is_one_and_proceeds_on_clean_input() {
        let mut monitor = AgentMonitor::new(IdentityId::new(), 1000);
        let mut calibration = CalibrationTable::default();
        let envelope = monitor
            .process_update(&report(0.9, 0.5), &mut calibration)
            .unwrap();
        assert_eq!(envelope.update_count, 1);
        assert_eq!(envelope.verdict, Verdict::Proceed);
    }

    #[test]
    fn update_count_is_monotonic_with_no_gaps() {
        let mut monitor = AgentMonitor::new(IdentityId::new(), 1000);
        let mut calibration = CalibrationTable::default();
        for n in 1..=20u64 {
            let envelope = monitor
                .process_update(&report(0.9, 0.4), &mut calibration)
                .unwrap();
            assert_eq!(envelope.update_count, n);
        }
    }

    #[test]
    fn simulate_does_not_change_state() {
        let mut monitor = AgentMonitor::new(IdentityId::new(), 1000);
        let calibration = CalibrationTable::default();
        let before = monitor.get_metrics();
        let _ = monitor.simulate(&report(0.9, 0.5), &calibration).unwrap();
        let after = monitor.get_metrics();
        assert_eq!(before.update_count, after.update_count);
        assert_eq!(before.state, after.state);
    }

    #[test]
    fn sustained_ethical_drift_eventually_triggers_pause() {
        // Large ethical drift, high confidence and complexity, repeated,
        // drives V out of bounds.
        let mut monitor = AgentMonitor::new(IdentityId::new(), 1000);
        let mut calibration = CalibrationTable::default();
        let drifting = AgentReport {
            complexity: 0.9,
            confidence: 0.95,
            response_text: "x".into(),
            parameters: None,
            ethical_drift: Some(EthicalDrift([0.4, 0.4, 0.4])),
        };

        let mut last_verdict = Verdict::Proceed;
        for _ in 0..30 {
            let envelope = monitor.process_update(&drifting, &mut calibration).unwrap();
            last_verdict = envelope.verdict;
        }
        assert!(matches!(last_verdict, Verdict::Pause | Verdict::Reject));
    }

    #[test]
    fn corrected_confidence_scales_beta_i_on_next_step() {
        // Once calibration has enough samples and reports a corrected
        // confidence well below the raw reported value, the *next*
        // step's I-dynamics should couple at the corrected scale, not
        // the raw one -- observable as a lower effective beta_i
        // (smaller I response to coherence).
        let mut monitor = AgentMonitor::new(IdentityId::new(), 1000);
        let mut calibration = CalibrationTable::default();
        for _ in 0..50 {
            calibration.record_prediction(0.85, true);
        }
        for _ in 0..20 {
            calibration.record_ground_truth(0.85, true);
        }

        // Drive one update with raw confidence 0.85 to pick up the
        // corrected scale for the *following* step.
        monitor.process_update(&report(0.85, 0.1), &mut calibration).unwrap();
        assert!((monitor.confidence_scale - 0.4).abs() < 0.05);

        let scaled = monitor.effective_params();
        assert!(scaled.beta_i < monitor.params.beta_i);
    }

    #[test]
    fn rejects_nan_confidence() {
        let mut monitor = AgentMonitor::new(IdentityId::new(), 1000);
        let mut calibration = CalibrationTable::default();
        let bad = report(f64::NAN, 0.5);
        assert!(monitor.process_update(&bad, &mut calibration).is_err());
    }
}
