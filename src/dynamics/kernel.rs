//! The ODE system, integration step, coherence, and objective scoring
//!.

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const E_BOUNDS: (f64, f64) = (0.0, 1.0);
pub const I_BOUNDS: (f64, f64) = (0.0, 1.0);
pub const S_BOUNDS: (f64, f64) = (1e-3, 2.0);
pub const V_BOUNDS: (f64, f64) = (-2.0, 2.0);

/// The component-wise "something is very wrong upstream" threshold: a
/// raw value more than 10x past its bound before clamping.
const OVERSHOOT_FACTOR: f64 = 10.0;

/// Per-component "big jump in one step" threshold.
const JUMP_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateVector {
    pub e: f64,
    pub i: f64,
    pub s: f64,
    pub v: f64,
}

impl StateVector {
    /// New agents start in the high basin.
    pub fn initial() -> Self {
        Self {
            e: 0.7,
            i: 0.8,
            s: 0.2,
            v: 0.0,
        }
    }

    pub fn has_nan_or_inf(&self) -> bool {
        [self.e, self.i, self.s, self.v]
            .iter()
            .any(|x| x.is_nan() || x.is_infinite())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Theta {
    pub c1: f64,
    pub eta1: f64,
}

impl Theta {
    pub const C1_BOUNDS: (f64, f64) = (0.5, 1.5);
    pub const ETA1_BOUNDS: (f64, f64) = (0.1, 0.5);
}

impl Default for Theta {
    fn default() -> Self {
        Self { c1: 1.0, eta1: 0.2 }
    }
}

/// Ethical-drift vector. Only its magnitude (`norm_sq`) enters the
/// dynamics; dimension is fixed at 3 per the glossary definition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EthicalDrift(pub [f64; 3]);

impl EthicalDrift {
    pub fn zero() -> Self {
        Self([0.0, 0.0, 0.0])
    }

    pub fn norm_sq(&self) -> f64 {
        self.0.iter().map(|x| x * x).sum()
    }
}

/// Fixed 6-field agent-reported parameter fingerprint, plus an explicit
/// uncertainty field — the resolution of the "padding with noise"
/// open question: no synthetic dimensions, uncertainty is a
/// named variance, not samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterFingerprint {
    pub f1: f64,
    pub f2: f64,
    pub f3: f64,
    pub f4: f64,
    pub f5: f64,
    pub f6: f64,
    pub uncertainty: f64,
}

impl ParameterFingerprint {
    fn fields(&self) -> [f64; 6] {
        [self.f1, self.f2, self.f3, self.f4, self.f5, self.f6]
    }

    fn delta_norm(&self, other: &ParameterFingerprint) -> f64 {
        self.fields()
            .iter()
            .zip(other.fields().iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DynamicsParams {
    pub alpha: f64,
    pub beta_e: f64,
    pub gamma_e: f64,
    pub k: f64,
    /// Operational tuning default (0.3), not the reference paper's
    /// 0.05 — kept at the value this service actually runs with in
    /// production rather than the paper's figure.
    pub beta_i: f64,
    pub gamma_i: f64,
    pub mu: f64,
    pub lambda1_min: f64,
    pub lambda1_max: f64,
    pub lambda2_base: f64,
    pub beta_c: f64,
    pub kappa: f64,
    pub delta: f64,
    pub c_max: f64,
    pub dt: f64,
    /// Scale divisor for the parameter-coherence monitor; kept
    /// here since it travels with the same override surface, even
    /// though it never enters the ODEs.
    pub parameter_coherence_scale: f64,
}

impl Default for DynamicsParams {
    fn default() -> Self {
        Self {
            alpha: 0.3,
            beta_e: 0.15,
            gamma_e: 0.2,
            k: 0.25,
            beta_i: 0.3,
            gamma_i: 0.4,
            mu: 0.2,
            lambda1_min: 0.05,
            lambda1_max: 0.20,
            lambda2_base: 0.1,
            beta_c: 0.15,
            kappa: 0.2,
            delta: 0.1,
            c_max: 1.0,
            dt: 0.1,
            parameter_coherence_scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Derivatives {
    pub de: f64,
    pub di: f64,
    pub ds: f64,
    pub dv: f64,
}

fn lerp_clamped(lo: f64, hi: f64, t: f64) -> f64 {
    lo + (hi - lo) * t.clamp(0.0, 1.0)
}

fn lambda1(theta: &Theta, params: &DynamicsParams) -> f64 {
    let t = (theta.eta1 - 0.1) / 0.4;
    lerp_clamped(params.lambda1_min, params.lambda1_max, t)
}

/// `C(V, theta) = C_max * 0.5 * (1 + tanh(theta.c1 * V))`.
pub fn coherence(v: f64, theta: &Theta, params: &DynamicsParams) -> f64 {
    params.c_max * 0.5 * (1.0 + (theta.c1 * v).tanh())
}

/// External-monitoring-only parameter drift measure. Must
/// never be passed to `derivatives`/`step` — it is not part of the
/// state dynamics.
pub fn parameter_coherence(
    current: &ParameterFingerprint,
    previous: &ParameterFingerprint,
    params: &DynamicsParams,
) -> f64 {
    let delta = current.delta_norm(previous);
    (-delta / params.parameter_coherence_scale.max(f64::EPSILON)).exp()
}

fn derivatives(
    state: &StateVector,
    theta: &Theta,
    params: &DynamicsParams,
    drift: &EthicalDrift,
    complexity: f64,
) -> Derivatives {
    let c = coherence(state.v, theta, params);
    let drift_sq = drift.norm_sq();
    let lambda1_t = lambda1(theta, params);

    let de = params.alpha * (state.i - state.e) - params.beta_e * state.e * state.s
        + params.gamma_e * drift_sq;

    let di = -params.k * state.s + params.beta_i * state.i * c
        - params.gamma_i * state.i * (1.0 - state.i);

    let ds = -params.mu * state.s + lambda1_t * drift_sq - params.lambda2_base * c
        + params.beta_c * complexity;

    let dv = params.kappa * (state.e - state.i) - params.delta * state.v;

    Derivatives { de, di, ds, dv }
}

fn clamp_component(name: &str, raw: f64, bounds: (f64, f64)) -> f64 {
    let (lo, hi) = bounds;
    let span = (hi - lo).max(f64::EPSILON);
    if raw > hi + OVERSHOOT_FACTOR * span || raw < lo - OVERSHOOT_FACTOR * span {
        warn!(component = name, value = raw, "dynamics overshoot far past bounds, clamping");
    }
    raw.clamp(lo, hi)
}

/// Clamp every component of a raw (possibly out-of-range) state to its
/// bounds.
pub fn clamp_state(raw: &StateVector) -> StateVector {
    StateVector {
        e: clamp_component("E", raw.e, E_BOUNDS),
        i: clamp_component("I", raw.i, I_BOUNDS),
        s: clamp_component("S", raw.s, S_BOUNDS),
        v: clamp_component("V", raw.v, V_BOUNDS),
    }
}

/// Advance one forward-Euler step. Pure; never panics on
/// in-range inputs; clamps outputs and logs a warning on a large
/// per-component jump.
pub fn step(
    state: &StateVector,
    theta: &Theta,
    params: &DynamicsParams,
    drift: &EthicalDrift,
    complexity: f64,
) -> (StateVector, Derivatives) {
    let d = derivatives(state, theta, params, drift, complexity);
    let dt = params.dt;

    let deltas = [d.de * dt, d.di * dt, d.ds * dt, d.dv * dt];
    if deltas.iter().any(|x| x.abs() > JUMP_THRESHOLD) {
        warn!(?deltas, "large single-step jump in dynamics state");
    }

    let raw = StateVector {
        e: state.e + deltas[0],
        i: state.i + deltas[1],
        s: state.s + deltas[2],
        v: state.v + deltas[3],
    };

    (clamp_state(&raw), d)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveWeights {
    pub w_e: f64,
    pub w_i: f64,
    pub w_s: f64,
    pub w_v: f64,
    pub w_eta: f64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            w_e: 0.35,
            w_i: 0.35,
            w_s: 0.15,
            w_v: 0.10,
            w_eta: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskBand {
    Safe,
    Caution,
    HighRisk,
}

impl RiskBand {
    /// Fixed reference bands from the objective-function definition:
    /// Phi >= 0.15 is safe, >= 0.0 is caution, below that is high-risk.
    pub fn from_phi(phi: f64) -> Self {
        Self::from_phi_with_thresholds(phi, 0.15, 0.0)
    }

    /// Configurable variant used by the agent monitor in production.
    /// The runtime config names these thresholds `risk_*`, operating on
    /// a risk score (`-phi`) rather than Phi directly — risk increases
    /// as Phi falls, so `risk_approve_threshold < risk_revise_threshold`
    /// orders correctly as a badness scale.
    pub fn from_phi_with_thresholds(phi: f64, approve_threshold: f64, revise_threshold: f64) -> Self {
        let risk = -phi;
        if risk <= approve_threshold {
            RiskBand::Safe
        } else if risk <= revise_threshold {
            RiskBand::Caution
        } else {
            RiskBand::HighRisk
        }
    }
}

/// `Phi = w_E*E - w_I*(1-I) - w_S*S - w_V*|V| - w_eta*||drift||^2`.
pub fn objective(
    state: &StateVector,
    drift: &EthicalDrift,
    weights: &ObjectiveWeights,
) -> f64 {
    weights.w_e * state.e
        - weights.w_i * (1.0 - state.i)
        - weights.w_s * state.s
        - weights.w_v * state.v.abs()
        - weights.w_eta * drift.norm_sq()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn e_s_cross_coupling_vanishes_when_e_is_zero() {
        // P2: holding (I, V) fixed and setting E=0, dE/dt must equal
        // alpha*I + gamma_E*||drift||^2 -- the beta_E*E*S term must
        // vanish because it multiplies BOTH E and S, not just S.
        let params = DynamicsParams::default();
        let theta = Theta::default();
        let state = StateVector {
            e: 0.0,
            i: 0.6,
            s: 1.5,
            v: 0.0,
        };
        let drift = EthicalDrift([0.2, 0.1, 0.0]);
        let d = derivatives(&state, &theta, &params, &drift, 0.5);

        let expected = params.alpha * state.i + params.gamma_e * drift.norm_sq();
        assert!((d.de - expected).abs() < 1e-12);
    }

    #[test]
    fn e_s_cross_coupling_does_not_vanish_when_both_nonzero() {
        // A buggy `beta_E * S` (ignoring E) implementation would not
        // depend on E at all; verify it does.
        let params = DynamicsParams::default();
        let theta = Theta::default();
        let drift = EthicalDrift::zero();

        let low_e = StateVector { e: 0.1, i: 0.6, s: 1.0, v: 0.0 };
        let high_e = StateVector { e: 0.9, i: 0.6, s: 1.0, v: 0.0 };

        let d_low = derivatives(&low_e, &theta, &params, &drift, 0.0);
        let d_high = derivatives(&high_e, &theta, &params, &drift, 0.0);

        assert!((d_low.de - d_high.de).abs() > 1e-6);
    }

    #[test]
    fn coherence_at_v_zero_is_half_c_max() {
        // P3
        let params = DynamicsParams::default();
        let theta = Theta::default();
        assert!((coherence(0.0, &theta, &params) - params.c_max / 2.0).abs() < 1e-12);
    }

    #[test]
    fn lambda1_clamps_at_eta1_extremes() {
        // P4
        let params = DynamicsParams::default();
        let low = Theta { c1: 1.0, eta1: 0.05 };
        let high = Theta { c1: 1.0, eta1: 0.7 };
        assert_eq!(lambda1(&low, &params), params.lambda1_min);
        assert_eq!(lambda1(&high, &params), params.lambda1_max);
    }

    #[test]
    fn step_stays_in_bounds_for_in_range_inputs() {
        // P1
        let params = DynamicsParams::default();
        let theta = Theta::default();
        let mut state = StateVector::initial();
        let drift = EthicalDrift([0.5, 0.5, 0.5]);
        for _ in 0..200 {
            let (next, _) = step(&state, &theta, &params, &drift, 0.8);
            assert!(next.e >= E_BOUNDS.0 && next.e <= E_BOUNDS.1);
            assert!(next.i >= I_BOUNDS.0 && next.i <= I_BOUNDS.1);
            assert!(next.s >= S_BOUNDS.0 && next.s <= S_BOUNDS.1);
            assert!(next.v >= V_BOUNDS.0 && next.v <= V_BOUNDS.1);
            assert!(!next.has_nan_or_inf());
            state = next;
        }
    }

    #[test]
    fn parameter_coherence_is_one_for_identical_fingerprints() {
        let fp = ParameterFingerprint {
            f1: 0.1,
            f2: 0.2,
            f3: 0.3,
            f4: 0.4,
            f5: 0.5,
            f6: 0.6,
            uncertainty: 0.01,
        };
        let params = DynamicsParams::default();
        assert!((parameter_coherence(&fp, &fp, &params) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn objective_bands_match_spec_thresholds() {
        assert_eq!(RiskBand::from_phi(0.2), RiskBand::Safe);
        assert_eq!(RiskBand::from_phi(0.15), RiskBand::Safe);
        assert_eq!(RiskBand::from_phi(0.05), RiskBand::Caution);
        assert_eq!(RiskBand::from_phi(0.0), RiskBand::Caution);
        assert_eq!(RiskBand::from_phi(-0.01), RiskBand::HighRisk);
    }

    proptest::proptest! {
        /// P1, generalized: any single in-range step lands back
        /// in-bounds with no NaN/Inf, for arbitrary starting states,
        /// drift vectors, and complexity.
        #[test]
        fn step_stays_in_bounds_for_arbitrary_in_range_state(
            e in E_BOUNDS.0..=E_BOUNDS.1,
            i in I_BOUNDS.0..=I_BOUNDS.1,
            s in S_BOUNDS.0..=S_BOUNDS.1,
            v in V_BOUNDS.0..=V_BOUNDS.1,
            dx in -1.0f64..=1.0,
            dy in -1.0f64..=1.0,
            dz in -1.0f64..=1.0,
            complexity in 0.0f64..=1.0,
        ) {
            let params = DynamicsParams::default();
            let theta = Theta::default();
            let state = StateVector { e, i, s, v };
            let drift = EthicalDrift([dx, dy, dz]);

            let (next, _) = step(&state, &theta, &params, &drift, complexity);

            prop_assert!(next.e >= E_BOUNDS.0 && next.e <= E_BOUNDS.1);
            prop_assert!(next.i >= I_BOUNDS.0 && next.i <= I_BOUNDS.1);
            prop_assert!(next.s >= S_BOUNDS.0 && next.s <= S_BOUNDS.1);
            prop_assert!(next.v >= V_BOUNDS.0 && next.v <= V_BOUNDS.1);
            prop_assert!(!next.has_nan_or_inf());
        }
    }
}
