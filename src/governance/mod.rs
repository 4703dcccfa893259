//! Verdict decision layer: maps dynamics output to a
//! governance verdict with the documented tie-break rules.

use serde::{Deserialize, Serialize};

use crate::dynamics::{Basin, Phase, RiskBand};
use crate::identity::TrustTier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Proceed,
    Guide,
    Pause,
    Reject,
}

#[derive(Debug, Clone, Copy)]
pub struct DecisionInput {
    pub risk_band: RiskBand,
    pub phase: Phase,
    pub basin: Basin,
    pub void_active: bool,
    /// Coherence has fallen below `coherence_critical_threshold`
    /// (§6.4); escalates to at least `Pause` like `void_active`.
    pub coherence_critical: bool,
    pub trust_tier: TrustTier,
    /// Number of consecutive updates the agent has sat in the low
    /// basin.
    pub consecutive_low_basin: u32,
    /// Number of consecutive updates the agent has failed to recover
    /// out of pause/reject-eligible territory.
    pub consecutive_failed_recovery: u32,
    pub reject_window: u32,
}

/// Risk-band adjustment applied before banding, per trust tier:
/// tier 3 gets a -5% risk discount, tiers 0-1
/// get a +5% penalty, tier 2 is neutral. Operates on the raw Phi value
/// the caller already computed — widening or narrowing its distance
/// from the band edges rather than re-deriving Phi.
pub fn adjust_phi_for_trust(phi: f64, trust_tier: TrustTier) -> f64 {
    const ADJUSTMENT: f64 = 0.05;
    match trust_tier {
        TrustTier::T3 => phi + ADJUSTMENT,
        TrustTier::T0 | TrustTier::T1 => phi - ADJUSTMENT,
        TrustTier::T2 => phi,
    }
}

/// `decide`: the verdict mapping plus tie-breaks. `risk_band`
/// should already reflect the trust-tier-adjusted Phi (via
/// `adjust_phi_for_trust` then `RiskBand::from_phi`).
pub fn decide(input: DecisionInput) -> Verdict {
    let sustained_low_basin = input.basin == Basin::Low && input.consecutive_low_basin >= 3;
    let void_hard = input.void_active; // caller has already applied |V| > V_hard gating.

    if sustained_low_basin && input.consecutive_failed_recovery >= input.reject_window {
        return Verdict::Reject;
    }

    if input.risk_band == RiskBand::HighRisk || sustained_low_basin || void_hard || input.coherence_critical {
        // void_active and coherence_critical always escalate at least to pause.
        return Verdict::Pause;
    }

    // Borderline coherence cases land in Caution or Boundary; the
    // exploration-phase tie-break prefers guide over pause here.
    if input.phase == Phase::Exploration
        && (input.risk_band == RiskBand::Caution || input.basin == Basin::Boundary)
    {
        return Verdict::Guide;
    }

    if input.risk_band == RiskBand::Caution || input.basin == Basin::Boundary {
        return Verdict::Guide;
    }

    if input.risk_band == RiskBand::Safe && input.basin == Basin::High && !input.void_active {
        return Verdict::Proceed;
    }

    Verdict::Guide
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_input() -> DecisionInput {
        DecisionInput {
            risk_band: RiskBand::Safe,
            phase: Phase::Integration,
            basin: Basin::High,
            void_active: false,
            coherence_critical: false,
            trust_tier: TrustTier::T1,
            consecutive_low_basin: 0,
            consecutive_failed_recovery: 0,
            reject_window: 5,
        }
    }

    #[test]
    fn safe_high_basin_no_void_proceeds() {
        assert_eq!(decide(base_input()), Verdict::Proceed);
    }

    #[test]
    fn void_active_always_escalates_to_at_least_pause() {
        let mut input = base_input();
        input.void_active = true;
        assert_eq!(decide(input), Verdict::Pause);
    }

    #[test]
    fn coherence_critical_always_escalates_to_at_least_pause() {
        let mut input = base_input();
        input.coherence_critical = true;
        assert_eq!(decide(input), Verdict::Pause);
    }

    #[test]
    fn high_risk_pauses() {
        let mut input = base_input();
        input.risk_band = RiskBand::HighRisk;
        assert_eq!(decide(input), Verdict::Pause);
    }

    #[test]
    fn sustained_low_basin_pauses() {
        let mut input = base_input();
        input.basin = Basin::Low;
        input.consecutive_low_basin = 3;
        assert_eq!(decide(input), Verdict::Pause);
    }

    #[test]
    fn sustained_low_basin_with_failed_recovery_rejects() {
        let mut input = base_input();
        input.basin = Basin::Low;
        input.consecutive_low_basin = 3;
        input.consecutive_failed_recovery = 5;
        assert_eq!(decide(input), Verdict::Reject);
    }

    #[test]
    fn exploration_phase_prefers_guide_on_borderline_coherence() {
        let mut input = base_input();
        input.phase = Phase::Exploration;
        input.risk_band = RiskBand::Caution;
        assert_eq!(decide(input), Verdict::Guide);
    }

    #[test]
    fn trust_tier_adjustment_direction() {
        // Tier 3 gets a risk discount, which means a *higher* effective
        // Phi (less likely to band into caution/high-risk); tiers 0-1
        // get a risk penalty, a *lower* effective Phi.
        let phi = 0.1;
        assert!(adjust_phi_for_trust(phi, TrustTier::T3) > phi);
        assert!(adjust_phi_for_trust(phi, TrustTier::T0) < phi);
        assert_eq!(adjust_phi_for_trust(phi, TrustTier::T2), phi);
    }
}
