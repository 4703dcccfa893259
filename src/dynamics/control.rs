//! PI controller nudging `theta.eta1` toward target coherence and
//! target void-event frequency. Runs every N updates,
//! not every update.

use serde::{Deserialize, Serialize};

use super::kernel::Theta;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PiController {
    pub kp: f64,
    pub ki: f64,
    /// Anti-windup clamp on the accumulated integral term.
    pub integral_bound: f64,
    /// Run the controller every N updates (default 10).
    pub update_interval: u32,
    pub target_coherence: f64,
    pub target_void_freq: f64,
    /// Relative weight of the coherence error vs. the void-frequency
    /// error in the combined error signal.
    pub coherence_weight: f64,
    pub void_freq_weight: f64,
}

impl Default for PiController {
    fn default() -> Self {
        Self {
            kp: 0.1,
            ki: 0.02,
            integral_bound: 1.0,
            update_interval: 10,
            target_coherence: 0.85,
            target_void_freq: 0.02,
            coherence_weight: 0.6,
            void_freq_weight: 0.4,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PiControllerState {
    integral: f64,
}

impl PiController {
    pub fn should_run(&self, update_count: u64) -> bool {
        self.update_interval > 0 && update_count % self.update_interval as u64 == 0
    }

    /// Combined error: coherence below target pushes positive (nudge
    /// eta1 up raises lambda1, which the kernel's derivation treats as
    /// the knob available to the controller); void frequency above
    /// target pushes negative (nudge eta1 down).
    fn combined_error(&self, measured_coherence: f64, measured_void_freq: f64) -> f64 {
        let coherence_error = self.target_coherence - measured_coherence;
        let void_freq_error = measured_void_freq - self.target_void_freq;
        self.coherence_weight * coherence_error - self.void_freq_weight * void_freq_error
    }

    /// One controller step. Only call when `should_run` is true for the
    /// current update count. Returns the new `eta1`, clipped to
    /// `Theta::ETA1_BOUNDS`.
    pub fn step(
        &self,
        pi_state: &mut PiControllerState,
        current_eta1: f64,
        measured_coherence: f64,
        measured_void_freq: f64,
    ) -> f64 {
        let error = self.combined_error(measured_coherence, measured_void_freq);

        pi_state.integral =
            (pi_state.integral + error).clamp(-self.integral_bound, self.integral_bound);

        let adjustment = self.kp * error + self.ki * pi_state.integral;
        let (lo, hi) = Theta::ETA1_BOUNDS;
        (current_eta1 + adjustment).clamp(lo, hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_only_every_update_interval() {
        let pi = PiController::default();
        assert!(pi.should_run(0));
        assert!(!pi.should_run(1));
        assert!(!pi.should_run(9));
        assert!(pi.should_run(10));
        assert!(pi.should_run(20));
    }

    #[test]
    fn low_coherence_pushes_eta1_up() {
        let pi = PiController::default();
        let mut state = PiControllerState::default();
        let next = pi.step(&mut state, 0.2, 0.5, 0.0);
        assert!(next > 0.2);
    }

    #[test]
    fn result_stays_within_eta1_bounds() {
        let pi = PiController::default();
        let mut state = PiControllerState::default();
        let mut eta1 = 0.49;
        for _ in 0..50 {
            eta1 = pi.step(&mut state, eta1, 0.0, 0.0);
        }
        let (lo, hi) = Theta::ETA1_BOUNDS;
        assert!(eta1 >= lo && eta1 <= hi);
    }

    #[test]
    fn integral_term_is_clamped() {
        let pi = PiController::default();
        let mut state = PiControllerState::default();
        for _ in 0..1000 {
            pi.step(&mut state, 0.2, 1.0, 0.0);
        }
        assert!(state.integral.abs() <= pi.integral_bound + 1e-9);
    }
}
