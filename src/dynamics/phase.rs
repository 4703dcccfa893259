//! Basin-of-attraction check and exploration/integration phase
//! detection.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Basin {
    High,
    Low,
    Boundary,
}

/// `check_basin(I, threshold=0.5, margin=0.05)`. The unstable boundary
/// sits near `I = 0.5`; `margin` widens it into a band rather than a
/// single point so small noise doesn't flap the basin label.
pub fn check_basin(i: f64, threshold: f64, margin: f64) -> Basin {
    if i > threshold + margin {
        Basin::High
    } else if i < threshold - margin {
        Basin::Low
    } else {
        Basin::Boundary
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Exploration,
    Integration,
}

/// One window sample: the fields phase detection reads from history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseSample {
    pub i: f64,
    pub s: f64,
    pub complexity: f64,
}

const WINDOW: usize = 10;
const COMPLEXITY_HIGH_THRESHOLD: f64 = 0.6;

/// `detect_phase`: sliding window over the last `WINDOW` samples (most
/// recent last). Needs at least `WINDOW + 1` samples to decide;
/// defaults to `Integration` otherwise.
pub fn detect_phase(history: &[PhaseSample]) -> Phase {
    if history.len() < WINDOW + 1 {
        return Phase::Integration;
    }

    let window = &history[history.len() - WINDOW..];
    let first = window.first().expect("window is non-empty by construction");
    let last = window.last().expect("window is non-empty by construction");

    let i_growing = last.i > first.i;
    let s_declining = last.s < first.s;
    let avg_complexity: f64 =
        window.iter().map(|s| s.complexity).sum::<f64>() / window.len() as f64;
    let complexity_high = avg_complexity > COMPLEXITY_HIGH_THRESHOLD;

    if i_growing && s_declining && complexity_high {
        Phase::Exploration
    } else {
        Phase::Integration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basin_bands_match_spec_defaults() {
        assert_eq!(check_basin(0.91, 0.5, 0.05), Basin::High);
        assert_eq!(check_basin(0.09, 0.5, 0.05), Basin::Low);
        assert_eq!(check_basin(0.5, 0.5, 0.05), Basin::Boundary);
        assert_eq!(check_basin(0.52, 0.5, 0.05), Basin::Boundary);
    }

    #[test]
    fn phase_defaults_to_integration_without_enough_samples() {
        let short: Vec<PhaseSample> = (0..WINDOW)
            .map(|n| PhaseSample {
                i: 0.5 + n as f64 * 0.01,
                s: 0.5 - n as f64 * 0.01,
                complexity: 0.9,
            })
            .collect();
        assert_eq!(detect_phase(&short), Phase::Integration);
    }

    #[test]
    fn phase_detects_exploration_on_growing_i_declining_s_high_complexity() {
        let history: Vec<PhaseSample> = (0..=WINDOW)
            .map(|n| PhaseSample {
                i: 0.3 + n as f64 * 0.05,
                s: 1.0 - n as f64 * 0.05,
                complexity: 0.9,
            })
            .collect();
        assert_eq!(detect_phase(&history), Phase::Exploration);
    }

    #[test]
    fn phase_is_integration_when_state_is_stable() {
        let history = vec![
            PhaseSample {
                i: 0.8,
                s: 0.2,
                complexity: 0.3
            };
            WINDOW + 1
        ];
        assert_eq!(detect_phase(&history), Phase::Integration);
    }
}
