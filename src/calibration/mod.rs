//! Calibration bins and telemetry. A confidence histogram
//! over ten 0.1-wide bins, corrected via Laplace smoothing, plus
//! telemetry derived from the audit log (skip rate, confidence
//! distribution, suspicious patterns).

mod telemetry;

use serde::{Deserialize, Serialize};

pub use telemetry::{ConfidenceSample, SuspiciousPattern, Telemetry};

const BIN_COUNT: usize = 10;
const MIN_SAMPLES_FOR_CORRECTION: u64 = 10;
/// Laplace smoothing pseudo-count; keeps a bin with e.g. 2/2 correct
/// from reporting an overconfident 100% before it has real history.
const LAPLACE_ALPHA: f64 = 1.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBin {
    pub count: u64,
    pub predicted_correct: u64,
    pub actual_correct: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTable {
    bins: [CalibrationBin; BIN_COUNT],
}

impl Default for CalibrationTable {
    fn default() -> Self {
        Self {
            bins: [CalibrationBin::default(); BIN_COUNT],
        }
    }
}

fn bin_index(confidence: f64) -> usize {
    ((confidence.clamp(0.0, 1.0) * BIN_COUNT as f64) as usize).min(BIN_COUNT - 1)
}

impl CalibrationTable {
    /// Record a reported confidence and whether the prediction it
    /// backed was (eventually known to be) correct. `predicted_correct`
    /// counts cases where the agent's own confidence crossed the gate
    /// threshold; `actual_correct` is only ever incremented out-of-band
    /// via `record_ground_truth`.
    pub fn record_prediction(&mut self, confidence: f64, predicted_correct: bool) {
        let bin = &mut self.bins[bin_index(confidence)];
        bin.count += 1;
        if predicted_correct {
            bin.predicted_correct += 1;
        }
    }

    /// Supplied by external review or trajectory outcomes
    /// (`update_calibration_ground_truth`); increments the matching
    /// bin's `actual_correct` tally.
    pub fn record_ground_truth(&mut self, confidence: f64, was_correct: bool) {
        if was_correct {
            self.bins[bin_index(confidence)].actual_correct += 1;
        }
    }

    pub fn bin(&self, confidence: f64) -> CalibrationBin {
        self.bins[bin_index(confidence)]
    }

    /// Corrected confidence for a bin, Laplace-smoothed. Bins with
    /// `count < 10` are "insufficient samples" and the raw confidence
    /// is returned unchanged.
    pub fn correct(&self, confidence: f64) -> CorrectedConfidence {
        let bin = self.bin(confidence);
        if bin.count < MIN_SAMPLES_FOR_CORRECTION {
            return CorrectedConfidence {
                value: confidence,
                insufficient_samples: true,
            };
        }

        let corrected = (bin.actual_correct as f64 + LAPLACE_ALPHA)
            / (bin.count as f64 + 2.0 * LAPLACE_ALPHA);

        CorrectedConfidence {
            value: corrected,
            insufficient_samples: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectedConfidence {
    pub value: f64,
    pub insufficient_samples: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_samples_returns_raw_confidence() {
        let table = CalibrationTable::default();
        let corrected = table.correct(0.85);
        assert!(corrected.insufficient_samples);
        assert_eq!(corrected.value, 0.85);
    }

    #[test]
    fn correction_applies_once_enough_samples() {
        let mut table = CalibrationTable::default();
        for _ in 0..50 {
            table.record_prediction(0.85, true);
        }
        for _ in 0..20 {
            table.record_ground_truth(0.85, true);
        }
        let corrected = table.correct(0.85);
        assert!(!corrected.insufficient_samples);
        // 20 correct of 50, Laplace smoothed -> close to but not
        // exactly 0.4.
        assert!((corrected.value - 0.4).abs() < 0.05);
    }

    #[test]
    fn bin_index_is_stable_at_boundaries() {
        assert_eq!(bin_index(0.0), 0);
        assert_eq!(bin_index(1.0), BIN_COUNT - 1);
        assert_eq!(bin_index(0.95), 9);
    }
}
