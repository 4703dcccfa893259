//! Telemetry metrics computed over recorded confidence samples: skip
//! rate, confidence distribution, suspicious patterns. Deliberately not
//! computed incrementally — these are derived from the audit log, so
//! this module takes a slice of samples rather than owning its own
//! running state.

use serde::{Deserialize, Serialize};

const BIN_BOUNDARY_EPSILON: f64 = 1e-6;
const SUSPICIOUS_BOUNDARY_FRACTION: f64 = 0.5;
const SUSPICIOUS_MIN_SAMPLES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceSample {
    pub confidence: f64,
    pub lambda1_update_skipped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SuspiciousPattern {
    /// Confidence landed exactly on a bin boundary (e.g. 0.800000) far
    /// more often than chance would predict — a common artifact of an
    /// agent hardcoding or clamping its reported confidence.
    ClampedAtBinBoundary { fraction: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub skip_rate: f64,
    pub mean_confidence: f64,
    pub median_confidence: f64,
    pub histogram: [u64; 10],
    pub suspicious_patterns: Vec<SuspiciousPattern>,
}

fn is_on_bin_boundary(confidence: f64) -> bool {
    let scaled = confidence * 10.0;
    (scaled - scaled.round()).abs() < BIN_BOUNDARY_EPSILON * 10.0
}

impl Telemetry {
    pub fn compute(samples: &[ConfidenceSample]) -> Self {
        if samples.is_empty() {
            return Self {
                skip_rate: 0.0,
                mean_confidence: 0.0,
                median_confidence: 0.0,
                histogram: [0; 10],
                suspicious_patterns: Vec::new(),
            };
        }

        let skipped = samples.iter().filter(|s| s.lambda1_update_skipped).count();
        let skip_rate = skipped as f64 / samples.len() as f64;

        let mut confidences: Vec<f64> = samples.iter().map(|s| s.confidence).collect();
        let mean_confidence = confidences.iter().sum::<f64>() / confidences.len() as f64;
        confidences.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let median_confidence = confidences[confidences.len() / 2];

        let mut histogram = [0u64; 10];
        for s in samples {
            let idx = ((s.confidence.clamp(0.0, 1.0) * 10.0) as usize).min(9);
            histogram[idx] += 1;
        }

        let on_boundary = samples.iter().filter(|s| is_on_bin_boundary(s.confidence)).count();
        let boundary_fraction = on_boundary as f64 / samples.len() as f64;

        let mut suspicious_patterns = Vec::new();
        if samples.len() >= SUSPICIOUS_MIN_SAMPLES && boundary_fraction > SUSPICIOUS_BOUNDARY_FRACTION {
            suspicious_patterns.push(SuspiciousPattern::ClampedAtBinBoundary {
                fraction: boundary_fraction,
            });
        }

        Self {
            skip_rate,
            mean_confidence,
            median_confidence,
            histogram,
            suspicious_patterns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_rate_counts_skipped_fraction() {
        let samples = vec![
            ConfidenceSample { confidence: 0.9, lambda1_update_skipped: false },
            ConfidenceSample { confidence: 0.5, lambda1_update_skipped: true },
            ConfidenceSample { confidence: 0.5, lambda1_update_skipped: true },
            ConfidenceSample { confidence: 0.9, lambda1_update_skipped: false },
        ];
        let telemetry = Telemetry::compute(&samples);
        assert_eq!(telemetry.skip_rate, 0.5);
    }

    #[test]
    fn flags_suspicious_boundary_clamping() {
        let samples: Vec<ConfidenceSample> = (0..20)
            .map(|_| ConfidenceSample { confidence: 0.8, lambda1_update_skipped: false })
            .collect();
        let telemetry = Telemetry::compute(&samples);
        assert!(!telemetry.suspicious_patterns.is_empty());
    }

    #[test]
    fn no_flag_for_naturally_varied_confidence() {
        let samples: Vec<ConfidenceSample> = (0..20)
            .map(|n| ConfidenceSample {
                confidence: 0.5 + (n as f64) * 0.013,
                lambda1_update_skipped: false,
            })
            .collect();
        let telemetry = Telemetry::compute(&samples);
        assert!(telemetry.suspicious_patterns.is_empty());
    }
}
