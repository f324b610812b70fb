//! Paradox loss: a dominant per-entry sign penalty plus RMSE against the target.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Cost of each entry whose sign disagrees with the target.
    ///
    /// Sign agreement only dominates while RMSE stays below this value: a
    /// correct-sign trajectory with RMSE above `sign_penalty` scores worse
    /// than one with a single flipped sign and small magnitude error. Raise
    /// it when target magnitudes are large.
    pub sign_penalty: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self { sign_penalty: 10.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScoreError {
    #[error("trajectory has {trajectory} entries, target has {target}")]
    LengthMismatch { trajectory: usize, target: usize },
    #[error("cannot score an empty trajectory")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub sign_mismatches: usize,
    pub sign_penalty: f64,
    pub magnitude_error: f64,
    pub total: f64,
}

/// Three-valued sign; zero only matches zero.
pub fn sign(v: f64) -> i8 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

/// True when every entry of `trajectory` has the sign of the matching target entry.
pub fn signs_match(trajectory: &[f64], target: &[f64]) -> bool {
    trajectory.len() == target.len()
        && trajectory
            .iter()
            .zip(target)
            .all(|(t, r)| sign(*t) == sign(*r))
}

impl ScoringConfig {
    pub fn score(&self, trajectory: &[f64], target: &[f64]) -> Result<ScoreBreakdown, ScoreError> {
        if trajectory.len() != target.len() {
            return Err(ScoreError::LengthMismatch {
                trajectory: trajectory.len(),
                target: target.len(),
            });
        }
        if target.is_empty() {
            return Err(ScoreError::Empty);
        }

        let sign_mismatches = trajectory
            .iter()
            .zip(target)
            .filter(|(t, r)| sign(**t) != sign(**r))
            .count();
        let mse = trajectory
            .iter()
            .zip(target)
            .map(|(t, r)| (t - r).powi(2))
            .sum::<f64>()
            / target.len() as f64;

        let sign_penalty = self.sign_penalty * sign_mismatches as f64;
        let magnitude_error = mse.sqrt();
        Ok(ScoreBreakdown {
            sign_mismatches,
            sign_penalty,
            magnitude_error,
            total: sign_penalty + magnitude_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALTERNATING: [f64; 6] = [1.0, -1.0, 1.0, -1.0, 1.0, -1.0];

    #[test]
    fn exact_match_scores_zero() {
        let s = ScoringConfig::default()
            .score(&ALTERNATING, &ALTERNATING)
            .unwrap();
        assert_eq!(s.total, 0.0);
        assert_eq!(s.sign_mismatches, 0);
    }

    #[test]
    fn one_flipped_sign_outweighs_large_magnitude_error() {
        let cfg = ScoringConfig::default();

        let mut flipped = ALTERNATING;
        flipped[3] = 1.0;
        let flipped_score = cfg.score(&flipped, &ALTERNATING).unwrap();

        let inflated: Vec<f64> = ALTERNATING.iter().map(|v| v * 5.0).collect();
        let inflated_score = cfg.score(&inflated, &ALTERNATING).unwrap();

        assert_eq!(flipped_score.sign_mismatches, 1);
        assert_eq!(inflated_score.sign_mismatches, 0);
        assert!((inflated_score.magnitude_error - 4.0).abs() < 1e-12);
        assert!(flipped_score.total > inflated_score.total);
    }

    #[test]
    fn magnitude_error_beyond_the_penalty_outranks_a_flip() {
        let mut flipped = ALTERNATING;
        flipped[3] = 1.0;
        let blown_up: Vec<f64> = ALTERNATING.iter().map(|v| v * 13.0).collect();

        let cfg = ScoringConfig::default();
        let flip = cfg.score(&flipped, &ALTERNATING).unwrap();
        let blown = cfg.score(&blown_up, &ALTERNATING).unwrap();
        assert_eq!(blown.sign_mismatches, 0);
        assert!((blown.magnitude_error - 12.0).abs() < 1e-12);
        assert!(blown.total > flip.total);

        let strict = ScoringConfig { sign_penalty: 20.0 };
        let flip = strict.score(&flipped, &ALTERNATING).unwrap();
        let blown = strict.score(&blown_up, &ALTERNATING).unwrap();
        assert!(blown.total < flip.total);
    }

    #[test]
    fn zero_coefficient_is_a_sign_mismatch() {
        let s = ScoringConfig { sign_penalty: 3.0 }
            .score(&[0.0, -1.0], &[1.0, -1.0])
            .unwrap();
        assert_eq!(s.sign_mismatches, 1);
        assert!((s.total - (3.0 + (0.5f64).sqrt())).abs() < 1e-12);
    }

    #[test]
    fn length_mismatch_and_empty_are_errors() {
        let cfg = ScoringConfig::default();
        assert_eq!(
            cfg.score(&[1.0], &[1.0, 2.0]).unwrap_err(),
            ScoreError::LengthMismatch {
                trajectory: 1,
                target: 2
            }
        );
        assert_eq!(cfg.score(&[], &[]).unwrap_err(), ScoreError::Empty);
    }

    #[test]
    fn signs_match_checks_every_entry() {
        assert!(signs_match(&[0.2, -3.0], &[1.0, -1.0]));
        assert!(!signs_match(&[0.2, 3.0], &[1.0, -1.0]));
        assert!(!signs_match(&[0.2], &[1.0, -1.0]));
    }
}
