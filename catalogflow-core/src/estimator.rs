use crate::error::{Error, Result};

/// Supported confidence levels and their z-scores.
const Z_SCORES: [(f64, f64); 3] = [(0.90, 1.645), (0.95, 1.96), (0.99, 2.576)];

/// Worst-case proportion, maximizes `p(1 - p)`.
const PROPORTION: f64 = 0.5;

/// z-score of the supported level nearest to `confidence`. On a tie the earlier table entry wins.
fn z_score(confidence: f64) -> f64 {
    let mut best = Z_SCORES[0];
    for entry in &Z_SCORES[1..] {
        if (entry.0 - confidence).abs() < (best.0 - confidence).abs() {
            best = *entry;
        }
    }
    best.1
}

/// Minimum sample size to estimate a proportion within `margin` at `confidence`:
/// `ceil(z² · p(1 − p) / e²)`, clamped to `population`.
pub fn estimate_sample_size(population: usize, confidence: f64, margin: f64) -> Result<usize> {
    if population == 0 {
        return Err(Error::Config("population must be greater than 0".to_string()));
    }
    if !(margin > 0.0 && margin < 1.0) {
        return Err(Error::Config(format!(
            "margin of error must be in (0, 1), got {margin}"
        )));
    }
    if !(confidence > 0.0 && confidence < 1.0) {
        return Err(Error::Config(format!(
            "confidence must be in (0, 1), got {confidence}"
        )));
    }

    let z = z_score(confidence);
    let n = (z * z * PROPORTION * (1.0 - PROPORTION) / (margin * margin)).ceil();
    Ok((n as usize).min(population))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_values() {
        assert_eq!(estimate_sample_size(1000, 0.95, 0.05).unwrap(), 385);
        assert_eq!(estimate_sample_size(100, 0.95, 0.05).unwrap(), 100);
        assert_eq!(estimate_sample_size(1_000_000, 0.99, 0.01).unwrap(), 16590);
        assert_eq!(estimate_sample_size(1_000_000, 0.90, 0.05).unwrap(), 271);
    }

    #[test]
    fn test_nearest_confidence_level() {
        assert_eq!(z_score(0.94), 1.96);
        assert_eq!(z_score(0.5), 1.645);
        assert_eq!(z_score(0.999), 2.576);
        // 0.97 is exactly as far from 0.95 as from 0.99, the earlier entry wins
        assert_eq!(z_score(0.97), 1.96);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            estimate_sample_size(0, 0.95, 0.05),
            Err(Error::Config(_))
        ));
        for margin in [0.0, 1.0, -0.1, f64::NAN] {
            assert!(estimate_sample_size(10, 0.95, margin).is_err());
        }
        for confidence in [0.0, 1.0, 1.5, f64::NAN] {
            assert!(estimate_sample_size(10, confidence, 0.05).is_err());
        }
    }
}
