//! Age-faded class weights and seeded weighted resampling.

use crate::error::{JitError, Result};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

/// Weights for `size` samples ordered oldest first, fading by
/// `fading_factor` per step of age and summing to `total`.
///
/// The newest sample has age zero and the largest weight.
#[must_use]
pub fn fading_weights(size: usize, fading_factor: f64, total: f64) -> Vec<f64> {
    let raw: Vec<f64> = (0..size)
        .map(|i| fading_factor.powi((size - 1 - i) as i32))
        .collect();
    let sum: f64 = raw.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        return vec![total / size.max(1) as f64; size];
    }
    raw.into_iter().map(|w| total * w / sum).collect()
}

/// Per-sample weights for a batch of binary targets.
///
/// Samples of class `c` share a mass of `class_totals[c]`, spread across
/// them with [`fading_weights`] in batch order.
#[must_use]
pub fn class_fading_weights(
    targets: &[u8],
    class_totals: [f64; 2],
    fading_factor: f64,
) -> Vec<f64> {
    let mut weights = vec![0.0; targets.len()];
    for class in 0..2u8 {
        let indices: Vec<usize> = targets
            .iter()
            .enumerate()
            .filter_map(|(i, &t)| (t == class).then_some(i))
            .collect();
        let total = class_totals[usize::from(class)];
        let faded = fading_weights(indices.len(), fading_factor, total);
        for (i, w) in indices.into_iter().zip(faded) {
            weights[i] = w;
        }
    }
    weights
}

/// Draw `n` indices with replacement, proportionally to `weights`.
///
/// # Errors
///
/// Returns an error if the weights are empty, negative, or all zero.
pub fn resample<R: Rng + ?Sized>(weights: &[f64], n: usize, rng: &mut R) -> Result<Vec<usize>> {
    let dist: WeightedIndex<f64> = WeightedIndex::new(weights)
        .map_err(|e| JitError::invalid_data(format!("cannot resample: {e}")))?;
    Ok((0..n).map(|_| dist.sample(rng)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_fading_weights_sum_to_total() {
        let w = fading_weights(5, 0.9, 3.0);
        assert!((w.iter().sum::<f64>() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_fading_weights_newest_largest() {
        let w = fading_weights(4, 0.5, 1.0);
        // raw: .125, .25, .5, 1 -> sum 1.875
        assert!((w[3] - 1.0 / 1.875).abs() < 1e-12);
        assert!(w.windows(2).all(|p| p[0] < p[1]));
    }

    #[test]
    fn test_fading_weights_no_decay_uniform() {
        let w = fading_weights(4, 1.0, 2.0);
        assert!(w.iter().all(|&x| (x - 0.5).abs() < 1e-12));
    }

    #[test]
    fn test_fading_weights_empty() {
        assert!(fading_weights(0, 0.9, 1.0).is_empty());
    }

    #[test]
    fn test_class_fading_weights_per_class_mass() {
        let targets = [0, 1, 0, 0, 1];
        let w = class_fading_weights(&targets, [2.0, 5.0], 0.9);
        let clean: f64 = [0, 2, 3].iter().map(|&i| w[i]).sum();
        let bug: f64 = [1, 4].iter().map(|&i| w[i]).sum();
        assert!((clean - 2.0).abs() < 1e-12);
        assert!((bug - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_resample_deterministic() {
        let weights = [0.1, 0.2, 0.3, 0.4];
        let a = resample(&weights, 50, &mut StdRng::seed_from_u64(3)).unwrap();
        let b = resample(&weights, 50, &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(a, b);
        assert!(a.iter().all(|&i| i < 4));
    }

    #[test]
    fn test_resample_skips_zero_weight() {
        let weights = [0.0, 1.0, 0.0];
        let drawn = resample(&weights, 20, &mut StdRng::seed_from_u64(1)).unwrap();
        assert!(drawn.iter().all(|&i| i == 1));
    }

    #[test]
    fn test_resample_all_zero_is_error() {
        assert!(resample(&[0.0, 0.0], 3, &mut StdRng::seed_from_u64(1)).is_err());
    }
}
