//! Incremental binary classifiers.
//!
//! The pipeline only relies on the [`Classifier`] capability: one training
//! pass over a weighted batch, and a probability per row. Two reference
//! learners and an averaging ensemble are provided; any other learner can
//! be plugged in by implementing the trait.

use crate::config::{ModelConfig, ModelKind};
use crate::error::{JitError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// A trainable probability estimator for the bug class.
pub trait Classifier {
    /// Run exactly one training iteration over a weighted batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch is malformed (length mismatch or a
    /// feature vector of the wrong size).
    fn train(&mut self, features: &[Vec<f64>], targets: &[u8], weights: &[f64]) -> Result<()>;

    /// Probability of the bug class for every row. An untrained learner
    /// answers 0 for every row.
    fn predict_proba(&self, features: &[Vec<f64>]) -> Vec<f64>;

    /// Training iterations one external training call should perform.
    fn n_iterations(&self) -> usize;
}

fn check_batch(features: &[Vec<f64>], targets: &[u8], weights: &[f64], dim: usize) -> Result<()> {
    if features.len() != targets.len() || features.len() != weights.len() {
        return Err(JitError::invalid_data(format!(
            "batch lengths differ: {} features, {} targets, {} weights",
            features.len(),
            targets.len(),
            weights.len()
        )));
    }
    if let Some(row) = features.iter().find(|row| row.len() != dim) {
        return Err(JitError::DimensionMismatch {
            expected: dim,
            actual: row.len(),
        });
    }
    Ok(())
}

fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Running per-feature mean and variance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningScaler {
    count: f64,
    mean: Vec<f64>,
    m2: Vec<f64>,
}

impl RunningScaler {
    /// Create an empty scaler for `dim` features.
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self {
            count: 0.0,
            mean: vec![0.0; dim],
            m2: vec![0.0; dim],
        }
    }

    /// Fold one row into the statistics.
    pub fn update(&mut self, row: &[f64]) {
        self.count += 1.0;
        for ((mean, m2), &x) in self.mean.iter_mut().zip(self.m2.iter_mut()).zip(row) {
            let delta = x - *mean;
            *mean += delta / self.count;
            *m2 += delta * (x - *mean);
        }
    }

    /// Standardize a row; constant features map to zero.
    #[must_use]
    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        if self.count == 0.0 {
            return row.to_vec();
        }
        row.iter()
            .zip(self.mean.iter().zip(&self.m2))
            .map(|(&x, (&mean, &m2))| {
                let std = (m2 / self.count).sqrt();
                if std > 1e-12 {
                    (x - mean) / std
                } else {
                    0.0
                }
            })
            .collect()
    }
}

/// Weighted mini-batch logistic regression with L2 penalty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticSgd {
    /// Model weights
    pub weights: Vec<f64>,
    /// Bias term
    pub bias: f64,
    /// Step size
    pub learning_rate: f64,
    /// L2 regularization
    pub l2_reg: f64,
    /// Rows per gradient step
    pub batch_size: usize,
    /// Passes per external training call
    pub n_epochs: usize,
    /// Feature standardization
    pub scaler: RunningScaler,
    /// Seed for epoch shuffling
    pub seed: u64,
    /// Epochs completed so far
    pub epochs_trained: u64,
}

impl LogisticSgd {
    /// Create a learner for `dim` features.
    #[must_use]
    pub fn new(dim: usize, learning_rate: f64, seed: u64) -> Self {
        Self {
            weights: vec![0.0; dim],
            bias: 0.0,
            learning_rate,
            l2_reg: 0.001,
            batch_size: 32,
            n_epochs: 10,
            scaler: RunningScaler::new(dim),
            seed,
            epochs_trained: 0,
        }
    }

    /// Set L2 regularization.
    #[must_use]
    pub fn with_l2_reg(mut self, l2: f64) -> Self {
        self.l2_reg = l2;
        self
    }

    /// Set the mini-batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the number of epochs per external call.
    #[must_use]
    pub fn with_epochs(mut self, n_epochs: usize) -> Self {
        self.n_epochs = n_epochs.max(1);
        self
    }

    fn logit(&self, z: &[f64]) -> f64 {
        self.bias + z.iter().zip(&self.weights).map(|(x, w)| x * w).sum::<f64>()
    }
}

impl Classifier for LogisticSgd {
    fn train(&mut self, features: &[Vec<f64>], targets: &[u8], weights: &[f64]) -> Result<()> {
        check_batch(features, targets, weights, self.weights.len())?;
        for row in features {
            self.scaler.update(row);
        }
        let scaled: Vec<Vec<f64>> = features.iter().map(|r| self.scaler.transform(r)).collect();

        let mut order: Vec<usize> = (0..features.len()).collect();
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(self.epochs_trained));
        order.shuffle(&mut rng);

        for chunk in order.chunks(self.batch_size) {
            let mut grad = vec![0.0; self.weights.len()];
            let mut grad_bias = 0.0;
            let mut mass = 0.0;
            for &i in chunk {
                let error = (sigmoid(self.logit(&scaled[i])) - f64::from(targets[i])) * weights[i];
                for (g, &x) in grad.iter_mut().zip(&scaled[i]) {
                    *g += error * x;
                }
                grad_bias += error;
                mass += weights[i];
            }
            if mass <= 0.0 {
                continue;
            }
            for (w, g) in self.weights.iter_mut().zip(&grad) {
                *w -= self.learning_rate * (g / mass + self.l2_reg * *w);
            }
            self.bias -= self.learning_rate * grad_bias / mass;
        }
        self.epochs_trained += 1;
        Ok(())
    }

    fn predict_proba(&self, features: &[Vec<f64>]) -> Vec<f64> {
        if self.epochs_trained == 0 {
            return vec![0.0; features.len()];
        }
        features
            .iter()
            .map(|row| sigmoid(self.logit(&self.scaler.transform(row))))
            .collect()
    }

    fn n_iterations(&self) -> usize {
        self.n_epochs
    }
}

/// Per-class weighted Gaussian sufficient statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ClassStats {
    weight: f64,
    mean: Vec<f64>,
    var: Vec<f64>,
}

impl ClassStats {
    fn new(dim: usize) -> Self {
        Self {
            weight: 0.0,
            mean: vec![0.0; dim],
            var: vec![0.0; dim],
        }
    }

    fn update(&mut self, row: &[f64], w: f64) {
        if w <= 0.0 {
            return;
        }
        let total = self.weight + w;
        for ((mean, var), &x) in self.mean.iter_mut().zip(self.var.iter_mut()).zip(row) {
            let delta = x - *mean;
            let r = delta * w / total;
            let m2 = *var * self.weight + self.weight * delta * r;
            *mean += r;
            *var = m2 / total;
        }
        self.weight = total;
    }
}

/// Incremental Gaussian naive Bayes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianNb {
    classes: [ClassStats; 2],
    /// Portion of the largest variance added to every variance
    pub var_smoothing: f64,
    /// Updates per external training call
    pub n_updates: usize,
}

impl GaussianNb {
    /// Create a model for `dim` features.
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self {
            classes: [ClassStats::new(dim), ClassStats::new(dim)],
            var_smoothing: 1e-9,
            n_updates: 1,
        }
    }

    /// Set the number of updates per external call.
    #[must_use]
    pub fn with_updates(mut self, n_updates: usize) -> Self {
        self.n_updates = n_updates.max(1);
        self
    }

    fn is_trained(&self) -> bool {
        self.classes.iter().all(|c| c.weight > 0.0)
    }

    fn epsilon(&self) -> f64 {
        let max_var = self
            .classes
            .iter()
            .flat_map(|c| c.var.iter().copied())
            .fold(0.0_f64, f64::max);
        (self.var_smoothing * max_var).max(1e-12)
    }

    fn joint_log_likelihood(&self, stats: &ClassStats, total: f64, row: &[f64], eps: f64) -> f64 {
        let prior = (stats.weight / total).ln();
        let likelihood: f64 = row
            .iter()
            .zip(stats.mean.iter().zip(&stats.var))
            .map(|(&x, (&mean, &var))| {
                let var = var + eps;
                -0.5 * ((2.0 * std::f64::consts::PI * var).ln() + (x - mean).powi(2) / var)
            })
            .sum();
        prior + likelihood
    }
}

impl Classifier for GaussianNb {
    fn train(&mut self, features: &[Vec<f64>], targets: &[u8], weights: &[f64]) -> Result<()> {
        check_batch(features, targets, weights, self.classes[0].mean.len())?;
        for ((row, &target), &w) in features.iter().zip(targets).zip(weights) {
            self.classes[usize::from(target.min(1))].update(row, w);
        }
        Ok(())
    }

    fn predict_proba(&self, features: &[Vec<f64>]) -> Vec<f64> {
        if !self.is_trained() {
            return vec![0.0; features.len()];
        }
        let total = self.classes[0].weight + self.classes[1].weight;
        let eps = self.epsilon();
        features
            .iter()
            .map(|row| {
                let jll0 = self.joint_log_likelihood(&self.classes[0], total, row, eps);
                let jll1 = self.joint_log_likelihood(&self.classes[1], total, row, eps);
                sigmoid(jll1 - jll0)
            })
            .collect()
    }

    fn n_iterations(&self) -> usize {
        self.n_updates
    }
}

/// Members trained on the same data whose probabilities are averaged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ensemble<C> {
    /// Ensemble members
    pub members: Vec<C>,
}

impl<C: Classifier> Ensemble<C> {
    /// Wrap a non-empty set of members.
    ///
    /// # Errors
    ///
    /// Returns an error if `members` is empty.
    pub fn new(members: Vec<C>) -> Result<Self> {
        if members.is_empty() {
            return Err(JitError::invalid_config(
                "ensemble_size",
                "an ensemble needs at least one member",
            ));
        }
        Ok(Self { members })
    }
}

impl<C: Classifier> Classifier for Ensemble<C> {
    fn train(&mut self, features: &[Vec<f64>], targets: &[u8], weights: &[f64]) -> Result<()> {
        for member in &mut self.members {
            member.train(features, targets, weights)?;
        }
        Ok(())
    }

    fn predict_proba(&self, features: &[Vec<f64>]) -> Vec<f64> {
        let mut sum = vec![0.0; features.len()];
        for member in &self.members {
            for (s, p) in sum.iter_mut().zip(member.predict_proba(features)) {
                *s += p;
            }
        }
        let n = self.members.len() as f64;
        sum.into_iter().map(|s| s / n).collect()
    }

    fn n_iterations(&self) -> usize {
        self.members.first().map_or(1, Classifier::n_iterations)
    }
}

/// The learners selectable by configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Learner {
    /// Logistic regression
    LogisticSgd(LogisticSgd),
    /// Gaussian naive Bayes
    GaussianNb(GaussianNb),
    /// Averaging ensemble
    Ensemble(Ensemble<Learner>),
}

impl Learner {
    /// Build the learner a configuration describes.
    ///
    /// Ensemble members get consecutive seeds starting at `seed`.
    ///
    /// # Errors
    ///
    /// Returns an error if the ensemble size is zero.
    pub fn from_config(config: &ModelConfig, dim: usize, seed: u64) -> Result<Self> {
        let single = |seed: u64| match config.kind {
            ModelKind::Lr => Self::LogisticSgd(
                LogisticSgd::new(dim, config.learning_rate, seed)
                    .with_l2_reg(config.l2_reg)
                    .with_batch_size(config.batch_size)
                    .with_epochs(config.n_iterations),
            ),
            ModelKind::Nb => Self::GaussianNb(GaussianNb::new(dim).with_updates(config.n_iterations)),
        };
        if config.ensemble_size > 1 {
            let members = (0..config.ensemble_size as u64)
                .map(|i| single(seed.wrapping_add(i)))
                .collect();
            Ok(Self::Ensemble(Ensemble::new(members)?))
        } else if config.ensemble_size == 1 {
            Ok(single(seed))
        } else {
            Err(JitError::invalid_config(
                "ensemble_size",
                "an ensemble needs at least one member",
            ))
        }
    }
}

impl Classifier for Learner {
    fn train(&mut self, features: &[Vec<f64>], targets: &[u8], weights: &[f64]) -> Result<()> {
        match self {
            Self::LogisticSgd(m) => m.train(features, targets, weights),
            Self::GaussianNb(m) => m.train(features, targets, weights),
            Self::Ensemble(m) => m.train(features, targets, weights),
        }
    }

    fn predict_proba(&self, features: &[Vec<f64>]) -> Vec<f64> {
        match self {
            Self::LogisticSgd(m) => m.predict_proba(features),
            Self::GaussianNb(m) => m.predict_proba(features),
            Self::Ensemble(m) => m.predict_proba(features),
        }
    }

    fn n_iterations(&self) -> usize {
        match self {
            Self::LogisticSgd(m) => m.n_iterations(),
            Self::GaussianNb(m) => m.n_iterations(),
            Self::Ensemble(m) => m.n_iterations(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::N_FEATURES;
    use rand::Rng;

    /// Two blobs: clean rows in [0, 1), bug rows in [1, 2).
    fn blobs(n: usize, seed: u64) -> (Vec<Vec<f64>>, Vec<u8>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let half = n / 2;
        let features = (0..n)
            .map(|i| {
                let offset = if i < half { 0.0 } else { 1.0 };
                (0..N_FEATURES).map(|_| offset + rng.gen::<f64>()).collect()
            })
            .collect();
        let targets = (0..n).map(|i| u8::from(i >= half)).collect();
        (features, targets)
    }

    fn fit<C: Classifier>(model: &mut C, features: &[Vec<f64>], targets: &[u8]) {
        let weights = vec![1.0; targets.len()];
        for _ in 0..model.n_iterations() {
            model.train(features, targets, &weights).unwrap();
        }
    }

    fn hits(model: &impl Classifier, features: &[Vec<f64>], targets: &[u8]) -> usize {
        model
            .predict_proba(features)
            .iter()
            .zip(targets)
            .filter(|(&p, &t)| u8::from(p >= 0.5) == t)
            .count()
    }

    #[test]
    fn test_untrained_predicts_zero() {
        let (x, _) = blobs(4, 0);
        assert_eq!(LogisticSgd::new(N_FEATURES, 0.1, 0).predict_proba(&x), vec![0.0; 4]);
        assert_eq!(GaussianNb::new(N_FEATURES).predict_proba(&x), vec![0.0; 4]);
    }

    #[test]
    fn test_logistic_separates_blobs() {
        let (x, y) = blobs(100, 1);
        let mut model = LogisticSgd::new(N_FEATURES, 0.1, 7).with_epochs(100);
        fit(&mut model, &x, &y);
        assert_eq!(hits(&model, &x, &y), 100);
    }

    #[test]
    fn test_naive_bayes_separates_blobs() {
        let (x, y) = blobs(100, 2);
        let mut model = GaussianNb::new(N_FEATURES);
        fit(&mut model, &x, &y);
        assert_eq!(hits(&model, &x, &y), 100);
    }

    #[test]
    fn test_naive_bayes_single_class_untrained() {
        let (x, _) = blobs(4, 3);
        let mut model = GaussianNb::new(N_FEATURES);
        model.train(&x, &[0, 0, 0, 0], &[1.0; 4]).unwrap();
        assert_eq!(model.predict_proba(&x), vec![0.0; 4]);
    }

    #[test]
    fn test_zero_weight_rows_ignored_by_naive_bayes() {
        let (x, y) = blobs(10, 4);
        let mut weighted = GaussianNb::new(N_FEATURES);
        let mut weights = vec![1.0; 10];
        weights[0] = 0.0;
        weighted.train(&x, &y, &weights).unwrap();

        let mut plain = GaussianNb::new(N_FEATURES);
        plain.train(&x[1..], &y[1..], &weights[1..]).unwrap();
        let a = weighted.predict_proba(&x);
        let b = plain.predict_proba(&x);
        assert!(a.iter().zip(&b).all(|(p, q)| (p - q).abs() < 1e-9));
    }

    #[test]
    fn test_logistic_deterministic_for_seed() {
        let (x, y) = blobs(40, 5);
        let mut a = LogisticSgd::new(N_FEATURES, 0.05, 11).with_batch_size(4);
        let mut b = LogisticSgd::new(N_FEATURES, 0.05, 11).with_batch_size(4);
        fit(&mut a, &x, &y);
        fit(&mut b, &x, &y);
        assert_eq!(a, b);
    }

    #[test]
    fn test_batch_length_mismatch_rejected() {
        let (x, y) = blobs(4, 6);
        let mut model = LogisticSgd::new(N_FEATURES, 0.1, 0);
        assert!(model.train(&x, &y[..3], &[1.0; 4]).is_err());
        let mut nb = GaussianNb::new(3);
        assert!(matches!(
            nb.train(&x, &y, &[1.0; 4]),
            Err(JitError::DimensionMismatch { expected: 3, .. })
        ));
    }

    #[test]
    fn test_ensemble_averages_members() {
        let (x, y) = blobs(60, 8);
        let config = ModelConfig {
            kind: ModelKind::Lr,
            ensemble_size: 3,
            n_iterations: 20,
            ..ModelConfig::default()
        };
        let mut ensemble = Learner::from_config(&config, N_FEATURES, 42).unwrap();
        fit(&mut ensemble, &x, &y);
        let Learner::Ensemble(inner) = &ensemble else {
            panic!("expected ensemble");
        };
        assert_eq!(inner.members.len(), 3);

        let averaged = ensemble.predict_proba(&x[..1])[0];
        let manual: f64 = inner
            .members
            .iter()
            .map(|m| m.predict_proba(&x[..1])[0])
            .sum::<f64>()
            / 3.0;
        assert!((averaged - manual).abs() < 1e-12);
    }

    #[test]
    fn test_zero_ensemble_rejected() {
        let config = ModelConfig {
            ensemble_size: 0,
            ..ModelConfig::default()
        };
        assert!(Learner::from_config(&config, N_FEATURES, 0).is_err());
    }

    #[test]
    fn test_running_scaler_standardizes() {
        let mut scaler = RunningScaler::new(1);
        for x in [1.0, 2.0, 3.0] {
            scaler.update(&[x]);
        }
        let z = scaler.transform(&[2.0]);
        assert!(z[0].abs() < 1e-12);
        let z = scaler.transform(&[3.0]);
        // population std of 1,2,3 is sqrt(2/3)
        assert!((z[0] - 1.0 / (2.0_f64 / 3.0).sqrt()).abs() < 1e-12);
    }
}
