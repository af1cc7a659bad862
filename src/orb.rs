//! Oversampling Rate Boosting.
//!
//! ORB wraps an incremental classifier and keeps the share of bug
//! predictions close to a target rate `th`. It tracks the moving average
//! `ma` of the classifier's binary predictions over a window of recent
//! instances. When `ma` drifts above `th` the clean class is boosted, and
//! below it the bug class is boosted. The boost grows along an
//! exponential curve shaped by `m`, scaled by `l0` and `l1`.

use crate::error::{JitError, Result};
use crate::model::Classifier;
use crate::sampling::{class_fading_weights, resample};
use crate::threshold::{Threshold, ThresholdContext};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// How boosting factors reach the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Reweighting {
    /// Train on a weighted bootstrap of the batch
    #[default]
    Resample,
    /// Pass the weights to the classifier
    Weighted,
}

/// Tuning of the boosting loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrbParams {
    /// Target rate of bug predictions
    pub th: f64,
    /// Scale of the clean-class boost
    pub l0: f64,
    /// Scale of the bug-class boost
    pub l1: f64,
    /// Base of the boost curve
    pub m: f64,
    /// Per-step age decay of sample weights
    pub decay_factor: f64,
    /// Instances the moving average is computed over
    pub ma_window_size: usize,
    /// Feed the window with scored instances once past the grace period
    pub rate_driven: bool,
    /// Training instances before the window switches to scored instances
    pub grace_period: usize,
    /// Decision strategy
    pub threshold: Threshold,
    /// Reweighting mode
    pub reweighting: Reweighting,
}

impl Default for OrbParams {
    fn default() -> Self {
        Self {
            th: 0.4,
            l0: 10.0,
            l1: 12.0,
            m: 1.5,
            decay_factor: 0.99,
            ma_window_size: 100,
            rate_driven: false,
            grace_period: 300,
            threshold: Threshold::default(),
            reweighting: Reweighting::default(),
        }
    }
}

/// Boosting factors `(obf0, obf1)` for the clean and bug class.
///
/// Both are 1 when `ma == th`, and whenever the curve is degenerate:
/// `m == th`, `m == 1`, `m^th == 1`, or a non-finite denominator.
#[must_use]
pub fn bias_factors(ma: f64, th: f64, m: f64, l0: f64, l1: f64) -> (f64, f64) {
    let neutral = (1.0, 1.0);
    if m == th || m == 1.0 {
        return neutral;
    }
    let m_th = m.powf(th);
    if m_th == 1.0 {
        return neutral;
    }
    let (obf0, obf1) = if ma > th {
        let denominator = m - m_th;
        if denominator == 0.0 || !denominator.is_finite() {
            return neutral;
        }
        (((m.powf(ma) - m_th) * l0) / denominator + 1.0, 1.0)
    } else if ma < th {
        let denominator = m_th - 1.0;
        if denominator == 0.0 || !denominator.is_finite() {
            return neutral;
        }
        (1.0, ((m.powf(th - ma) - 1.0) * l1) / denominator + 1.0)
    } else {
        return neutral;
    };
    if obf0.is_finite() && obf1.is_finite() {
        (obf0, obf1)
    } else {
        neutral
    }
}

/// Probabilities and decisions for a scored batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Scored {
    /// Bug probability per row
    pub probabilities: Vec<f64>,
    /// Binary prediction per row
    pub predictions: Vec<u8>,
}

/// A classifier under rate boosting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Orb<C> {
    classifier: C,
    params: OrbParams,
    ma: f64,
    train_window: VecDeque<(Vec<f64>, u8)>,
    scored_window: VecDeque<Vec<f64>>,
    trained_instances: usize,
    seed: u64,
    train_calls: u64,
}

impl<C: Classifier> Orb<C> {
    /// Wrap `classifier`. The moving average starts at `th`.
    #[must_use]
    pub fn new(classifier: C, params: OrbParams, seed: u64) -> Self {
        Self {
            classifier,
            ma: params.th.clamp(0.0, 1.0),
            params,
            train_window: VecDeque::new(),
            scored_window: VecDeque::new(),
            trained_instances: 0,
            seed,
            train_calls: 0,
        }
    }

    /// Current moving average of bug predictions.
    #[must_use]
    pub fn ma(&self) -> f64 {
        self.ma
    }

    /// Boosting factors for the current moving average.
    #[must_use]
    pub fn current_factors(&self) -> (f64, f64) {
        let p = &self.params;
        bias_factors(self.ma, p.th, p.m, p.l0, p.l1)
    }

    /// Training instances consumed so far.
    #[must_use]
    pub fn trained_instances(&self) -> usize {
        self.trained_instances
    }

    /// The wrapped classifier.
    #[must_use]
    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    fn past_grace(&self) -> bool {
        self.params.rate_driven && self.trained_instances >= self.params.grace_period
    }

    fn remember_training(&mut self, features: &[Vec<f64>], targets: &[u8]) {
        for (row, &target) in features.iter().zip(targets) {
            self.train_window.push_back((row.clone(), target));
        }
        while self.train_window.len() > self.params.ma_window_size {
            self.train_window.pop_front();
        }
    }

    fn moving_average(&self) -> Option<f64> {
        let window: Vec<Vec<f64>> = if self.past_grace() && !self.scored_window.is_empty() {
            self.scored_window.iter().cloned().collect()
        } else {
            self.train_window.iter().map(|(row, _)| row.clone()).collect()
        };
        if window.is_empty() {
            return None;
        }
        let probabilities = self.classifier.predict_proba(&window);
        let predictions = self
            .params
            .threshold
            .decide(&probabilities, &ThresholdContext::default());
        let positives: f64 = predictions.iter().map(|&p| f64::from(p)).sum();
        Some((positives / predictions.len() as f64).clamp(0.0, 1.0))
    }

    /// Train on one batch with `n_iterations` boosted passes.
    ///
    /// A batch holding fewer than two classes is skipped and leaves the
    /// state untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if `features` and `targets` differ in length, or if
    /// the classifier rejects the batch.
    pub fn train(&mut self, features: &[Vec<f64>], targets: &[u8]) -> Result<()> {
        if features.len() != targets.len() {
            return Err(JitError::invalid_data(format!(
                "{} feature rows for {} targets",
                features.len(),
                targets.len()
            )));
        }
        let has_clean = targets.iter().any(|&t| t == 0);
        let has_bug = targets.iter().any(|&t| t == 1);
        if !(has_clean && has_bug) {
            tracing::warn!(
                batch = targets.len(),
                "expected two classes to train, skipping batch"
            );
            return Ok(());
        }

        self.remember_training(features, targets);
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(self.train_calls));
        self.train_calls += 1;

        for _ in 0..self.classifier.n_iterations() {
            let (obf0, obf1) = self.current_factors();
            let weights = class_fading_weights(targets, [obf0, obf1], self.params.decay_factor);
            match self.params.reweighting {
                Reweighting::Resample => {
                    let drawn = resample(&weights, targets.len(), &mut rng)?;
                    let x: Vec<Vec<f64>> = drawn.iter().map(|&i| features[i].clone()).collect();
                    let y: Vec<u8> = drawn.iter().map(|&i| targets[i]).collect();
                    self.classifier.train(&x, &y, &vec![1.0; y.len()])?;
                }
                Reweighting::Weighted => self.classifier.train(features, targets, &weights)?,
            }
            if let Some(ma) = self.moving_average() {
                self.ma = ma;
            }
        }

        self.trained_instances += targets.len();
        tracing::debug!(
            ma = self.ma,
            trained = self.trained_instances,
            "orb training step"
        );
        Ok(())
    }

    /// Score a batch of arriving commits.
    ///
    /// Rate-driven models past their grace period remember the scored
    /// instances for the moving average.
    pub fn predict(&mut self, features: &[Vec<f64>]) -> Scored {
        let probabilities = self.classifier.predict_proba(features);
        let context = self.threshold_context();
        let predictions = self.params.threshold.decide(&probabilities, &context);

        if self.past_grace() {
            self.scored_window.extend(features.iter().cloned());
            while self.scored_window.len() > self.params.ma_window_size {
                self.scored_window.pop_front();
            }
        }
        Scored {
            probabilities,
            predictions,
        }
    }

    fn threshold_context(&self) -> ThresholdContext {
        if !self.params.threshold.needs_context() || self.train_window.is_empty() {
            return ThresholdContext::default();
        }
        let (rows, targets): (Vec<Vec<f64>>, Vec<u8>) = self.train_window.iter().cloned().unzip();
        ThresholdContext {
            validation: Some(self.classifier.predict_proba(&rows)),
            train_targets: Some(targets),
        }
    }
}
