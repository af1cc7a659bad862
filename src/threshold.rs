//! Probability-to-decision strategies.
//!
//! A strategy turns bug probabilities into binary predictions. The rate
//! strategies adapt the cut-off so that a target share of commits is
//! predicted clean, using recent probabilities as reference.

use serde::{Deserialize, Serialize};

/// Cut-off used when no reference probabilities are available.
pub const DEFAULT_SCORE: f64 = 0.5;

/// Reference data a strategy may consult.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdContext {
    /// Probabilities of a reference set, oldest first
    pub validation: Option<Vec<f64>>,
    /// Targets of recent training data
    pub train_targets: Option<Vec<u8>>,
}

/// How to derive binary predictions from probabilities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum Threshold {
    /// Predict a bug when the probability reaches `score`.
    ScoreFixed {
        #[serde(default = "default_score")]
        score: f64,
    },
    /// Keep the share of clean predictions near `normal_proportion`.
    RateFixed { normal_proportion: f64 },
    /// Like [`Threshold::RateFixed`], with the proportion tuned from the
    /// training targets.
    RateFixedTrain,
}

fn default_score() -> f64 {
    DEFAULT_SCORE
}

impl Default for Threshold {
    fn default() -> Self {
        Self::ScoreFixed {
            score: DEFAULT_SCORE,
        }
    }
}

impl Threshold {
    /// Whether [`Threshold::decide`] reads a [`ThresholdContext`].
    #[must_use]
    pub fn needs_context(&self) -> bool {
        !matches!(self, Self::ScoreFixed { .. })
    }

    /// Binary predictions for `probabilities`.
    #[must_use]
    pub fn decide(&self, probabilities: &[f64], context: &ThresholdContext) -> Vec<u8> {
        let cutoffs = match *self {
            Self::ScoreFixed { score } => vec![score; probabilities.len()],
            Self::RateFixed { normal_proportion } => {
                tune_threshold(context.validation.as_deref(), probabilities, normal_proportion)
            }
            Self::RateFixedTrain => {
                let proportion = context
                    .train_targets
                    .as_deref()
                    .filter(|t| !t.is_empty())
                    .map_or(0.5, |targets| {
                        let bug_rate = targets.iter().map(|&t| f64::from(t)).sum::<f64>()
                            / targets.len() as f64;
                        ((1.0 - bug_rate) + 0.5) / 2.0
                    });
                tune_threshold(context.validation.as_deref(), probabilities, proportion)
            }
        };
        probabilities
            .iter()
            .zip(cutoffs)
            .map(|(&p, cutoff)| u8::from(p >= cutoff))
            .collect()
    }
}

/// Per-row cut-offs: a rolling `quantile` over a window as long as the
/// reference set, sliding from the reference set into the test
/// probabilities already seen.
#[must_use]
pub fn tune_threshold(validation: Option<&[f64]>, test: &[f64], quantile: f64) -> Vec<f64> {
    let Some(validation) = validation.filter(|v| !v.is_empty()) else {
        return vec![DEFAULT_SCORE; test.len()];
    };
    let window = validation.len();
    let history: Vec<f64> = validation
        .iter()
        .chain(test.iter().take(test.len().saturating_sub(1)))
        .copied()
        .collect();
    (0..test.len())
        .map(|i| interpolated_quantile(&history[i..i + window], quantile))
        .collect()
}

/// Quantile with linear interpolation between the closest ranks.
#[must_use]
pub fn interpolated_quantile(values: &[f64], quantile: f64) -> f64 {
    if values.is_empty() {
        return DEFAULT_SCORE;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let position = quantile.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}
