//! # Experiment configuration
//!
//! One run is fully described by an [`ExperimentConfig`]. Configs load from
//! TOML with every field optional; missing fields take the defaults below.
//! [`ExperimentConfig::validate`] rejects out-of-range values before any
//! data is touched.

use crate::data::Dataset;
use crate::error::{JitError, Result};
use crate::metrics::DEFAULT_FADING_FACTOR;
use crate::orb::{OrbParams, Reweighting};
use crate::threshold::Threshold;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Base learner family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Logistic regression trained by SGD
    #[default]
    Lr,
    /// Gaussian naive Bayes
    Nb,
}

/// Base learner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub kind: ModelKind,
    /// Passes per training call
    pub n_iterations: usize,
    /// Members averaged together; 1 means a single learner
    pub ensemble_size: usize,
    pub learning_rate: f64,
    pub batch_size: usize,
    pub l2_reg: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            kind: ModelKind::Lr,
            n_iterations: 10,
            ensemble_size: 1,
            learning_rate: 0.1,
            batch_size: 512,
            l2_reg: 0.01,
        }
    }
}

/// Everything needed to reproduce a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Project stream to evaluate
    pub dataset: Dataset,
    /// First commit kept in the results
    pub start: usize,
    /// Commits loaded from the stream; `None` means all
    pub end: Option<usize>,
    /// Days before an unfixed commit is labeled clean
    pub waiting_time: u32,
    pub ma_window_size: usize,
    pub th: f64,
    pub l0: f64,
    pub l1: f64,
    pub m: f64,
    pub decay_factor: f64,
    /// Clean confirmations that turn a later bug label into noise
    pub noise_n: usize,
    /// Keep noisy bug labels
    pub noise: bool,
    /// Keep the raw event order instead of balancing
    pub order: bool,
    /// Train on the other projects as well
    pub cross_project: bool,
    pub rate_driven: bool,
    pub rd_grace_period: usize,
    pub model: ModelConfig,
    pub threshold: Threshold,
    pub reweighting: Reweighting,
    pub seed: u64,
    /// Fading factor of the evaluation metrics
    pub fading_factor: f64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            dataset: Dataset::Brackets,
            start: 0,
            end: Some(5000),
            waiting_time: 90,
            ma_window_size: 100,
            th: 0.4,
            l0: 10.0,
            l1: 12.0,
            m: 1.5,
            decay_factor: 0.99,
            noise_n: 3,
            noise: false,
            order: false,
            cross_project: false,
            rate_driven: false,
            rd_grace_period: 300,
            model: ModelConfig::default(),
            threshold: Threshold::default(),
            reweighting: Reweighting::default(),
            seed: 0,
            fading_factor: DEFAULT_FADING_FACTOR,
        }
    }
}

fn check(ok: bool, field: &str, reason: &str) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(JitError::invalid_config(field, reason))
    }
}

impl ExperimentConfig {
    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid TOML for this schema.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Select the dataset.
    #[must_use]
    pub fn with_dataset(mut self, dataset: Dataset) -> Self {
        self.dataset = dataset;
        self
    }

    /// Select the evaluated commit range.
    #[must_use]
    pub fn with_range(mut self, start: usize, end: Option<usize>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// Set the seed of every random draw.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the verification waiting time in days.
    #[must_use]
    pub fn with_waiting_time(mut self, days: u32) -> Self {
        self.waiting_time = days;
        self
    }

    /// Replace the base learner settings.
    #[must_use]
    pub fn with_model(mut self, model: ModelConfig) -> Self {
        self.model = model;
        self
    }

    /// Replace the decision strategy.
    #[must_use]
    pub fn with_threshold(mut self, threshold: Threshold) -> Self {
        self.threshold = threshold;
        self
    }

    /// Toggle rate-driven ORB.
    #[must_use]
    pub fn with_rate_driven(mut self, rate_driven: bool) -> Self {
        self.rate_driven = rate_driven;
        self
    }

    /// Toggle cross-project training data.
    #[must_use]
    pub fn with_cross_project(mut self, cross_project: bool) -> Self {
        self.cross_project = cross_project;
        self
    }

    /// ORB settings carried by this config.
    #[must_use]
    pub fn orb_params(&self) -> OrbParams {
        OrbParams {
            th: self.th,
            l0: self.l0,
            l1: self.l1,
            m: self.m,
            decay_factor: self.decay_factor,
            ma_window_size: self.ma_window_size,
            rate_driven: self.rate_driven,
            grace_period: self.rd_grace_period,
            threshold: self.threshold,
            reweighting: self.reweighting,
        }
    }

    /// Reject values outside their accepted ranges.
    ///
    /// # Errors
    ///
    /// Returns [`JitError::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        check(self.th > 0.0 && self.th < 1.0, "th", "must lie in (0, 1)")?;
        check(self.m > 0.0 && self.m.is_finite(), "m", "must be positive")?;
        check(self.l0 >= 0.0 && self.l0.is_finite(), "l0", "must be non-negative")?;
        check(self.l1 >= 0.0 && self.l1.is_finite(), "l1", "must be non-negative")?;
        check(
            self.decay_factor > 0.0 && self.decay_factor <= 1.0,
            "decay_factor",
            "must lie in (0, 1]",
        )?;
        check(
            self.fading_factor > 0.0 && self.fading_factor <= 1.0,
            "fading_factor",
            "must lie in (0, 1]",
        )?;
        check(self.ma_window_size > 0, "ma_window_size", "must be positive")?;
        check(
            i64::try_from(self.seed).is_ok(),
            "seed",
            "must fit in a signed 64-bit integer",
        )?;
        if let Some(end) = self.end {
            check(self.start <= end, "start", "must not exceed end")?;
        }

        let model = &self.model;
        check(model.n_iterations > 0, "model.n_iterations", "must be positive")?;
        check(model.ensemble_size > 0, "model.ensemble_size", "must be positive")?;
        check(model.batch_size > 0, "model.batch_size", "must be positive")?;
        check(
            model.learning_rate > 0.0 && model.learning_rate.is_finite(),
            "model.learning_rate",
            "must be positive",
        )?;
        check(
            model.l2_reg >= 0.0 && model.l2_reg.is_finite(),
            "model.l2_reg",
            "must be non-negative",
        )?;

        match self.threshold {
            Threshold::ScoreFixed { score } => {
                check((0.0..=1.0).contains(&score), "threshold.score", "must lie in [0, 1]")
            }
            Threshold::RateFixed { normal_proportion } => check(
                (0.0..=1.0).contains(&normal_proportion),
                "threshold.normal_proportion",
                "must lie in [0, 1]",
            ),
            Threshold::RateFixedTrain => Ok(()),
        }
    }
}
