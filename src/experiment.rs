//! Experiment driver.
//!
//! [`run_experiment`] replays one project stream end to end: it derives
//! the labeling events, cleans and balances them, interleaves training
//! with scoring in timestamp order, and evaluates the scored commits
//! prequentially.
//!
//! Every run owns a [`RunContext`] holding its deterministic RNG, a stable
//! run id derived from the configuration, and the run-level metrics.

use crate::balance::balance_events;
use crate::config::ExperimentConfig;
use crate::data::{Commit, Dataset, DatasetLoader, Event, PredictionRecord, N_FEATURES};
use crate::error::{JitError, Result};
use crate::events::extract_events;
use crate::metrics::{prequential_metrics, MetricRow, Summary};
use crate::model::Learner;
use crate::noise::remove_noise;
use crate::orb::Orb;
use crate::schedule::{Schedule, Step};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// A value recorded while running.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    /// Count (e.g., events dropped)
    Int(i64),
    /// Ratio or score
    Float(f64),
    /// Wall time
    Duration(Duration),
}

/// Per-run state: seeded randomness, identity, timing and metrics.
///
/// # Example
///
/// ```
/// use jitsdp::config::ExperimentConfig;
/// use jitsdp::experiment::RunContext;
///
/// fn main() -> jitsdp::Result<()> {
///     let config = ExperimentConfig::default().with_seed(3);
///     let mut ctx = RunContext::new(&config)?;
///     let _model_seed = ctx.next_seed();
///     ctx.record_metric("train_events", 42);
///     assert_eq!(ctx.run_id(), RunContext::new(&config)?.run_id());
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct RunContext {
    run_id: String,
    rng: StdRng,
    start_time: Instant,
    metrics: BTreeMap<String, MetricValue>,
}

impl RunContext {
    /// Create the context for a configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized.
    pub fn new(config: &ExperimentConfig) -> Result<Self> {
        Ok(Self {
            run_id: run_id(config)?,
            rng: StdRng::seed_from_u64(config.seed),
            start_time: Instant::now(),
            metrics: BTreeMap::new(),
        })
    }

    /// Stable identifier of the configuration.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Draw a sub-seed for a component.
    pub fn next_seed(&mut self) -> u64 {
        self.rng.gen()
    }

    /// Time since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Record an integer metric.
    pub fn record_metric(&mut self, name: &str, value: i64) {
        self.metrics.insert(name.to_string(), MetricValue::Int(value));
    }

    /// Record a float metric.
    pub fn record_float_metric(&mut self, name: &str, value: f64) {
        self.metrics
            .insert(name.to_string(), MetricValue::Float(value));
    }

    /// Record a duration metric.
    pub fn record_duration(&mut self, name: &str, duration: Duration) {
        self.metrics
            .insert(name.to_string(), MetricValue::Duration(duration));
    }

    /// Get a recorded metric.
    #[must_use]
    pub fn get_metric(&self, name: &str) -> Option<&MetricValue> {
        self.metrics.get(name)
    }

    /// Log every recorded metric.
    pub fn report(&self) {
        for (name, value) in &self.metrics {
            match value {
                MetricValue::Int(v) => tracing::info!(run = %self.run_id, "{name}: {v}"),
                MetricValue::Float(v) => tracing::info!(run = %self.run_id, "{name}: {v:.4}"),
                MetricValue::Duration(d) => tracing::info!(
                    run = %self.run_id,
                    "{name}: {:.2}ms",
                    d.as_secs_f64() * 1000.0
                ),
            }
        }
    }
}

/// Hex digest identifying a configuration.
///
/// Uses BLAKE3 over the JSON form of the config, so equal configs share a
/// directory and any changed field gets a new one.
///
/// # Errors
///
/// Returns an error if the configuration cannot be serialized.
pub fn run_id(config: &ExperimentConfig) -> Result<String> {
    let canonical = serde_json::to_vec(config)?;
    let hash = blake3::hash(&canonical);
    Ok(hash.to_hex()[..16].to_string())
}

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Stable identifier of the configuration
    pub run_id: String,
    /// Scored commits `start..end`, renumbered from 0
    pub records: Vec<PredictionRecord>,
    /// Running metrics per record
    pub rows: Vec<MetricRow>,
    /// Time-averaged metrics
    pub summary: Summary,
    /// Model state after the last step
    pub model: Orb<Learner>,
}

/// Add the other projects' commits that arrive no later than the last
/// commit of `commits`.
///
/// # Errors
///
/// Returns an error if any other dataset fails to load.
pub fn merge_others(
    mut commits: Vec<Commit>,
    dataset: Dataset,
    loader: &dyn DatasetLoader,
) -> Result<Vec<Commit>> {
    let Some(last) = commits.iter().map(|c| c.timestamp).max() else {
        return Ok(commits);
    };
    for other in dataset.others() {
        let before = commits.len();
        commits.extend(
            loader
                .load(other)?
                .into_iter()
                .filter(|c| c.timestamp <= last),
        );
        tracing::debug!(dataset = %other, merged = commits.len() - before, "cross-project commits");
    }
    Ok(commits)
}

/// Training events for a commit stream, as configured.
///
/// # Errors
///
/// Returns an error if a bug commit carries no fix timestamp.
pub fn training_events(commits: &[Commit], config: &ExperimentConfig) -> Result<Vec<Event>> {
    let mut events = extract_events(commits, config.waiting_time)?;
    if !config.noise {
        events = remove_noise(events, config.noise_n);
    }
    if !config.order {
        events = balance_events(events);
    }
    Ok(events)
}

fn take<'a, T>(items: &'a [T], cursor: &mut usize, n: usize, what: &str) -> Result<&'a [T]> {
    let batch = items.get(*cursor..*cursor + n).ok_or_else(|| {
        JitError::invalid_data(format!(
            "{what} stream exhausted at {} of {}",
            *cursor,
            items.len()
        ))
    })?;
    *cursor += n;
    Ok(batch)
}

/// Run one experiment.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, a dataset cannot be
/// loaded, or the data violates a stream invariant.
pub fn run_experiment(config: &ExperimentConfig, loader: &dyn DatasetLoader) -> Result<RunOutcome> {
    config.validate()?;
    let mut ctx = RunContext::new(config)?;
    tracing::info!(run = %ctx.run_id(), dataset = %config.dataset, "run started");

    let commits = loader.load(config.dataset)?;
    let end = config.end.map_or(commits.len(), |end| end.min(commits.len()));
    let test = &commits[..end];
    let mut train_commits = test.to_vec();
    if config.cross_project {
        train_commits = merge_others(train_commits, config.dataset, loader)?;
    }
    let events = training_events(&train_commits, config)?;
    ctx.record_metric("test_commits", test.len() as i64);
    ctx.record_metric("train_events", events.len() as i64);

    let test_timestamps: Vec<i64> = test.iter().map(|c| c.timestamp).collect();
    let train_timestamps: Vec<i64> = events.iter().map(|e| e.timestamp_event).collect();
    let schedule = Schedule::new(&test_timestamps, &train_timestamps);

    let learner = Learner::from_config(&config.model, N_FEATURES, ctx.next_seed())?;
    let mut model = Orb::new(learner, config.orb_params(), ctx.next_seed());

    let mut records = Vec::with_capacity(end);
    let (mut next_test, mut next_train) = (0, 0);
    for step in schedule.steps() {
        match step {
            Step::Train(n) => {
                let batch = take(&events, &mut next_train, n, "train")?;
                let features: Vec<Vec<f64>> = batch.iter().map(|e| e.features.clone()).collect();
                let targets: Vec<u8> = batch.iter().map(|e| e.target).collect();
                model.train(&features, &targets)?;
            }
            Step::Test(n) => {
                let first = next_test;
                let batch = take(test, &mut next_test, n, "test")?;
                let features: Vec<Vec<f64>> = batch.iter().map(|c| c.features.clone()).collect();
                let scored = model.predict(&features);
                records.extend(batch.iter().enumerate().map(|(i, commit)| PredictionRecord {
                    timestep: first + i,
                    target: commit.target,
                    prediction: scored.predictions.get(i).copied(),
                    probability: scored.probabilities.get(i).copied().unwrap_or(0.0),
                }));
            }
        }
        tracing::trace!(?step, ma = model.ma(), "step done");
    }

    let records: Vec<PredictionRecord> = records
        .into_iter()
        .skip(config.start)
        .enumerate()
        .map(|(timestep, record)| PredictionRecord { timestep, ..record })
        .collect();
    let rows = prequential_metrics(&records, config.fading_factor, config.th);
    let summary = Summary::from_rows(&rows);

    ctx.record_metric("records", records.len() as i64);
    ctx.record_metric("trained_instances", model.trained_instances() as i64);
    ctx.record_float_metric("gmean", summary.gmean);
    ctx.record_float_metric("ma", model.ma());
    ctx.record_duration("elapsed", ctx.elapsed());
    ctx.report();
    tracing::info!(run = %ctx.run_id(), gmean = summary.gmean, "run finished");

    Ok(RunOutcome {
        run_id: ctx.run_id().to_string(),
        records,
        rows,
        summary,
        model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SyntheticLoader;

    struct FixedLoader(Vec<Commit>);

    impl DatasetLoader for FixedLoader {
        fn load(&self, dataset: Dataset) -> Result<Vec<Commit>> {
            if dataset == Dataset::Brackets {
                Ok(self.0.clone())
            } else {
                Ok(vec![
                    Commit::clean(99, 5, vec![0.5; N_FEATURES]),
                    Commit::clean(100, 500, vec![0.5; N_FEATURES]),
                ])
            }
        }
    }

    fn config() -> ExperimentConfig {
        ExperimentConfig::default().with_range(0, Some(300)).with_seed(1)
    }

    #[test]
    fn test_run_id_stable_and_sensitive() {
        let a = run_id(&config()).unwrap();
        assert_eq!(a, run_id(&config()).unwrap());
        assert_ne!(a, run_id(&config().with_seed(2)).unwrap());
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_context_seeds_deterministic() {
        let mut a = RunContext::new(&config()).unwrap();
        let mut b = RunContext::new(&config()).unwrap();
        assert_eq!(a.next_seed(), b.next_seed());
        assert_eq!(a.next_seed(), b.next_seed());
    }

    #[test]
    fn test_context_metrics() {
        let mut ctx = RunContext::new(&config()).unwrap();
        ctx.record_metric("events", 12);
        ctx.record_float_metric("gmean", 0.5);
        assert_eq!(ctx.get_metric("events"), Some(&MetricValue::Int(12)));
        assert_eq!(ctx.get_metric("gmean"), Some(&MetricValue::Float(0.5)));
        assert!(ctx.get_metric("missing").is_none());
    }

    #[test]
    fn test_merge_others_respects_last_timestamp() {
        let own = vec![Commit::clean(1, 10, vec![0.1; N_FEATURES])];
        let merged = merge_others(own, Dataset::Brackets, &FixedLoader(Vec::new())).unwrap();
        // each of the 9 others contributes its commit at 5, not the one at 500
        assert_eq!(merged.len(), 10);
        assert!(merged.iter().all(|c| c.timestamp <= 10));
    }

    #[test]
    fn test_merge_others_empty_stream() {
        let merged = merge_others(Vec::new(), Dataset::Brackets, &FixedLoader(Vec::new())).unwrap();
        assert!(merged.is_empty());
    }

    #[test]
    fn test_training_events_balanced_by_default() {
        let commits = SyntheticLoader::new(200, 5).generate(Dataset::Brackets);
        let events = training_events(&commits, &config()).unwrap();
        let bugs = events.iter().filter(|e| e.target == 1).count();
        let cleans = events.len() - bugs;
        assert!(bugs <= cleans);
        assert!(events
            .windows(2)
            .all(|w| w[0].timestamp_event <= w[1].timestamp_event));
    }

    #[test]
    fn test_run_scores_every_commit_in_range() {
        let loader = SyntheticLoader::new(400, 2);
        let config = config().with_range(50, Some(300));
        let outcome = run_experiment(&config, &loader).unwrap();
        assert_eq!(outcome.records.len(), 250);
        assert_eq!(outcome.rows.len(), 250);
        assert!(outcome
            .records
            .iter()
            .enumerate()
            .all(|(i, r)| r.timestep == i));
    }

    #[test]
    fn test_run_rejects_invalid_config() {
        let loader = SyntheticLoader::new(10, 0);
        let config = ExperimentConfig {
            th: 2.0,
            ..ExperimentConfig::default()
        };
        assert!(matches!(
            run_experiment(&config, &loader),
            Err(JitError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_run_on_empty_stream() {
        let outcome = run_experiment(&config(), &FixedLoader(Vec::new())).unwrap();
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.summary, Summary::default());
    }
}
