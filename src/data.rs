//! Commit stream data model and dataset loading.
//!
//! A [`Commit`] is the arrival-ordered unit the model is asked to score.
//! An [`Event`] is the moment a label for a commit becomes available to
//! training. Both carry the same fixed-size feature vector described by
//! [`FEATURES`].

use crate::error::{JitError, Result};
use flate2::read::GzDecoder;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

/// Change metrics describing a commit, in feature-vector order.
pub const FEATURES: [&str; 14] = [
    "fix", "ns", "nd", "nf", "entropy", "la", "ld", "lt", "ndev", "age", "nuc", "exp", "rexp",
    "sexp",
];

/// Number of features per commit.
pub const N_FEATURES: usize = FEATURES.len();

/// Seconds in one day.
pub const SECONDS_BY_DAY: i64 = 24 * 60 * 60;

/// A commit as it arrives on the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    /// Position-independent commit identifier
    pub id: u64,
    /// Arrival time, seconds since epoch
    pub timestamp: i64,
    /// Change metrics, see [`FEATURES`]
    pub features: Vec<f64>,
    /// Ground truth: 1 if the commit induced a bug
    pub target: u8,
    /// Time the induced bug was fixed (bug commits only)
    #[serde(default)]
    pub timestamp_fix: Option<i64>,
}

impl Commit {
    /// Create a clean commit.
    #[must_use]
    pub fn clean(id: u64, timestamp: i64, features: Vec<f64>) -> Self {
        Self {
            id,
            timestamp,
            features,
            target: 0,
            timestamp_fix: None,
        }
    }

    /// Create a bug-inducing commit fixed at `timestamp_fix`.
    #[must_use]
    pub fn bug(id: u64, timestamp: i64, features: Vec<f64>, timestamp_fix: i64) -> Self {
        Self {
            id,
            timestamp,
            features,
            target: 1,
            timestamp_fix: Some(timestamp_fix),
        }
    }

    /// Whether the commit induced a bug.
    #[must_use]
    pub fn is_bug(&self) -> bool {
        self.target == 1
    }
}

/// A label becoming known to the training process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// When the label becomes available
    pub timestamp_event: i64,
    /// Arrival time of the source commit
    pub timestamp: i64,
    /// Change metrics of the source commit
    pub features: Vec<f64>,
    /// Label attributable at `timestamp_event`
    pub target: u8,
    /// Identifier of the commit this event was derived from
    pub source_commit: u64,
}

impl Event {
    /// Derive an event from a commit with the given label and availability time.
    #[must_use]
    pub fn from_commit(commit: &Commit, target: u8, timestamp_event: i64) -> Self {
        Self {
            timestamp_event,
            timestamp: commit.timestamp,
            features: commit.features.clone(),
            target,
            source_commit: commit.id,
        }
    }
}

/// One scored commit in the output stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    /// Position in the evaluated stream
    pub timestep: usize,
    /// Ground truth, filled in from the commit
    pub target: u8,
    /// Binary decision; `None` counts as a miss
    pub prediction: Option<u8>,
    /// Estimated probability of being bug-inducing
    pub probability: f64,
}

/// Hashable identity of a feature vector.
///
/// Commits sharing a feature tuple are treated as the same entity.
/// Negative zero is folded onto zero so the key follows numeric equality.
#[must_use]
pub fn feature_key(features: &[f64]) -> Vec<u64> {
    features.iter().map(|&x| (x + 0.0).to_bits()).collect()
}

/// Project streams available to experiments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dataset {
    Brackets,
    Camel,
    Fabric8,
    Jgroups,
    Neutron,
    Tomcat,
    Broadleaf,
    Nova,
    Npm,
    SpringIntegration,
}

impl Dataset {
    /// Every dataset in catalogue order.
    pub const ALL: [Dataset; 10] = [
        Self::Brackets,
        Self::Camel,
        Self::Fabric8,
        Self::Jgroups,
        Self::Neutron,
        Self::Tomcat,
        Self::Broadleaf,
        Self::Nova,
        Self::Npm,
        Self::SpringIntegration,
    ];

    /// Catalogue name, also the file stem on disk.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Brackets => "brackets",
            Self::Camel => "camel",
            Self::Fabric8 => "fabric8",
            Self::Jgroups => "jgroups",
            Self::Neutron => "neutron",
            Self::Tomcat => "tomcat",
            Self::Broadleaf => "broadleaf",
            Self::Nova => "nova",
            Self::Npm => "npm",
            Self::SpringIntegration => "spring-integration",
        }
    }

    /// Look a dataset up by catalogue name.
    ///
    /// # Errors
    ///
    /// Returns [`JitError::UnknownDataset`] for names outside the catalogue.
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|d| d.name() == name)
            .ok_or_else(|| JitError::unknown_dataset(name))
    }

    /// All other datasets, used as cross-project training data.
    #[must_use]
    pub fn others(&self) -> Vec<Dataset> {
        Self::ALL.iter().copied().filter(|d| d != self).collect()
    }

    fn index(self) -> u64 {
        Self::ALL.iter().position(|&d| d == self).unwrap_or(0) as u64
    }
}

impl std::fmt::Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Dataset {
    type Err = JitError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

/// Source of commit streams.
pub trait DatasetLoader {
    /// Load the commit stream of `dataset` in arrival order.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be read or violates
    /// [`validate_commits`].
    fn load(&self, dataset: Dataset) -> Result<Vec<Commit>>;
}

/// Check the invariants every loaded stream must satisfy.
///
/// # Errors
///
/// Returns an error on a wrong feature count, non-finite features, a
/// target outside {0, 1}, a bug without fix time, or decreasing timestamps.
pub fn validate_commits(commits: &[Commit]) -> Result<()> {
    let mut last = i64::MIN;
    for commit in commits {
        if commit.features.len() != N_FEATURES {
            return Err(JitError::DimensionMismatch {
                expected: N_FEATURES,
                actual: commit.features.len(),
            });
        }
        if commit.features.iter().any(|x| !x.is_finite()) {
            return Err(JitError::invalid_data(format!(
                "commit {} has non-finite features",
                commit.id
            )));
        }
        if commit.target > 1 {
            return Err(JitError::invalid_data(format!(
                "commit {} has target {}",
                commit.id, commit.target
            )));
        }
        if commit.is_bug() && commit.timestamp_fix.is_none() {
            return Err(JitError::invalid_data(format!(
                "bug commit {} has no fix timestamp",
                commit.id
            )));
        }
        if commit.timestamp < last {
            return Err(JitError::invalid_data(format!(
                "commit {} arrives before its predecessor",
                commit.id
            )));
        }
        last = commit.timestamp;
    }
    Ok(())
}

/// Reads `<dir>/<dataset>.jsonl` or `<dir>/<dataset>.jsonl.gz`, one commit per line.
#[derive(Debug, Clone)]
pub struct JsonLinesLoader {
    dir: PathBuf,
}

impl JsonLinesLoader {
    /// Create a loader rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the dataset file, preferring the plain file.
    #[must_use]
    pub fn path(&self, dataset: Dataset) -> PathBuf {
        let plain = self.dir.join(format!("{}.jsonl", dataset.name()));
        if plain.exists() {
            return plain;
        }
        let gz = self.dir.join(format!("{}.jsonl.gz", dataset.name()));
        if gz.exists() {
            gz
        } else {
            plain
        }
    }

    fn reader(path: &Path) -> Result<Box<dyn Read>> {
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => JitError::DatasetNotFound {
                path: path.to_path_buf(),
            },
            _ => JitError::Io(e),
        })?;
        if path.extension().and_then(|e| e.to_str()) == Some("gz") {
            Ok(Box::new(GzDecoder::new(file)))
        } else {
            Ok(Box::new(file))
        }
    }
}

impl DatasetLoader for JsonLinesLoader {
    fn load(&self, dataset: Dataset) -> Result<Vec<Commit>> {
        let path = self.path(dataset);
        let reader = BufReader::new(Self::reader(&path)?);
        let mut commits = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            commits.push(serde_json::from_str::<Commit>(&line)?);
        }
        validate_commits(&commits)?;
        tracing::debug!(dataset = %dataset, commits = commits.len(), "loaded dataset");
        Ok(commits)
    }
}

/// Generates a reproducible two-cluster stream.
///
/// Clean commits draw every feature from `[0, 1)`, bug commits from
/// `[1, 2)`, so any reasonable learner can separate them.
#[derive(Debug, Clone)]
pub struct SyntheticLoader {
    /// Commits per dataset
    pub n_commits: usize,
    /// Probability of a commit being bug-inducing
    pub bug_rate: f64,
    /// Base seed; each dataset offsets it by its catalogue index
    pub seed: u64,
    /// First arrival time
    pub start_timestamp: i64,
    /// Upper bound of the fix delay, in days
    pub max_fix_days: i64,
}

impl SyntheticLoader {
    /// Create a generator with sensible defaults.
    #[must_use]
    pub fn new(n_commits: usize, seed: u64) -> Self {
        Self {
            n_commits,
            bug_rate: 0.3,
            seed,
            start_timestamp: 1_400_000_000,
            max_fix_days: 200,
        }
    }

    /// Set the bug rate.
    #[must_use]
    pub fn with_bug_rate(mut self, bug_rate: f64) -> Self {
        self.bug_rate = bug_rate.clamp(0.0, 1.0);
        self
    }

    /// Generate the stream for a given dataset.
    #[must_use]
    pub fn generate(&self, dataset: Dataset) -> Vec<Commit> {
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(dataset.index()));
        let mut timestamp = self.start_timestamp;
        let max_fix = (self.max_fix_days * SECONDS_BY_DAY).max(2);
        (0..self.n_commits)
            .map(|i| {
                timestamp += rng.gen_range(3_600..2 * SECONDS_BY_DAY);
                let is_bug = rng.gen::<f64>() < self.bug_rate;
                let offset = if is_bug { 1.0 } else { 0.0 };
                let features = (0..N_FEATURES)
                    .map(|_| offset + rng.gen::<f64>())
                    .collect();
                let id = (dataset.index() << 32) | i as u64;
                if is_bug {
                    let fix = timestamp + rng.gen_range(1..max_fix);
                    Commit::bug(id, timestamp, features, fix)
                } else {
                    Commit::clean(id, timestamp, features)
                }
            })
            .collect()
    }
}

impl DatasetLoader for SyntheticLoader {
    fn load(&self, dataset: Dataset) -> Result<Vec<Commit>> {
        let commits = self.generate(dataset);
        validate_commits(&commits)?;
        Ok(commits)
    }
}
