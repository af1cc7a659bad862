//! Interleaving of the arrival-ordered test stream with the
//! label-ordered train stream.
//!
//! Each axis is cut into runs bounded by the other axis' timestamps.
//! Test rows are bucketed into half-open `[a, b)` intervals, train rows into
//! `(a, b]`, so a label that becomes available at the same second a commit
//! arrives is only used after that commit has been scored.
//!
//! Whether the first step trains or tests is decided once, from which axis
//! has more runs. That approximates a true timestamp merge and can misorder
//! the very first pair of runs.

use std::collections::VecDeque;

/// One unit of scheduled work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Train on the next `n` events of the train stream
    Train(usize),
    /// Score the next `n` commits of the test stream
    Test(usize),
}

/// Count the items of `data` falling between consecutive `bins` edges.
///
/// The outer edges are `data[0] - right` and `data[last] + !right`, so no
/// item is lost at either end. Edges of `bins` strictly inside that range
/// become inner edges. Intervals are `(a, b]` when `right` is set and
/// `[a, b)` otherwise. Empty intervals are dropped; order is kept.
///
/// `data` and `bins` are expected in non-decreasing order. For such input
/// the counts sum to `data.len()`.
#[must_use]
pub fn calculate_steps(data: &[i64], bins: &[i64], right: bool) -> Vec<usize> {
    let (Some(&first), Some(&last)) = (data.first(), data.last()) else {
        return Vec::new();
    };
    let lower = first - i64::from(right);
    let upper = last + i64::from(!right);

    let mut edges = Vec::with_capacity(bins.len() + 2);
    edges.push(lower);
    edges.extend(bins.iter().copied().filter(|&b| lower < b && b < upper));
    edges.push(upper);
    edges.sort_unstable();
    edges.dedup();

    let n_buckets = edges.len() - 1;
    let mut counts = vec![0usize; n_buckets];
    for &x in data {
        let below = if right {
            edges.partition_point(|&e| e < x)
        } else {
            edges.partition_point(|&e| e <= x)
        };
        // items outside the outer edges only occur for unsorted input
        if below == 0 || below > n_buckets {
            continue;
        }
        counts[below - 1] += 1;
    }
    counts.retain(|&c| c > 0);
    counts
}

/// Step counts for both axes plus the ordering decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    test_steps: Vec<usize>,
    train_steps: VecDeque<usize>,
    train_first: bool,
}

impl Schedule {
    /// Build the schedule from arrival times of the test commits and
    /// availability times of the train events.
    #[must_use]
    pub fn new(test_timestamps: &[i64], train_timestamps: &[i64]) -> Self {
        let test_steps = calculate_steps(test_timestamps, train_timestamps, false);
        let train_steps: VecDeque<usize> =
            calculate_steps(train_timestamps, test_timestamps, true).into();
        let train_first = test_steps.len() < train_steps.len();
        tracing::debug!(
            test_steps = test_steps.len(),
            train_steps = train_steps.len(),
            train_first,
            "schedule built"
        );
        Self {
            test_steps,
            train_steps,
            train_first,
        }
    }

    /// Test run lengths in order.
    #[must_use]
    pub fn test_steps(&self) -> &[usize] {
        &self.test_steps
    }

    /// Train run lengths in order.
    #[must_use]
    pub fn train_steps(&self) -> Vec<usize> {
        self.train_steps.iter().copied().collect()
    }

    /// Whether the first test run is preceded by a train run.
    #[must_use]
    pub fn train_first(&self) -> bool {
        self.train_first
    }

    /// The steps to execute, in order.
    ///
    /// Every test run is emitted. A train run precedes each test run except
    /// the first when `train_first` is unset. Train runs left after the last
    /// test run are never emitted.
    pub fn steps(&self) -> impl Iterator<Item = Step> + '_ {
        let mut train = self.train_steps.iter().copied();
        let mut train_first = self.train_first;
        self.test_steps.iter().flat_map(move |&test| {
            let train_step = if train_first {
                train.next().map(Step::Train)
            } else {
                train_first = true;
                None
            };
            train_step.into_iter().chain(std::iter::once(Step::Test(test)))
        })
    }
}
