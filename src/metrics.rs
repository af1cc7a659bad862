//! Prequential (test-then-train) evaluation with fading factors.
//!
//! Every metric is a running ratio of exponentially decayed counts, so
//! recent commits weigh more than old ones.

use crate::data::PredictionRecord;
use serde::{Deserialize, Serialize};

/// Fading factor used when evaluating a run.
pub const DEFAULT_FADING_FACTOR: f64 = 0.99;

/// Per-class fading recalls `(r0, r1)` after each record.
///
/// The counts of class `c` only decay on records whose target is `c`.
/// A record without prediction counts as a miss.
#[must_use]
pub fn prequential_recalls(records: &[PredictionRecord], fading_factor: f64) -> Vec<(f64, f64)> {
    let mut hits = [0.0_f64; 2];
    let mut totals = [0.0_f64; 2];
    let mut recalls = [0.0_f64; 2];
    records
        .iter()
        .map(|record| {
            let class = usize::from(record.target.min(1));
            let hit = record.prediction == Some(record.target);
            hits[class] = f64::from(u8::from(hit)) + fading_factor * hits[class];
            totals[class] = 1.0 + fading_factor * totals[class];
            recalls[class] = hits[class] / totals[class];
            (recalls[0], recalls[1])
        })
        .collect()
}

/// Geometric mean of each recall pair.
#[must_use]
pub fn prequential_gmean(recalls: &[(f64, f64)]) -> Vec<f64> {
    recalls.iter().map(|&(r0, r1)| (r0 * r1).sqrt()).collect()
}

/// Fading share of class 1 among `labels`, decayed on every row.
///
/// `None` labels only decay the counts.
#[must_use]
pub fn prequential_proportions(labels: &[Option<u8>], fading_factor: f64) -> Vec<f64> {
    let mut positives = 0.0;
    let mut total = 0.0;
    labels
        .iter()
        .map(|label| {
            positives = f64::from(u8::from(*label == Some(1))) + fading_factor * positives;
            total = 1.0 + fading_factor * total;
            positives / total
        })
        .collect()
}

/// A record with its running metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    /// Position in the evaluated stream
    pub timestep: usize,
    /// Ground truth
    pub target: u8,
    /// Binary decision
    pub prediction: Option<u8>,
    /// Estimated bug probability
    pub probability: f64,
    /// Fading recall of clean commits
    pub r0: f64,
    /// Fading recall of bug commits
    pub r1: f64,
    /// `|r0 - r1|`
    pub r0_r1: f64,
    /// `sqrt(r0 * r1)`
    pub gmean: f64,
    /// Fading share of bug targets
    pub t1: f64,
    /// Fading share of bug predictions
    pub p1: f64,
    /// `|th - p1|`
    pub th_p1: f64,
}

/// Running metrics for every record.
#[must_use]
pub fn prequential_metrics(
    records: &[PredictionRecord],
    fading_factor: f64,
    th: f64,
) -> Vec<MetricRow> {
    let recalls = prequential_recalls(records, fading_factor);
    let gmeans = prequential_gmean(&recalls);
    let targets: Vec<Option<u8>> = records.iter().map(|r| Some(r.target)).collect();
    let t1 = prequential_proportions(&targets, fading_factor);
    let predictions: Vec<Option<u8>> = records.iter().map(|r| r.prediction).collect();
    let p1 = prequential_proportions(&predictions, fading_factor);

    records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let (r0, r1) = recalls[i];
            MetricRow {
                timestep: record.timestep,
                target: record.target,
                prediction: record.prediction,
                probability: record.probability,
                r0,
                r1,
                r0_r1: (r0 - r1).abs(),
                gmean: gmeans[i],
                t1: t1[i],
                p1: p1[i],
                th_p1: (th - p1[i]).abs(),
            }
        })
        .collect()
}

/// Time-averaged metrics of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub r0: f64,
    pub r1: f64,
    pub r0_r1: f64,
    pub gmean: f64,
    pub t1: f64,
    pub p1: f64,
    pub th_p1: f64,
}

impl Summary {
    /// Average every metric over `rows`; all zero for no rows.
    #[must_use]
    pub fn from_rows(rows: &[MetricRow]) -> Self {
        if rows.is_empty() {
            return Self::default();
        }
        let n = rows.len() as f64;
        let mean = |f: fn(&MetricRow) -> f64| rows.iter().map(f).sum::<f64>() / n;
        Self {
            r0: mean(|r| r.r0),
            r1: mean(|r| r.r1),
            r0_r1: mean(|r| r.r0_r1),
            gmean: mean(|r| r.gmean),
            t1: mean(|r| r.t1),
            p1: mean(|r| r.p1),
            th_p1: mean(|r| r.th_p1),
        }
    }
}

/// Plain recalls and their g-mean over a whole record set.
///
/// A class without records has recall 0.
#[must_use]
pub fn gmean_recalls(records: &[PredictionRecord]) -> (f64, f64, f64) {
    let mut hits = [0usize; 2];
    let mut totals = [0usize; 2];
    for record in records {
        let class = usize::from(record.target.min(1));
        totals[class] += 1;
        hits[class] += usize::from(record.prediction == Some(record.target));
    }
    let recall = |c: usize| {
        if totals[c] == 0 {
            0.0
        } else {
            hits[c] as f64 / totals[c] as f64
        }
    };
    let (r0, r1) = (recall(0), recall(1));
    (r0, r1, (r0 * r1).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(targets: &[u8], predictions: &[Option<u8>]) -> Vec<PredictionRecord> {
        targets
            .iter()
            .zip(predictions)
            .enumerate()
            .map(|(timestep, (&target, &prediction))| PredictionRecord {
                timestep,
                target,
                prediction,
                probability: 0.0,
            })
            .collect()
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-8, "{actual:?} != {expected:?}");
        }
    }

    fn example() -> Vec<PredictionRecord> {
        records(
            &[0, 1, 0, 0, 1, 1],
            &[None, Some(0), Some(0), Some(0), Some(1), Some(1)],
        )
    }

    #[test]
    fn test_prequential_recalls() {
        let recalls = prequential_recalls(&example(), 0.9);
        let r0: Vec<f64> = recalls.iter().map(|r| r.0).collect();
        let r1: Vec<f64> = recalls.iter().map(|r| r.1).collect();
        assert_close(&r0, &[0.0, 0.0, 0.526315789, 0.701107011, 0.701107011, 0.701107011]);
        assert_close(&r1, &[0.0, 0.0, 0.0, 0.0, 0.526315789, 0.701107011]);
    }

    #[test]
    fn test_prequential_gmean() {
        let recalls = prequential_recalls(&example(), 0.9);
        let gmean = prequential_gmean(&recalls);
        assert_close(&gmean, &[0.0, 0.0, 0.0, 0.0, 0.607456739, 0.701107011]);
    }

    #[test]
    fn test_prequential_proportions() {
        let predictions = [Some(1), Some(0), Some(0), Some(0), Some(1), Some(1)];
        let p1 = prequential_proportions(&predictions, 0.9);
        assert_close(
            &p1,
            &[1.0, 0.4736842105, 0.2988929889, 0.2119802268, 0.4044101487, 0.5315211105],
        );
    }

    #[test]
    fn test_missing_prediction_never_matches() {
        let recalls = prequential_recalls(&records(&[1], &[None]), 0.99);
        assert_eq!(recalls, vec![(0.0, 0.0)]);
    }

    #[test]
    fn test_metric_rows_and_summary() {
        let rows = prequential_metrics(&example(), 0.9, 0.5);
        assert_eq!(rows.len(), 6);
        assert!((rows[4].r0_r1 - (0.701107011 - 0.526315789)).abs() < 1e-8);
        // no prediction at step 0, so p1 = 0
        assert!((rows[0].th_p1 - 0.5).abs() < 1e-12);

        let summary = Summary::from_rows(&rows);
        let mean_gmean = (0.607456739 + 0.701107011) / 6.0;
        assert!((summary.gmean - mean_gmean).abs() < 1e-8);
    }

    #[test]
    fn test_summary_of_nothing() {
        assert_eq!(Summary::from_rows(&[]), Summary::default());
    }

    #[test]
    fn test_gmean_recalls() {
        let (r0, r1, gmean) = gmean_recalls(&example());
        assert!((r0 - 2.0 / 3.0).abs() < 1e-12);
        assert!((r1 - 2.0 / 3.0).abs() < 1e-12);
        assert!((gmean - 2.0 / 3.0).abs() < 1e-12);
    }
}
