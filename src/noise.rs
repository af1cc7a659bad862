//! Label-noise filter for late bug reports.
//!
//! Events whose feature vectors are identical belong to the same group.
//! Once a group has been confirmed clean often enough, a bug label that
//! arrives afterwards is treated as noise and discarded.

use crate::data::{feature_key, Event};
use std::collections::HashMap;

#[derive(Debug, Default, Clone, Copy)]
struct GroupCounts {
    /// rows seen so far
    count: usize,
    /// bug rows seen so far
    bugs: usize,
}

/// Flags the events that [`remove_noise`] would drop.
///
/// For a row `i` in group `g`, with `cumcount(i)` the number of earlier rows
/// of `g` and `cumsum(i)` the number of bug rows of `g` up to and including
/// `i`, the row is noise when it is a bug and `cumcount(i) - cumsum(i) >= n`.
#[must_use]
pub fn noise_mask(events: &[Event], n: usize) -> Vec<bool> {
    let mut groups: HashMap<Vec<u64>, GroupCounts> = HashMap::new();
    events
        .iter()
        .map(|event| {
            let counts = groups.entry(feature_key(&event.features)).or_default();
            let cumcount = counts.count;
            counts.bugs += usize::from(event.target);
            counts.count += 1;
            let cumsum = counts.bugs;
            event.target == 1 && cumcount as i64 - cumsum as i64 >= n as i64
        })
        .collect()
}

/// Drop bug events that contradict `n` or more prior clean confirmations.
#[must_use]
pub fn remove_noise(events: Vec<Event>, n: usize) -> Vec<Event> {
    let mask = noise_mask(&events, n);
    let before = events.len();
    let kept: Vec<Event> = events
        .into_iter()
        .zip(mask)
        .filter_map(|(event, noise)| (!noise).then_some(event))
        .collect();
    tracing::debug!(removed = before - kept.len(), kept = kept.len(), "noise filter");
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::N_FEATURES;

    fn event(ts: i64, v: f64, target: u8) -> Event {
        Event {
            timestamp_event: ts,
            timestamp: ts,
            features: vec![v; N_FEATURES],
            target,
            source_commit: ts as u64,
        }
    }

    fn targets(events: &[Event]) -> Vec<u8> {
        events.iter().map(|e| e.target).collect()
    }

    #[test]
    fn test_bug_after_many_cleans_removed() {
        // group 0.5: four cleans then a bug; cumcount=4, cumsum=1 -> 3 >= 3
        let events = vec![
            event(0, 0.5, 0),
            event(1, 0.5, 0),
            event(2, 0.5, 0),
            event(3, 0.5, 0),
            event(4, 0.5, 1),
        ];
        let kept = remove_noise(events, 3);
        assert_eq!(targets(&kept), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_bug_below_threshold_kept() {
        // three cleans then a bug; cumcount=3, cumsum=1 -> 2 < 3
        let events = vec![
            event(0, 0.5, 0),
            event(1, 0.5, 0),
            event(2, 0.5, 0),
            event(3, 0.5, 1),
        ];
        let kept = remove_noise(events, 3);
        assert_eq!(targets(&kept), vec![0, 0, 0, 1]);
    }

    #[test]
    fn test_groups_counted_independently() {
        let events = vec![
            event(0, 0.1, 0),
            event(1, 0.1, 0),
            event(2, 0.2, 1),
            event(3, 0.1, 0),
            event(4, 0.2, 1),
        ];
        let mask = noise_mask(&events, 1);
        // group 0.2 has no clean rows, its bugs survive
        assert_eq!(mask, vec![false, false, false, false, false]);
    }

    #[test]
    fn test_zero_threshold_keeps_first_bug() {
        // cumcount=0, cumsum=1 -> -1 < 0
        let events = vec![event(0, 0.9, 1), event(1, 0.9, 0), event(2, 0.9, 1)];
        // second bug: cumcount=2, cumsum=2 -> 0 >= 0
        assert_eq!(noise_mask(&events, 0), vec![false, false, true]);
    }

    #[test]
    fn test_clean_events_never_removed() {
        let events: Vec<Event> = (0..10).map(|i| event(i, 0.3, 0)).collect();
        assert_eq!(remove_noise(events, 0).len(), 10);
    }

    #[test]
    fn test_idempotent() {
        let events = vec![
            event(0, 0.5, 0),
            event(1, 0.5, 0),
            event(2, 0.5, 1),
            event(3, 0.5, 0),
            event(4, 0.5, 1),
            event(5, 0.5, 1),
            event(6, 0.7, 1),
        ];
        let once = remove_noise(events, 1);
        let twice = remove_noise(once.clone(), 1);
        assert_eq!(once, twice);
    }
}
