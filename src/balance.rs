//! Clean/bug interleaving of the training event stream.
//!
//! Bug events wait in a FIFO queue. Every clean event releases at most one
//! queued bug, which is re-stamped with the clean event's time and emitted
//! right after it. Bugs still queued when the stream ends are dropped.
//!
//! The re-stamp assumes a queued bug is no later than the clean event it is
//! paired with. Input sorted by `timestamp_event` guarantees that, since a
//! bug is only queued once its own time has been reached.

use crate::data::Event;
use std::collections::VecDeque;

/// Outcome of a balancing pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Balanced {
    /// Interleaved events, non-decreasing in `timestamp_event` when the
    /// input was
    pub events: Vec<Event>,
    /// Bug events left unpaired at the end of the stream
    pub dropped: usize,
}

/// Pair every clean event with the oldest waiting bug event.
#[must_use]
pub fn balance(events: Vec<Event>) -> Balanced {
    let mut bug_pool: VecDeque<Event> = VecDeque::new();
    let mut balanced = Vec::with_capacity(events.len());

    for event in events {
        if event.target == 1 {
            bug_pool.push_back(event);
            continue;
        }
        let timestamp_event = event.timestamp_event;
        balanced.push(event);
        if let Some(mut bug) = bug_pool.pop_front() {
            bug.timestamp_event = timestamp_event;
            balanced.push(bug);
        }
    }

    if !bug_pool.is_empty() {
        tracing::debug!(dropped = bug_pool.len(), "unpaired bug events dropped");
    }
    Balanced {
        events: balanced,
        dropped: bug_pool.len(),
    }
}

/// Convenience wrapper returning only the interleaved events.
#[must_use]
pub fn balance_events(events: Vec<Event>) -> Vec<Event> {
    balance(events).events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::N_FEATURES;

    fn event(ts: i64, target: u8) -> Event {
        Event {
            timestamp_event: ts,
            timestamp: ts - 1,
            features: vec![ts as f64; N_FEATURES],
            target,
            source_commit: ts as u64,
        }
    }

    fn summary(events: &[Event]) -> Vec<(i64, u8)> {
        events.iter().map(|e| (e.timestamp_event, e.target)).collect()
    }

    #[test]
    fn test_bug_restamped_to_clean_time() {
        let out = balance(vec![event(1, 1), event(5, 0)]);
        assert_eq!(summary(&out.events), vec![(5, 0), (5, 1)]);
        assert_eq!(out.events[1].source_commit, 1);
        assert_eq!(out.dropped, 0);
    }

    #[test]
    fn test_fifo_order() {
        let out = balance(vec![event(1, 1), event(2, 1), event(3, 0), event(4, 0)]);
        assert_eq!(
            summary(&out.events),
            vec![(3, 0), (3, 1), (4, 0), (4, 1)]
        );
        let sources: Vec<u64> = out.events.iter().map(|e| e.source_commit).collect();
        assert_eq!(sources, vec![3, 1, 4, 2]);
    }

    #[test]
    fn test_clean_without_waiting_bug() {
        let out = balance(vec![event(1, 0), event(2, 0)]);
        assert_eq!(summary(&out.events), vec![(1, 0), (2, 0)]);
    }

    #[test]
    fn test_trailing_bugs_dropped() {
        let out = balance(vec![event(1, 0), event(2, 1), event(3, 1)]);
        assert_eq!(summary(&out.events), vec![(1, 0)]);
        assert_eq!(out.dropped, 2);
    }

    #[test]
    fn test_output_monotone_for_sorted_input() {
        let input = vec![
            event(1, 1),
            event(2, 0),
            event(3, 1),
            event(4, 1),
            event(6, 0),
            event(7, 0),
            event(9, 0),
        ];
        let out = balance_events(input);
        assert!(out
            .windows(2)
            .all(|w| w[0].timestamp_event <= w[1].timestamp_event));
    }

    #[test]
    fn test_restamp_never_moves_bug_earlier_for_sorted_input() {
        let input = vec![event(1, 1), event(2, 1), event(8, 0), event(9, 0)];
        let originals: std::collections::HashMap<u64, i64> = input
            .iter()
            .map(|e| (e.source_commit, e.timestamp_event))
            .collect();
        for e in balance_events(input) {
            assert!(e.timestamp_event >= originals[&e.source_commit]);
        }
    }

    #[test]
    fn test_empty_input() {
        let out = balance(Vec::new());
        assert!(out.events.is_empty());
        assert_eq!(out.dropped, 0);
    }
}
