//! Labeling-event extraction with simulated verification latency.
//!
//! A clean commit can only be trusted after `waiting_time` days pass with
//! no bug report. A bug commit is labeled when its fix lands. A bug whose
//! fix takes longer than the waiting time first looks clean, so it also
//! yields an early clean event.

use crate::data::{Commit, Event, SECONDS_BY_DAY};
use crate::error::{JitError, Result};

/// Convert a waiting time in days to seconds.
#[must_use]
pub fn verification_latency(waiting_time_days: u32) -> i64 {
    i64::from(waiting_time_days) * SECONDS_BY_DAY
}

/// Turn an arrival-ordered commit stream into a label-availability stream.
///
/// Events come out sorted by `timestamp_event`. Ties keep the order
/// cleaned, bugged, bug-cleaned, and within each set the commit order.
///
/// # Errors
///
/// Returns an error if a bug commit carries no fix timestamp.
pub fn extract_events(commits: &[Commit], waiting_time_days: u32) -> Result<Vec<Event>> {
    let latency = verification_latency(waiting_time_days);

    let cleaned = commits
        .iter()
        .filter(|c| !c.is_bug())
        .map(|c| Event::from_commit(c, 0, c.timestamp + latency));

    let bugs: Vec<(&Commit, i64)> = commits
        .iter()
        .filter(|c| c.is_bug())
        .map(|c| {
            c.timestamp_fix.map(|fix| (c, fix)).ok_or_else(|| {
                JitError::invalid_data(format!("bug commit {} has no fix timestamp", c.id))
            })
        })
        .collect::<Result<_>>()?;

    let bugged = bugs.iter().map(|&(c, fix)| Event::from_commit(c, 1, fix));

    let bug_cleaned = bugs
        .iter()
        .filter(|&&(c, fix)| fix - c.timestamp >= latency)
        .map(|&(c, _)| Event::from_commit(c, 0, c.timestamp + latency));

    let mut events: Vec<Event> = cleaned.chain(bugged).chain(bug_cleaned).collect();
    // stable: ties keep concatenation order
    events.sort_by_key(|e| e.timestamp_event);
    Ok(events)
}
