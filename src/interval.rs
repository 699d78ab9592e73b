use crate::time::{TimeInterval, TimeOfDay};
use serde::{Deserialize, Serialize};

/// A maximal gap in a resource's day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreeSlot {
    #[serde(flatten)]
    pub interval: TimeInterval,
    pub duration_minutes: u32,
}

impl FreeSlot {
    pub fn new(interval: TimeInterval) -> Self {
        Self {
            interval,
            duration_minutes: interval.duration_minutes(),
        }
    }

    pub fn start(&self) -> TimeOfDay {
        self.interval.start()
    }

    pub fn end(&self) -> TimeOfDay {
        self.interval.end()
    }
}

/// Half-open overlap: intervals that merely touch do not overlap.
pub fn overlaps(a: &TimeInterval, b: &TimeInterval) -> bool {
    a.start() < b.end() && b.start() < a.end()
}

/// Gaps in `window` not covered by any of `occupied`.
///
/// Input order does not matter. Overlapping or touching occupied intervals
/// merge implicitly through the sweep cursor, and occupied time outside the
/// window never produces slots beyond it.
pub fn free_slots(occupied: &[TimeInterval], window: TimeInterval) -> Vec<FreeSlot> {
    let mut sorted = occupied.to_vec();
    sorted.sort_by_key(|interval| (interval.start(), interval.end()));

    let mut free = Vec::new();
    let mut cursor = window.start();
    for interval in &sorted {
        if cursor >= window.end() {
            break;
        }
        let gap_end = interval.start().min(window.end());
        if gap_end > cursor {
            push_slot(&mut free, cursor, gap_end);
        }
        cursor = cursor.max(interval.end());
    }
    if cursor < window.end() {
        push_slot(&mut free, cursor, window.end());
    }
    free
}

fn push_slot(free: &mut Vec<FreeSlot>, start: TimeOfDay, end: TimeOfDay) {
    if let Ok(interval) = TimeInterval::new(start, end) {
        free.push(FreeSlot::new(interval));
    }
}

/// Coalesces overlapping and touching intervals, sorted by start.
pub fn merge(occupied: &[TimeInterval]) -> Vec<TimeInterval> {
    let mut sorted = occupied.to_vec();
    sorted.sort_by_key(|interval| (interval.start(), interval.end()));

    let mut merged: Vec<TimeInterval> = Vec::with_capacity(sorted.len());
    for interval in sorted {
        match merged.last_mut() {
            Some(last) if interval.start() <= last.end() => {
                if let Ok(extended) = TimeInterval::new(last.start(), interval.end().max(last.end())) {
                    *last = extended;
                }
            }
            _ => merged.push(interval),
        }
    }
    merged
}
