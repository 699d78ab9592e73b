#![allow(dead_code)]

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use lecture_scheduler::demo::seed_directory;
use lecture_scheduler::persistence::{MemoryStore, TimetableStore};
use lecture_scheduler::{EngineConfig, EntryDraft, ManualClock, SchedulingEngine};

pub fn d(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(date: NaiveDate, hour: u32, minute: u32) -> NaiveDateTime {
    date.and_hms_opt(hour, minute, 0).unwrap()
}

/// Monday 2026-10-19 10:30.
pub fn monday_morning() -> NaiveDateTime {
    at(d(2026, 10, 19), 10, 30)
}

pub fn seeded_memory_store() -> MemoryStore {
    let store = MemoryStore::new();
    seed_directory(&store).unwrap();
    store
}

pub fn engine_with(store: Arc<dyn TimetableStore>, clock: Arc<ManualClock>) -> SchedulingEngine {
    SchedulingEngine::new(store, clock, &EngineConfig::default()).unwrap()
}

/// Engine over the demo directory, clock pinned to [`monday_morning`].
pub fn demo_engine() -> (SchedulingEngine, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(monday_morning()));
    let engine = engine_with(Arc::new(seeded_memory_store()), clock.clone());
    (engine, clock)
}

pub fn draft(
    day: &str,
    start: &str,
    end: &str,
    course: &str,
    lecturer: &str,
    hall: &str,
    group: &str,
) -> EntryDraft {
    EntryDraft {
        day_of_week: Some(day.into()),
        start_time: Some(start.into()),
        end_time: Some(end.into()),
        course_id: Some(course.into()),
        lecturer_id: Some(lecturer.into()),
        hall_id: Some(hall.into()),
        group_id: Some(group.into()),
        ..EntryDraft::default()
    }
}
