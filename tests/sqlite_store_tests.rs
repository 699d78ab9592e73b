#![cfg(feature = "sqlite")]

mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use common::{at, d, draft, engine_with, monday_morning};
use lecture_scheduler::demo::seed_directory;
use lecture_scheduler::model::{Appointment, AppointmentStatus, Hall};
use lecture_scheduler::persistence::{
    DirectoryWriter, EntryFilter, HallFilter, SqliteStore, StoreError, TimetableReader,
};
use lecture_scheduler::calendar::DateRange;
use lecture_scheduler::{DayOfWeek, ManualClock, SchedulingError, TimeInterval};
use tempfile::NamedTempFile;

fn seeded_store(file: &NamedTempFile) -> SqliteStore {
    let store = SqliteStore::open(file.path()).unwrap();
    seed_directory(&store).unwrap();
    store
}

#[test]
fn sqlite_store_round_trip_entries_and_directory() {
    let file = NamedTempFile::new().unwrap();
    let clock = Arc::new(ManualClock::new(monday_morning()));
    let engine = engine_with(Arc::new(seeded_store(&file)), clock);
    let created = engine
        .writer()
        .create_entry(&draft("WEDNESDAY", "14:00", "16:00", "cs2023", "lec-2", "hall-b", "it-2024-a"))
        .unwrap();
    engine
        .writer()
        .create_entry(&draft("WEDNESDAY", "08:00", "09:00", "cs2012", "lec-1", "hall-a", "cs-2024-a"))
        .unwrap();
    drop(engine);

    let reopened = SqliteStore::open(file.path()).unwrap();
    let loaded = reopened.entry(&created.id).unwrap().expect("persisted entry");
    assert_eq!(loaded, created);

    let wednesday = reopened
        .list_active_entries(&EntryFilter::for_day(DayOfWeek::Wednesday))
        .unwrap();
    let starts: Vec<_> = wednesday.iter().map(|e| e.interval.start().to_string()).collect();
    assert_eq!(starts, vec!["08:00", "14:00"]);

    let lab = reopened.hall("lab-1").unwrap().unwrap();
    assert_eq!(lab.equipment, vec!["computers", "projector"]);
    assert_eq!(reopened.student_group_ids("stu-2").unwrap(), vec!["cs-2024-a"]);
    assert_eq!(
        reopened
            .list_halls(&HallFilter {
                min_capacity: Some(150),
                ..HallFilter::active()
            })
            .unwrap()
            .len(),
        2
    );
}

#[test]
fn sqlite_filters_match_memory_semantics() {
    let file = NamedTempFile::new().unwrap();
    let store = seeded_store(&file);
    store
        .upsert_hall(Hall {
            is_active: false,
            ..Hall::new("old-hall", "Old Hall", "Main Building", 500)
        })
        .unwrap();
    let engine = engine_with(Arc::new(store), Arc::new(ManualClock::new(monday_morning())));
    let writer = engine.writer();
    let entry = writer
        .create_entry(&draft("MONDAY", "09:00", "10:00", "cs2012", "lec-1", "lab-1", "cs-2024-a"))
        .unwrap();
    writer
        .create_entry(&draft("MONDAY", "11:00", "12:00", "it2015", "lec-3", "lab-2", "it-2024-a"))
        .unwrap();

    let store = engine.store();
    let by_groups = store
        .list_active_entries(&EntryFilter {
            group_ids: vec!["it-2024-a".into(), "nope".into()],
            ..EntryFilter::default()
        })
        .unwrap();
    assert_eq!(by_groups.len(), 1);
    assert_eq!(by_groups[0].lecturer_id, "lec-3");

    let excluded = store
        .list_active_entries(&EntryFilter::for_day(DayOfWeek::Monday).excluding(Some(&entry.id)))
        .unwrap();
    assert_eq!(excluded.len(), 1);
    assert!(store.list_halls(&HallFilter::active()).unwrap().iter().all(|h| h.id != "old-hall"));

    let conflicts = detect(&engine, "09:30", "10:30");
    assert_eq!(conflicts, 3);
}

fn detect(engine: &lecture_scheduler::SchedulingEngine, start: &str, end: &str) -> usize {
    let candidate = lecture_scheduler::model::CandidateSlot {
        day: DayOfWeek::Monday,
        interval: TimeInterval::parse(start, end).unwrap(),
        hall_id: "lab-1".into(),
        lecturer_id: "lec-1".into(),
        group_id: "cs-2024-a".into(),
    };
    engine.writer().check_conflicts(&candidate, None).unwrap().len()
}

#[test]
fn sqlite_rejected_update_leaves_row_untouched() {
    let file = NamedTempFile::new().unwrap();
    let engine = engine_with(
        Arc::new(seeded_store(&file)),
        Arc::new(ManualClock::new(monday_morning())),
    );
    let writer = engine.writer();
    let first = writer
        .create_entry(&draft("FRIDAY", "09:00", "10:00", "cs2012", "lec-1", "hall-a", "cs-2024-a"))
        .unwrap();
    let second = writer
        .create_entry(&draft("FRIDAY", "10:00", "11:00", "cs2023", "lec-2", "hall-b", "it-2024-a"))
        .unwrap();
    let err = writer
        .update_entry(
            &second.id,
            &lecture_scheduler::EntryDraft {
                hall_id: Some("hall-a".into()),
                start_time: Some("09:30".into()),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, SchedulingError::Conflict(_)));
    assert_eq!(engine.store().entry(&second.id).unwrap().unwrap(), second);

    writer.delete_entry(&first.id).unwrap();
    assert!(engine.store().entry(&first.id).unwrap().is_none());
}

#[test]
fn sqlite_appointments_filtered_by_status_and_range() {
    let file = NamedTempFile::new().unwrap();
    let store = seeded_store(&file);
    for (id, when, status) in [
        ("a-1", at(d(2026, 10, 20), 14, 0), AppointmentStatus::Accepted),
        ("a-2", at(d(2026, 10, 20), 9, 0), AppointmentStatus::Pending),
        ("a-3", at(d(2026, 10, 20), 11, 0), AppointmentStatus::Cancelled),
        ("a-4", at(d(2026, 10, 21), 0, 0), AppointmentStatus::Accepted),
    ] {
        store
            .upsert_appointment(Appointment {
                id: id.into(),
                lecturer_id: "lec-1".into(),
                date_time: when,
                duration_minutes: 45,
                status,
                counterpart_name: "Student".into(),
            })
            .unwrap();
    }
    let found = store
        .list_appointments("lec-1", &AppointmentStatus::OCCUPYING, DateRange::day(d(2026, 10, 20)))
        .unwrap();
    let ids: Vec<_> = found.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["a-2", "a-1"]);
    assert_eq!(found[1].date_time, at(d(2026, 10, 20), 14, 0));
}

#[test]
fn concurrent_writers_on_separate_connections_admit_exactly_one() {
    let file = NamedTempFile::new().unwrap();
    drop(seeded_store(&file));
    let workers = 4;
    let engines: Vec<_> = (0..workers)
        .map(|_| {
            engine_with(
                Arc::new(SqliteStore::open(file.path()).unwrap()),
                Arc::new(ManualClock::new(monday_morning())),
            )
        })
        .collect();
    let barrier = Arc::new(Barrier::new(workers));

    let handles: Vec<_> = engines
        .into_iter()
        .enumerate()
        .map(|(i, engine)| {
            let barrier = barrier.clone();
            thread::spawn(move || {
                let lecturer = ["lec-1", "lec-2", "lec-3"][i % 3];
                barrier.wait();
                engine.writer().create_entry(&draft(
                    "TUESDAY", "10:00", "12:00", "cs2012", lecturer, "hall-a", "cs-2024-a",
                ))
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1, "{results:?}");

    let check = SqliteStore::open(file.path()).unwrap();
    let tuesday = check
        .list_active_entries(&EntryFilter::for_day(DayOfWeek::Tuesday))
        .unwrap();
    assert_eq!(tuesday.len(), 1);
}

#[test]
fn out_of_range_year_is_reported_not_truncated() {
    let file = NamedTempFile::new().unwrap();
    let clock = Arc::new(ManualClock::new(monday_morning()));
    let engine = engine_with(Arc::new(seeded_store(&file)), clock);
    let created = engine
        .writer()
        .create_entry(&draft("MONDAY", "09:00", "10:00", "cs2012", "lec-1", "lab-1", "cs-2024-a"))
        .unwrap();
    drop(engine);

    let conn = rusqlite::Connection::open(file.path()).unwrap();
    conn.execute(
        "UPDATE timetable_entries SET year = ?1 WHERE id = ?2",
        rusqlite::params![i64::from(i32::MAX) + 2026, created.id],
    )
    .unwrap();
    drop(conn);

    let reopened = SqliteStore::open(file.path()).unwrap();
    let err = reopened.entry(&created.id).unwrap_err();
    assert!(matches!(err, StoreError::InvalidData(ref message) if message.contains("bad year")));
}
