use crate::calendar::DayOfWeek;
use crate::error::SchedulingResult;
use crate::interval::overlaps;
use crate::model::{CandidateSlot, TimetableEntry};
use crate::persistence::{EntryFilter, TimetableReader};
use crate::time::TimeInterval;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConflictKind {
    Hall,
    Lecturer,
    Group,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConflictKind::Hall => "HALL",
            ConflictKind::Lecturer => "LECTURER",
            ConflictKind::Group => "GROUP",
        })
    }
}

/// An existing active entry that would share a resource with a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub kind: ConflictKind,
    pub conflicting_entry_id: String,
    pub day: DayOfWeek,
    pub interval: TimeInterval,
    pub resource_label: String,
    pub message: String,
}

/// Every conflict between `candidate` and the active entries on its day.
///
/// Entries are visited in day-then-start order and each overlapping entry
/// yields one conflict per shared resource, hall before lecturer before group.
/// `exclude_entry_id` lets an update ignore the entry being edited.
pub fn detect_conflicts<R>(
    reader: &R,
    candidate: &CandidateSlot,
    exclude_entry_id: Option<&str>,
) -> SchedulingResult<Vec<Conflict>>
where
    R: TimetableReader + ?Sized,
{
    let filter = EntryFilter::for_day(candidate.day).excluding(exclude_entry_id);
    let entries = reader.list_active_entries(&filter)?;

    let mut conflicts = Vec::new();
    for entry in entries
        .iter()
        .filter(|entry| overlaps(&candidate.interval, &entry.interval))
    {
        let mut labels = Labels::new(reader, entry);
        if entry.hall_id == candidate.hall_id {
            let hall = labels.hall()?;
            let message = format!(
                "Hall \"{hall}\" is already booked for {} on {} {}",
                labels.course()?,
                entry.day_of_week,
                entry.interval
            );
            conflicts.push(conflict(ConflictKind::Hall, entry, hall, message));
        }
        if entry.lecturer_id == candidate.lecturer_id {
            let lecturer = labels.lecturer()?;
            let message = format!(
                "Lecturer \"{lecturer}\" is already teaching {} on {} {}",
                labels.course()?,
                entry.day_of_week,
                entry.interval
            );
            conflicts.push(conflict(ConflictKind::Lecturer, entry, lecturer, message));
        }
        if entry.group_id == candidate.group_id {
            let group = labels.group()?;
            let message = format!(
                "Group \"{group}\" already has {} on {} {}",
                labels.course()?,
                entry.day_of_week,
                entry.interval
            );
            conflicts.push(conflict(ConflictKind::Group, entry, group, message));
        }
    }
    Ok(conflicts)
}

fn conflict(
    kind: ConflictKind,
    entry: &TimetableEntry,
    resource_label: String,
    message: String,
) -> Conflict {
    Conflict {
        kind,
        conflicting_entry_id: entry.id.clone(),
        day: entry.day_of_week,
        interval: entry.interval,
        resource_label,
        message,
    }
}

/// Display names for a conflicting entry's references. Missing directory
/// records fall back to their ids. The course code is looked up once.
struct Labels<'a, R: ?Sized> {
    reader: &'a R,
    entry: &'a TimetableEntry,
    course: Option<String>,
}

impl<'a, R: TimetableReader + ?Sized> Labels<'a, R> {
    fn new(reader: &'a R, entry: &'a TimetableEntry) -> Self {
        Self {
            reader,
            entry,
            course: None,
        }
    }

    fn course(&mut self) -> SchedulingResult<String> {
        if let Some(code) = &self.course {
            return Ok(code.clone());
        }
        let code = self
            .reader
            .course(&self.entry.course_id)?
            .map(|course| course.code)
            .unwrap_or_else(|| self.entry.course_id.clone());
        self.course = Some(code.clone());
        Ok(code)
    }

    fn hall(&self) -> SchedulingResult<String> {
        Ok(self
            .reader
            .hall(&self.entry.hall_id)?
            .map(|hall| hall.name)
            .unwrap_or_else(|| self.entry.hall_id.clone()))
    }

    fn lecturer(&self) -> SchedulingResult<String> {
        Ok(self
            .reader
            .lecturer(&self.entry.lecturer_id)?
            .map(|lecturer| lecturer.full_name())
            .unwrap_or_else(|| self.entry.lecturer_id.clone()))
    }

    fn group(&self) -> SchedulingResult<String> {
        Ok(self
            .reader
            .group(&self.entry.group_id)?
            .map(|group| group.name)
            .unwrap_or_else(|| self.entry.group_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Course, EntryFields, Hall, Lecturer, StudentGroup};
    use crate::persistence::{DirectoryWriter, MemoryStore};

    fn store_with_entry() -> MemoryStore {
        let store = MemoryStore::new();
        store.upsert_hall(Hall::new("h1", "Lab 1", "Computing Block", 40)).unwrap();
        store
            .upsert_lecturer(Lecturer::new("l1", "Kumara", "Perera", "kumara@uni.lk"))
            .unwrap();
        store.upsert_group(StudentGroup::new("g1", "CS-Y1", 2026)).unwrap();
        store.upsert_course(Course::new("c1", "CS101", "Programming I")).unwrap();
        store.insert_entry_unchecked(TimetableEntry::from_fields(
            "e1",
            EntryFields::new(
                DayOfWeek::Monday,
                TimeInterval::parse("10:00", "11:00").unwrap(),
                "c1",
                "l1",
                "h1",
                "g1",
            ),
        ));
        store
    }

    fn candidate(start: &str, end: &str, group: &str) -> CandidateSlot {
        CandidateSlot {
            day: DayOfWeek::Monday,
            interval: TimeInterval::parse(start, end).unwrap(),
            hall_id: "h1".into(),
            lecturer_id: "l1".into(),
            group_id: group.into(),
        }
    }

    #[test]
    fn reports_each_shared_resource() {
        let store = store_with_entry();
        let conflicts = detect_conflicts(&store, &candidate("10:30", "11:30", "g2"), None).unwrap();
        let kinds: Vec<_> = conflicts.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![ConflictKind::Hall, ConflictKind::Lecturer]);
        assert_eq!(
            conflicts[0].message,
            "Hall \"Lab 1\" is already booked for CS101 on MONDAY 10:00–11:00"
        );
        assert_eq!(conflicts[1].resource_label, "Kumara Perera");
    }

    #[test]
    fn all_three_resources_reported() {
        let store = store_with_entry();
        let conflicts = detect_conflicts(&store, &candidate("09:30", "10:30", "g1"), None).unwrap();
        assert_eq!(conflicts.len(), 3);
        assert_eq!(
            conflicts[2].message,
            "Group \"CS-Y1\" already has CS101 on MONDAY 10:00–11:00"
        );
    }

    #[test]
    fn excluded_entry_does_not_conflict_with_itself() {
        let store = store_with_entry();
        let conflicts =
            detect_conflicts(&store, &candidate("10:15", "11:15", "g1"), Some("e1")).unwrap();
        assert!(conflicts.is_empty());
    }

    #[test]
    fn touching_and_other_days_are_clear() {
        let store = store_with_entry();
        assert!(
            detect_conflicts(&store, &candidate("11:00", "12:00", "g1"), None)
                .unwrap()
                .is_empty()
        );
        let mut tuesday = candidate("10:00", "11:00", "g1");
        tuesday.day = DayOfWeek::Tuesday;
        assert!(detect_conflicts(&store, &tuesday, None).unwrap().is_empty());
    }

    #[test]
    fn missing_directory_records_fall_back_to_ids() {
        let store = MemoryStore::new();
        store.insert_entry_unchecked(TimetableEntry::from_fields(
            "e9",
            EntryFields::new(
                DayOfWeek::Monday,
                TimeInterval::parse("10:00", "11:00").unwrap(),
                "c9",
                "l9",
                "h1",
                "g9",
            ),
        ));
        let conflicts = detect_conflicts(&store, &candidate("10:00", "11:00", "g1"), None).unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].resource_label, "h1");
        assert!(conflicts[0].message.contains("for c9 on"));
    }
}
