use crate::cache::{CacheKey, ResultCache, Role};
use crate::calendar::DayOfWeek;
use crate::error::{ResourceKind, SchedulingError, SchedulingResult};
use crate::model::{TimetableEntry, TimetableSlot};
use crate::persistence::{EntryFilter, TimetableReader, TimetableStore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// A person's teaching week: every day present, slots sorted by start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTimetable {
    pub weekly: BTreeMap<DayOfWeek, Vec<TimetableSlot>>,
    pub flat: Vec<TimetableSlot>,
}

impl UserTimetable {
    pub fn from_slots(mut flat: Vec<TimetableSlot>) -> Self {
        flat.sort_by(|a, b| {
            (a.day_of_week, a.interval.start(), &a.id).cmp(&(b.day_of_week, b.interval.start(), &b.id))
        });
        let mut weekly: BTreeMap<DayOfWeek, Vec<TimetableSlot>> =
            DayOfWeek::ALL.into_iter().map(|day| (day, Vec::new())).collect();
        for slot in &flat {
            weekly.entry(slot.day_of_week).or_default().push(slot.clone());
        }
        Self { weekly, flat }
    }
}

/// Joins an entry with its directory records. A dangling reference is `NotFound`.
pub fn join_slot<R>(reader: &R, entry: &TimetableEntry) -> SchedulingResult<TimetableSlot>
where
    R: TimetableReader + ?Sized,
{
    let course = reader
        .course(&entry.course_id)?
        .ok_or_else(|| SchedulingError::not_found(ResourceKind::Course, &entry.course_id))?;
    let lecturer = reader
        .lecturer(&entry.lecturer_id)?
        .ok_or_else(|| SchedulingError::not_found(ResourceKind::Lecturer, &entry.lecturer_id))?;
    let hall = reader
        .hall(&entry.hall_id)?
        .ok_or_else(|| SchedulingError::not_found(ResourceKind::Hall, &entry.hall_id))?;
    let group = reader
        .group(&entry.group_id)?
        .ok_or_else(|| SchedulingError::not_found(ResourceKind::Group, &entry.group_id))?;
    Ok(TimetableSlot {
        id: entry.id.clone(),
        day_of_week: entry.day_of_week,
        interval: entry.interval,
        semester: entry.semester,
        year: entry.year,
        course,
        lecturer,
        hall: hall.summary(),
        group: group.summary(),
    })
}

/// Entries for every group the student belongs to. A student in no group
/// gets an empty week.
pub fn student_timetable<R>(reader: &R, student_id: &str) -> SchedulingResult<UserTimetable>
where
    R: TimetableReader + ?Sized,
{
    let group_ids = reader.student_group_ids(student_id)?;
    if group_ids.is_empty() {
        return Ok(UserTimetable::from_slots(Vec::new()));
    }
    let filter = EntryFilter {
        group_ids,
        ..EntryFilter::default()
    };
    let mut seen = HashSet::new();
    let slots = reader
        .list_active_entries(&filter)?
        .iter()
        .filter(|entry| seen.insert(entry.id.clone()))
        .map(|entry| join_slot(reader, entry))
        .collect::<SchedulingResult<Vec<_>>>()?;
    Ok(UserTimetable::from_slots(slots))
}

pub fn lecturer_timetable<R>(reader: &R, lecturer_id: &str) -> SchedulingResult<UserTimetable>
where
    R: TimetableReader + ?Sized,
{
    let filter = EntryFilter {
        lecturer_id: Some(lecturer_id.to_string()),
        ..EntryFilter::default()
    };
    let slots = reader
        .list_active_entries(&filter)?
        .iter()
        .map(|entry| join_slot(reader, entry))
        .collect::<SchedulingResult<Vec<_>>>()?;
    Ok(UserTimetable::from_slots(slots))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// "My timetable" reads served through the result cache.
#[derive(Clone)]
pub struct TimetableService {
    store: Arc<dyn TimetableStore>,
    cache: Arc<ResultCache<UserTimetable>>,
}

impl TimetableService {
    pub fn new(store: Arc<dyn TimetableStore>, cache: Arc<ResultCache<UserTimetable>>) -> Self {
        Self { store, cache }
    }

    pub fn cache(&self) -> &Arc<ResultCache<UserTimetable>> {
        &self.cache
    }

    pub fn timetable_for(
        &self,
        role: Role,
        subject: &str,
    ) -> SchedulingResult<(UserTimetable, CacheStatus)> {
        let key = CacheKey::new(role, subject);
        let store = self.store.as_ref();
        let (timetable, hit) = self.cache.get_or_insert_with(key, || match role {
            Role::Student => student_timetable(store, subject),
            Role::Lecturer => {
                if store.lecturer(subject)?.is_none() {
                    return Err(SchedulingError::not_found(ResourceKind::Lecturer, subject));
                }
                lecturer_timetable(store, subject)
            }
        })?;
        let status = if hit { CacheStatus::Hit } else { CacheStatus::Miss };
        Ok((timetable, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Course, GroupSummary, HallSummary, Lecturer};
    use crate::time::TimeInterval;

    fn slot(id: &str, day: DayOfWeek, start: &str, end: &str) -> TimetableSlot {
        TimetableSlot {
            id: id.into(),
            day_of_week: day,
            interval: TimeInterval::parse(start, end).unwrap(),
            semester: 1,
            year: 2026,
            course: Course::new("c1", "CS101", "Programming I"),
            lecturer: Lecturer::new("l1", "Kumara", "Perera", "kumara@uni.lk"),
            hall: HallSummary {
                id: "h1".into(),
                name: "Lab 1".into(),
                building: "Computing Block".into(),
                capacity: 40,
            },
            group: GroupSummary {
                id: "g1".into(),
                name: "CS-Y1".into(),
                batch_year: 2026,
            },
        }
    }

    #[test]
    fn week_has_all_days_sorted_by_start() {
        let timetable = UserTimetable::from_slots(vec![
            slot("b", DayOfWeek::Tuesday, "13:00", "14:00"),
            slot("a", DayOfWeek::Tuesday, "09:00", "10:00"),
            slot("c", DayOfWeek::Monday, "11:00", "12:00"),
        ]);
        assert_eq!(timetable.weekly.len(), 7);
        assert!(timetable.weekly[&DayOfWeek::Sunday].is_empty());
        let tuesday: Vec<_> = timetable.weekly[&DayOfWeek::Tuesday]
            .iter()
            .map(|slot| slot.id.as_str())
            .collect();
        assert_eq!(tuesday, vec!["a", "b"]);
        assert_eq!(timetable.flat[0].id, "c");
    }
}
