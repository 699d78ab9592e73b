use super::{
    DirectoryWriter, EntryFilter, EntryTransaction, HallFilter, StoreError, StoreResult,
    TimetableReader, TimetableStore, new_entry_id, sort_entries,
};
use crate::calendar::DateRange;
use crate::error::SchedulingResult;
use crate::model::{
    Appointment, AppointmentStatus, Course, EntryFields, Hall, Lecturer, StudentGroup,
    TimetableEntry,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct MemoryState {
    entries: EntryMap,
    halls: BTreeMap<String, Hall>,
    courses: BTreeMap<String, Course>,
    lecturers: BTreeMap<String, Lecturer>,
    groups: BTreeMap<String, StudentGroup>,
    appointments: BTreeMap<String, Appointment>,
}

/// Process-local store for development and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry without conflict checks. Fixture loading only.
    pub fn insert_entry_unchecked(&self, entry: TimetableEntry) {
        self.state.write().entries.insert(entry.id.clone(), entry);
    }

    pub fn entry_count(&self) -> usize {
        self.state.read().entries.len()
    }
}

type EntryMap = BTreeMap<String, TimetableEntry>;

fn list_matching(entries: &EntryMap, filter: &EntryFilter) -> Vec<TimetableEntry> {
    let mut matching: Vec<TimetableEntry> = entries
        .values()
        .filter(|entry| filter.matches(entry))
        .cloned()
        .collect();
    sort_entries(&mut matching);
    matching
}

impl TimetableReader for MemoryState {
    fn list_active_entries(&self, filter: &EntryFilter) -> StoreResult<Vec<TimetableEntry>> {
        Ok(list_matching(&self.entries, filter))
    }

    fn entry(&self, id: &str) -> StoreResult<Option<TimetableEntry>> {
        Ok(self.entries.get(id).cloned())
    }

    fn hall(&self, id: &str) -> StoreResult<Option<Hall>> {
        Ok(self.halls.get(id).cloned())
    }

    fn list_halls(&self, filter: &HallFilter) -> StoreResult<Vec<Hall>> {
        let mut halls: Vec<Hall> = self
            .halls
            .values()
            .filter(|hall| filter.matches(hall))
            .cloned()
            .collect();
        halls.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(halls)
    }

    fn course(&self, id: &str) -> StoreResult<Option<Course>> {
        Ok(self.courses.get(id).cloned())
    }

    fn list_courses(&self) -> StoreResult<Vec<Course>> {
        Ok(self.courses.values().cloned().collect())
    }

    fn lecturer(&self, id: &str) -> StoreResult<Option<Lecturer>> {
        Ok(self.lecturers.get(id).cloned())
    }

    fn list_lecturers(&self) -> StoreResult<Vec<Lecturer>> {
        Ok(self.lecturers.values().cloned().collect())
    }

    fn group(&self, id: &str) -> StoreResult<Option<StudentGroup>> {
        Ok(self.groups.get(id).cloned())
    }

    fn list_groups(&self) -> StoreResult<Vec<StudentGroup>> {
        Ok(self.groups.values().cloned().collect())
    }

    fn student_group_ids(&self, student_id: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .groups
            .values()
            .filter(|group| group.member_ids.iter().any(|member| member == student_id))
            .map(|group| group.id.clone())
            .collect())
    }

    fn list_appointments(
        &self,
        lecturer_id: &str,
        statuses: &[AppointmentStatus],
        range: DateRange,
    ) -> StoreResult<Vec<Appointment>> {
        let mut appointments: Vec<Appointment> = self
            .appointments
            .values()
            .filter(|appt| {
                appt.lecturer_id == lecturer_id
                    && statuses.contains(&appt.status)
                    && range.contains(appt.date_time)
            })
            .cloned()
            .collect();
        appointments.sort_by(|a, b| a.date_time.cmp(&b.date_time).then_with(|| a.id.cmp(&b.id)));
        Ok(appointments)
    }
}

/// Write view: mutations land on a copy of the entry map only; directory
/// records are read straight from the locked state.
struct MemoryTransaction<'a> {
    base: &'a MemoryState,
    entries: EntryMap,
}

impl TimetableReader for MemoryTransaction<'_> {
    fn list_active_entries(&self, filter: &EntryFilter) -> StoreResult<Vec<TimetableEntry>> {
        Ok(list_matching(&self.entries, filter))
    }

    fn entry(&self, id: &str) -> StoreResult<Option<TimetableEntry>> {
        Ok(self.entries.get(id).cloned())
    }

    fn hall(&self, id: &str) -> StoreResult<Option<Hall>> {
        self.base.hall(id)
    }

    fn list_halls(&self, filter: &HallFilter) -> StoreResult<Vec<Hall>> {
        self.base.list_halls(filter)
    }

    fn course(&self, id: &str) -> StoreResult<Option<Course>> {
        self.base.course(id)
    }

    fn list_courses(&self) -> StoreResult<Vec<Course>> {
        self.base.list_courses()
    }

    fn lecturer(&self, id: &str) -> StoreResult<Option<Lecturer>> {
        self.base.lecturer(id)
    }

    fn list_lecturers(&self) -> StoreResult<Vec<Lecturer>> {
        self.base.list_lecturers()
    }

    fn group(&self, id: &str) -> StoreResult<Option<StudentGroup>> {
        self.base.group(id)
    }

    fn list_groups(&self) -> StoreResult<Vec<StudentGroup>> {
        self.base.list_groups()
    }

    fn student_group_ids(&self, student_id: &str) -> StoreResult<Vec<String>> {
        self.base.student_group_ids(student_id)
    }

    fn list_appointments(
        &self,
        lecturer_id: &str,
        statuses: &[AppointmentStatus],
        range: DateRange,
    ) -> StoreResult<Vec<Appointment>> {
        self.base.list_appointments(lecturer_id, statuses, range)
    }
}

impl EntryTransaction for MemoryTransaction<'_> {
    fn insert_entry(&mut self, fields: EntryFields) -> StoreResult<TimetableEntry> {
        let entry = TimetableEntry::from_fields(new_entry_id(), fields);
        self.entries.insert(entry.id.clone(), entry.clone());
        Ok(entry)
    }

    fn update_entry(&mut self, id: &str, fields: EntryFields) -> StoreResult<TimetableEntry> {
        let Some(slot) = self.entries.get_mut(id) else {
            return Err(StoreError::InvalidData(format!(
                "timetable entry {id} vanished during update"
            )));
        };
        *slot = TimetableEntry::from_fields(id, fields);
        Ok(slot.clone())
    }

    fn delete_entry(&mut self, id: &str) -> StoreResult<bool> {
        Ok(self.entries.remove(id).is_some())
    }
}

impl TimetableReader for MemoryStore {
    fn list_active_entries(&self, filter: &EntryFilter) -> StoreResult<Vec<TimetableEntry>> {
        self.state.read().list_active_entries(filter)
    }

    fn entry(&self, id: &str) -> StoreResult<Option<TimetableEntry>> {
        self.state.read().entry(id)
    }

    fn hall(&self, id: &str) -> StoreResult<Option<Hall>> {
        self.state.read().hall(id)
    }

    fn list_halls(&self, filter: &HallFilter) -> StoreResult<Vec<Hall>> {
        self.state.read().list_halls(filter)
    }

    fn course(&self, id: &str) -> StoreResult<Option<Course>> {
        self.state.read().course(id)
    }

    fn list_courses(&self) -> StoreResult<Vec<Course>> {
        self.state.read().list_courses()
    }

    fn lecturer(&self, id: &str) -> StoreResult<Option<Lecturer>> {
        self.state.read().lecturer(id)
    }

    fn list_lecturers(&self) -> StoreResult<Vec<Lecturer>> {
        self.state.read().list_lecturers()
    }

    fn group(&self, id: &str) -> StoreResult<Option<StudentGroup>> {
        self.state.read().group(id)
    }

    fn list_groups(&self) -> StoreResult<Vec<StudentGroup>> {
        self.state.read().list_groups()
    }

    fn student_group_ids(&self, student_id: &str) -> StoreResult<Vec<String>> {
        self.state.read().student_group_ids(student_id)
    }

    fn list_appointments(
        &self,
        lecturer_id: &str,
        statuses: &[AppointmentStatus],
        range: DateRange,
    ) -> StoreResult<Vec<Appointment>> {
        self.state
            .read()
            .list_appointments(lecturer_id, statuses, range)
    }
}

impl TimetableStore for MemoryStore {
    fn write(
        &self,
        op: &mut dyn FnMut(&mut dyn EntryTransaction) -> SchedulingResult<()>,
    ) -> SchedulingResult<()> {
        // The write guard is held across check and commit; readers wait.
        let mut guard = self.state.write();
        let mut tx = MemoryTransaction {
            entries: guard.entries.clone(),
            base: &guard,
        };
        op(&mut tx)?;
        let MemoryTransaction { entries, .. } = tx;
        guard.entries = entries;
        Ok(())
    }
}

impl DirectoryWriter for MemoryStore {
    fn upsert_hall(&self, hall: Hall) -> StoreResult<()> {
        self.state.write().halls.insert(hall.id.clone(), hall);
        Ok(())
    }

    fn upsert_course(&self, course: Course) -> StoreResult<()> {
        self.state.write().courses.insert(course.id.clone(), course);
        Ok(())
    }

    fn upsert_lecturer(&self, lecturer: Lecturer) -> StoreResult<()> {
        self.state
            .write()
            .lecturers
            .insert(lecturer.id.clone(), lecturer);
        Ok(())
    }

    fn upsert_group(&self, group: StudentGroup) -> StoreResult<()> {
        self.state.write().groups.insert(group.id.clone(), group);
        Ok(())
    }

    fn upsert_appointment(&self, appointment: Appointment) -> StoreResult<()> {
        self.state
            .write()
            .appointments
            .insert(appointment.id.clone(), appointment);
        Ok(())
    }
}
