use crate::calendar::{DateRange, DayOfWeek};
use crate::error::SchedulingResult;
use crate::model::{
    Appointment, AppointmentStatus, Course, EntryFields, Hall, Lecturer, StudentGroup,
    TimetableEntry,
};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("database error: {0}")]
    Database(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid data: {0}")]
    InvalidData(String),
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Database(Box::new(value))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Selects active timetable entries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub day: Option<DayOfWeek>,
    pub hall_id: Option<String>,
    pub lecturer_id: Option<String>,
    /// Entry must belong to one of these groups when non-empty.
    pub group_ids: Vec<String>,
    pub course_id: Option<String>,
    pub semester: Option<u32>,
    pub year: Option<i32>,
    pub exclude_id: Option<String>,
}

impl EntryFilter {
    pub fn for_day(day: DayOfWeek) -> Self {
        Self {
            day: Some(day),
            ..Self::default()
        }
    }

    pub fn excluding(mut self, id: Option<&str>) -> Self {
        self.exclude_id = id.map(str::to_string);
        self
    }

    pub fn matches(&self, entry: &TimetableEntry) -> bool {
        entry.is_active
            && self.day.is_none_or(|day| entry.day_of_week == day)
            && self.hall_id.as_ref().is_none_or(|id| &entry.hall_id == id)
            && self
                .lecturer_id
                .as_ref()
                .is_none_or(|id| &entry.lecturer_id == id)
            && (self.group_ids.is_empty() || self.group_ids.contains(&entry.group_id))
            && self.course_id.as_ref().is_none_or(|id| &entry.course_id == id)
            && self.semester.is_none_or(|semester| entry.semester == semester)
            && self.year.is_none_or(|year| entry.year == year)
            && self.exclude_id.as_ref().is_none_or(|id| &entry.id != id)
    }
}

/// Orders entries the way every store returns them: day, then start time.
pub fn sort_entries(entries: &mut [TimetableEntry]) {
    entries.sort_by(|a, b| {
        (a.day_of_week, a.interval.start(), a.interval.end(), &a.id).cmp(&(
            b.day_of_week,
            b.interval.start(),
            b.interval.end(),
            &b.id,
        ))
    });
}

/// Static hall attributes filtered before any schedule computation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HallFilter {
    pub include_inactive: bool,
    pub min_capacity: Option<u32>,
    /// Case-insensitive building name.
    pub building: Option<String>,
}

impl HallFilter {
    pub fn active() -> Self {
        Self::default()
    }

    pub fn matches(&self, hall: &Hall) -> bool {
        (self.include_inactive || hall.is_active)
            && self.min_capacity.is_none_or(|min| hall.capacity >= min)
            && self
                .building
                .as_ref()
                .is_none_or(|building| hall.building.to_lowercase() == building.to_lowercase())
    }
}

/// Read side of the storage collaborator.
pub trait TimetableReader {
    /// Active entries matching `filter`, ordered by day then start time.
    fn list_active_entries(&self, filter: &EntryFilter) -> StoreResult<Vec<TimetableEntry>>;
    fn entry(&self, id: &str) -> StoreResult<Option<TimetableEntry>>;
    fn hall(&self, id: &str) -> StoreResult<Option<Hall>>;
    /// Halls matching `filter`, ordered by name.
    fn list_halls(&self, filter: &HallFilter) -> StoreResult<Vec<Hall>>;
    fn course(&self, id: &str) -> StoreResult<Option<Course>>;
    fn list_courses(&self) -> StoreResult<Vec<Course>>;
    fn lecturer(&self, id: &str) -> StoreResult<Option<Lecturer>>;
    fn list_lecturers(&self) -> StoreResult<Vec<Lecturer>>;
    fn group(&self, id: &str) -> StoreResult<Option<StudentGroup>>;
    fn list_groups(&self) -> StoreResult<Vec<StudentGroup>>;
    fn student_group_ids(&self, student_id: &str) -> StoreResult<Vec<String>>;
    /// Appointments for a lecturer with one of `statuses`, dated within `range`, ordered by time.
    fn list_appointments(
        &self,
        lecturer_id: &str,
        statuses: &[AppointmentStatus],
        range: DateRange,
    ) -> StoreResult<Vec<Appointment>>;
}

/// Mutations available inside a store transaction.
pub trait EntryTransaction: TimetableReader {
    fn insert_entry(&mut self, fields: EntryFields) -> StoreResult<TimetableEntry>;
    fn update_entry(&mut self, id: &str, fields: EntryFields) -> StoreResult<TimetableEntry>;
    fn delete_entry(&mut self, id: &str) -> StoreResult<bool>;
}

/// Entry store. `write` runs `op` atomically: reads made through the
/// transaction see a snapshot no concurrent write can change before commit,
/// and an `Err` from `op` discards every mutation it made.
pub trait TimetableStore: TimetableReader + Send + Sync {
    fn write(
        &self,
        op: &mut dyn FnMut(&mut dyn EntryTransaction) -> SchedulingResult<()>,
    ) -> SchedulingResult<()>;
}

/// Directory records referenced by timetable entries. Used to seed stores.
pub trait DirectoryWriter {
    fn upsert_hall(&self, hall: Hall) -> StoreResult<()>;
    fn upsert_course(&self, course: Course) -> StoreResult<()>;
    fn upsert_lecturer(&self, lecturer: Lecturer) -> StoreResult<()>;
    fn upsert_group(&self, group: StudentGroup) -> StoreResult<()>;
    fn upsert_appointment(&self, appointment: Appointment) -> StoreResult<()>;
}

pub(crate) fn new_entry_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub mod file;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file::{
    TimetableCsvRecord, load_timetable_csv, read_timetable_csv, write_timetable_csv,
};
pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
