use crate::calendar::DayOfWeek;
use crate::time::{TimeInterval, TimeOfDay};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_SEMESTER: u32 = 1;
pub const DEFAULT_YEAR: i32 = 2026;

/// A recurring weekly slot binding a course to a hall, lecturer and group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableEntry {
    pub id: String,
    pub day_of_week: DayOfWeek,
    #[serde(flatten)]
    pub interval: TimeInterval,
    pub semester: u32,
    pub year: i32,
    pub course_id: String,
    pub lecturer_id: String,
    pub hall_id: String,
    pub group_id: String,
    pub is_active: bool,
}

impl TimetableEntry {
    pub fn from_fields(id: impl Into<String>, fields: EntryFields) -> Self {
        Self {
            id: id.into(),
            day_of_week: fields.day_of_week,
            interval: fields.interval,
            semester: fields.semester,
            year: fields.year,
            course_id: fields.course_id,
            lecturer_id: fields.lecturer_id,
            hall_id: fields.hall_id,
            group_id: fields.group_id,
            is_active: fields.is_active,
        }
    }

    pub fn fields(&self) -> EntryFields {
        EntryFields {
            day_of_week: self.day_of_week,
            interval: self.interval,
            semester: self.semester,
            year: self.year,
            course_id: self.course_id.clone(),
            lecturer_id: self.lecturer_id.clone(),
            hall_id: self.hall_id.clone(),
            group_id: self.group_id.clone(),
            is_active: self.is_active,
        }
    }
}

/// Validated content of a timetable entry, minus its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFields {
    pub day_of_week: DayOfWeek,
    pub interval: TimeInterval,
    pub semester: u32,
    pub year: i32,
    pub course_id: String,
    pub lecturer_id: String,
    pub hall_id: String,
    pub group_id: String,
    pub is_active: bool,
}

impl EntryFields {
    pub fn new(
        day_of_week: DayOfWeek,
        interval: TimeInterval,
        course_id: impl Into<String>,
        lecturer_id: impl Into<String>,
        hall_id: impl Into<String>,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            day_of_week,
            interval,
            semester: DEFAULT_SEMESTER,
            year: DEFAULT_YEAR,
            course_id: course_id.into(),
            lecturer_id: lecturer_id.into(),
            hall_id: hall_id.into(),
            group_id: group_id.into(),
            is_active: true,
        }
    }

    pub fn candidate(&self) -> CandidateSlot {
        CandidateSlot {
            day: self.day_of_week,
            interval: self.interval,
            hall_id: self.hall_id.clone(),
            lecturer_id: self.lecturer_id.clone(),
            group_id: self.group_id.clone(),
        }
    }
}

/// Unvalidated entry payload as it arrives from a caller. Used both for
/// creation (every scheduling field required) and for partial updates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semester: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lecturer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hall_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

/// The resources and time a proposed entry would occupy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSlot {
    pub day: DayOfWeek,
    #[serde(flatten)]
    pub interval: TimeInterval,
    pub hall_id: String,
    pub lecturer_id: String,
    pub group_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hall {
    pub id: String,
    pub name: String,
    pub building: String,
    pub floor: i32,
    pub capacity: u32,
    #[serde(default)]
    pub equipment: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl Hall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        building: impl Into<String>,
        capacity: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            building: building.into(),
            floor: 0,
            capacity,
            equipment: Vec::new(),
            is_active: true,
        }
    }

    pub fn with_equipment<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.equipment = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn summary(&self) -> HallSummary {
        HallSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            building: self.building.clone(),
            capacity: self.capacity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HallSummary {
    pub id: String,
    pub name: String,
    pub building: String,
    pub capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub name: String,
    pub code: String,
}

impl Course {
    pub fn new(id: impl Into<String>, code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            code: code.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lecturer {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl Lecturer {
    pub fn new(
        id: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentGroup {
    pub id: String,
    pub name: String,
    pub batch_year: i32,
    #[serde(default)]
    pub member_ids: Vec<String>,
}

impl StudentGroup {
    pub fn new(id: impl Into<String>, name: impl Into<String>, batch_year: i32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            batch_year,
            member_ids: Vec::new(),
        }
    }

    pub fn with_members<I, S>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.member_ids = members.into_iter().map(Into::into).collect();
        self
    }

    pub fn summary(&self) -> GroupSummary {
        GroupSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            batch_year: self.batch_year,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub id: String,
    pub name: String,
    pub batch_year: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AppointmentStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    /// Statuses whose appointments block the lecturer's time.
    pub const OCCUPYING: [AppointmentStatus; 2] =
        [AppointmentStatus::Accepted, AppointmentStatus::Pending];

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "PENDING",
            AppointmentStatus::Accepted => "ACCEPTED",
            AppointmentStatus::Rejected => "REJECTED",
            AppointmentStatus::Completed => "COMPLETED",
            AppointmentStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [
            AppointmentStatus::Pending,
            AppointmentStatus::Accepted,
            AppointmentStatus::Rejected,
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
        ]
        .into_iter()
        .find(|status| status.as_str().eq_ignore_ascii_case(value.trim()))
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A calendar-dated meeting between a lecturer and a student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub lecturer_id: String,
    pub date_time: NaiveDateTime,
    pub duration_minutes: u32,
    pub status: AppointmentStatus,
    pub counterpart_name: String,
}

impl Appointment {
    /// Occupied time of day, clamped to 23:59. `None` for zero-length appointments.
    pub fn interval(&self) -> Option<TimeInterval> {
        let start = TimeOfDay::from_naive_time(self.date_time.time());
        let end = start.saturating_add_minutes(self.duration_minutes);
        TimeInterval::new(start, end).ok()
    }
}

/// A timetable entry joined with its course, lecturer, hall and group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableSlot {
    pub id: String,
    pub day_of_week: DayOfWeek,
    #[serde(flatten)]
    pub interval: TimeInterval,
    pub semester: u32,
    pub year: i32,
    pub course: Course,
    pub lecturer: Lecturer,
    pub hall: HallSummary,
    pub group: GroupSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeachingSlot {
    #[serde(flatten)]
    pub interval: TimeInterval,
    pub course: Course,
    pub lecturer: Lecturer,
    pub hall: HallSummary,
    pub group: GroupSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentSlot {
    pub id: String,
    #[serde(flatten)]
    pub interval: TimeInterval,
    pub status: AppointmentStatus,
    pub counterpart_name: String,
}

/// Occupied time for a resource, built from stored records at query time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleEvent {
    Teaching(TeachingSlot),
    Appointment(AppointmentSlot),
}

impl ScheduleEvent {
    pub fn interval(&self) -> TimeInterval {
        match self {
            ScheduleEvent::Teaching(slot) => slot.interval,
            ScheduleEvent::Appointment(slot) => slot.interval,
        }
    }
}

impl From<TimetableSlot> for TeachingSlot {
    fn from(slot: TimetableSlot) -> Self {
        Self {
            interval: slot.interval,
            course: slot.course,
            lecturer: slot.lecturer,
            hall: slot.hall,
            group: slot.group,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn appointment(hour: u32, minute: u32, duration: u32) -> Appointment {
        Appointment {
            id: "appt-1".into(),
            lecturer_id: "lec-1".into(),
            date_time: NaiveDate::from_ymd_opt(2026, 10, 20)
                .unwrap()
                .and_hms_opt(hour, minute, 0)
                .unwrap(),
            duration_minutes: duration,
            status: AppointmentStatus::Pending,
            counterpart_name: "Ama Silva".into(),
        }
    }

    #[test]
    fn appointment_interval_derived_from_start_and_duration() {
        let interval = appointment(14, 30, 45).interval().unwrap();
        assert_eq!(interval, TimeInterval::parse("14:30", "15:15").unwrap());
    }

    #[test]
    fn appointment_interval_clamped_at_midnight() {
        let interval = appointment(23, 30, 90).interval().unwrap();
        assert_eq!(interval.end(), TimeOfDay::LAST_MINUTE);
        assert!(appointment(10, 0, 0).interval().is_none());
    }

    #[test]
    fn entry_serializes_with_camel_case_and_hh_mm() {
        let fields = EntryFields::new(
            DayOfWeek::Monday,
            TimeInterval::parse("09:00", "10:00").unwrap(),
            "c1",
            "l1",
            "h1",
            "g1",
        );
        let entry = TimetableEntry::from_fields("e1", fields);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["dayOfWeek"], "MONDAY");
        assert_eq!(json["startTime"], "09:00");
        assert_eq!(json["endTime"], "10:00");
        assert_eq!(json["isActive"], true);
        assert_eq!(json["year"], DEFAULT_YEAR);
    }

    #[test]
    fn status_parse_is_case_insensitive() {
        assert_eq!(
            AppointmentStatus::parse("accepted"),
            Some(AppointmentStatus::Accepted)
        );
        assert_eq!(AppointmentStatus::parse("maybe"), None);
    }
}
