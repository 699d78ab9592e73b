use crate::calendar::{DateRange, DayOfWeek, approximate_current_week};
use crate::clock::Clock;
use crate::error::{ResourceKind, SchedulingError, SchedulingResult};
use crate::interval::{FreeSlot, free_slots};
use crate::model::{
    AppointmentSlot, AppointmentStatus, Hall, Lecturer, ScheduleEvent, TeachingSlot,
    TimetableEntry, TimetableSlot,
};
use crate::persistence::{EntryFilter, HallFilter, TimetableReader, TimetableStore};
use crate::time::{TimeInterval, TimeOfDay};
use crate::timetable::join_slot;
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HallDaySchedule {
    pub hall: Hall,
    pub day: DayOfWeek,
    pub occupied: Vec<TimetableSlot>,
    pub free_slots: Vec<FreeSlot>,
}

/// Validated hall search. Static attributes are filtered before any schedule work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HallSearchQuery {
    pub day: DayOfWeek,
    /// Slots must fully contain this window to match.
    pub window: Option<TimeInterval>,
    pub min_capacity: Option<u32>,
    pub building: Option<String>,
    pub equipment: Vec<String>,
}

impl HallSearchQuery {
    pub fn for_day(day: DayOfWeek) -> Self {
        Self {
            day,
            window: None,
            min_capacity: None,
            building: None,
            equipment: Vec::new(),
        }
    }

    fn hall_filter(&self) -> HallFilter {
        HallFilter {
            include_inactive: false,
            min_capacity: self.min_capacity,
            building: self.building.clone(),
        }
    }

    fn has_equipment(&self, hall: &Hall) -> bool {
        self.equipment.iter().all(|wanted| {
            let wanted = wanted.to_lowercase();
            hall.equipment
                .iter()
                .any(|item| item.to_lowercase().contains(&wanted))
        })
    }
}

/// Raw hall search parameters as a caller sends them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HallSearchParams {
    pub day: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub min_capacity: Option<String>,
    pub building: Option<String>,
    /// Comma separated.
    pub equipment: Option<String>,
}

impl HallSearchParams {
    /// Lenient conversion: anything unparseable is dropped instead of rejected,
    /// and a missing or unknown day means `today`.
    pub fn into_query(self, today: DayOfWeek) -> HallSearchQuery {
        let day = self
            .day
            .as_deref()
            .and_then(|day| day.parse().ok())
            .unwrap_or(today);
        let window = match (self.start_time.as_deref(), self.end_time.as_deref()) {
            (Some(start), Some(end)) => TimeInterval::parse(start.trim(), end.trim()).ok(),
            _ => None,
        };
        let min_capacity = self
            .min_capacity
            .as_deref()
            .and_then(|value| value.trim().parse().ok());
        let building = self
            .building
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let equipment = self
            .equipment
            .as_deref()
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        HallSearchQuery {
            day,
            window,
            min_capacity,
            building,
            equipment,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HallAvailability {
    pub hall: Hall,
    pub free_slots: Vec<FreeSlot>,
    pub matching_free_slots: Vec<FreeSlot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableNow {
    pub day: DayOfWeek,
    pub time: TimeOfDay,
    pub halls: Vec<HallAvailability>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    pub buildings: Vec<String>,
    pub equipment: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayAvailability {
    pub teaching: Vec<TeachingSlot>,
    pub appointments: Vec<AppointmentSlot>,
    pub free_slots: Vec<FreeSlot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LecturerWeek {
    pub lecturer: Lecturer,
    pub days: BTreeMap<DayOfWeek, DayAvailability>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LecturerDay {
    pub lecturer: Lecturer,
    pub date: NaiveDate,
    pub day: DayOfWeek,
    #[serde(flatten)]
    pub availability: DayAvailability,
}

/// Read-side queries over halls and lecturers.
#[derive(Clone)]
pub struct AvailabilityEngine {
    store: Arc<dyn TimetableStore>,
    clock: Arc<dyn Clock>,
    window: TimeInterval,
}

impl AvailabilityEngine {
    pub fn new(store: Arc<dyn TimetableStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            window: TimeInterval::DEFAULT_WINDOW,
        }
    }

    pub fn with_window(mut self, window: TimeInterval) -> Self {
        self.window = window;
        self
    }

    pub fn window(&self) -> TimeInterval {
        self.window
    }

    pub fn today(&self) -> DayOfWeek {
        DayOfWeek::of(self.clock.now().date())
    }

    /// Occupied and free time for one hall. `hall` is an id, or failing that a
    /// case-insensitive hall name.
    pub fn hall_day_schedule(&self, hall: &str, day: DayOfWeek) -> SchedulingResult<HallDaySchedule> {
        let hall = self.resolve_hall(hall)?;
        let filter = EntryFilter {
            hall_id: Some(hall.id.clone()),
            ..EntryFilter::for_day(day)
        };
        let entries = self.store.list_active_entries(&filter)?;
        let occupied = entries
            .iter()
            .map(|entry| join_slot(self.store.as_ref(), entry))
            .collect::<SchedulingResult<Vec<_>>>()?;
        let intervals: Vec<TimeInterval> = occupied.iter().map(|slot| slot.interval).collect();
        Ok(HallDaySchedule {
            free_slots: free_slots(&intervals, self.window),
            hall,
            day,
            occupied,
        })
    }

    fn resolve_hall(&self, key: &str) -> SchedulingResult<Hall> {
        if let Some(hall) = self.store.hall(key)? {
            return Ok(hall);
        }
        let filter = HallFilter {
            include_inactive: true,
            ..HallFilter::default()
        };
        let wanted = key.trim().to_lowercase();
        self.store
            .list_halls(&filter)?
            .into_iter()
            .find(|hall| hall.name.to_lowercase() == wanted)
            .ok_or_else(|| SchedulingError::not_found(ResourceKind::Hall, key))
    }

    /// Active halls that pass the static filters and have a matching free slot, by name.
    pub fn find_available_halls(&self, query: &HallSearchQuery) -> SchedulingResult<Vec<HallAvailability>> {
        let halls: Vec<Hall> = self
            .store
            .list_halls(&query.hall_filter())?
            .into_iter()
            .filter(|hall| query.has_equipment(hall))
            .collect();
        if halls.is_empty() {
            return Ok(Vec::new());
        }
        let by_hall = self.occupied_by_hall(query.day)?;
        let window = self.window;

        let results = halls
            .into_par_iter()
            .filter_map(|hall| {
                let occupied = by_hall.get(&hall.id).map(Vec::as_slice).unwrap_or_default();
                let free = free_slots(occupied, window);
                let matching: Vec<FreeSlot> = match query.window {
                    Some(wanted) => free
                        .iter()
                        .filter(|slot| slot.interval.contains(&wanted))
                        .copied()
                        .collect(),
                    None => free.clone(),
                };
                (!matching.is_empty()).then_some(HallAvailability {
                    hall,
                    free_slots: free,
                    matching_free_slots: matching,
                })
            })
            .collect();
        Ok(results)
    }

    /// Halls free at the clock's current instant.
    ///
    /// Weekends carry no teaching, so every active hall is reported free for
    /// the whole window.
    pub fn find_available_now(&self) -> SchedulingResult<AvailableNow> {
        let now = self.clock.now();
        let day = DayOfWeek::of(now.date());
        let time = TimeOfDay::from_naive_time(now.time());
        let halls = self.store.list_halls(&HallFilter::active())?;

        if day.is_weekend() {
            let whole_day = vec![FreeSlot::new(self.window)];
            let halls = halls
                .into_iter()
                .map(|hall| HallAvailability {
                    hall,
                    free_slots: whole_day.clone(),
                    matching_free_slots: whole_day.clone(),
                })
                .collect();
            return Ok(AvailableNow { day, time, halls });
        }

        let by_hall = self.occupied_by_hall(day)?;
        let window = self.window;
        let halls = halls
            .into_par_iter()
            .filter_map(|hall| {
                let occupied = by_hall.get(&hall.id).map(Vec::as_slice).unwrap_or_default();
                if occupied.iter().any(|interval| interval.contains_instant(time)) {
                    return None;
                }
                let free = free_slots(occupied, window);
                let matching = match free.iter().find(|slot| slot.interval.contains_instant(time)) {
                    Some(current) => vec![*current],
                    None => free.clone(),
                };
                Some(HallAvailability {
                    hall,
                    free_slots: free,
                    matching_free_slots: matching,
                })
            })
            .collect();
        Ok(AvailableNow { day, time, halls })
    }

    /// Distinct buildings and equipment items across active halls, sorted.
    pub fn filter_options(&self) -> SchedulingResult<FilterOptions> {
        let mut buildings = BTreeSet::new();
        let mut equipment = BTreeSet::new();
        for hall in self.store.list_halls(&HallFilter::active())? {
            buildings.insert(hall.building);
            equipment.extend(hall.equipment);
        }
        Ok(FilterOptions {
            buildings: buildings.into_iter().collect(),
            equipment: equipment.into_iter().collect(),
        })
    }

    /// Free time Monday to Friday from the teaching template merged with this
    /// week's pending and accepted appointments.
    pub fn lecturer_weekly_availability(&self, lecturer_id: &str) -> SchedulingResult<LecturerWeek> {
        let lecturer = self.lecturer(lecturer_id)?;
        let today = self.clock.now().date();
        let mut appointments = appointments_for_week(self.store.as_ref(), lecturer_id, today)?;

        let mut days = BTreeMap::new();
        for day in DayOfWeek::ACADEMIC_WEEK {
            let dated = appointments.remove(&day).unwrap_or_default();
            days.insert(day, self.lecturer_day(lecturer_id, day, dated)?);
        }
        Ok(LecturerWeek { lecturer, days })
    }

    /// Availability on one calendar date. Appointments are bounded to that date.
    pub fn lecturer_date_availability(
        &self,
        lecturer_id: &str,
        date: NaiveDate,
    ) -> SchedulingResult<LecturerDay> {
        let lecturer = self.lecturer(lecturer_id)?;
        let day = DayOfWeek::of(date);
        let appointments = appointment_slots(self.store.as_ref(), lecturer_id, DateRange::day(date))?
            .into_iter()
            .map(|(_, slot)| slot)
            .collect();
        Ok(LecturerDay {
            availability: self.lecturer_day(lecturer_id, day, appointments)?,
            lecturer,
            date,
            day,
        })
    }

    fn lecturer(&self, id: &str) -> SchedulingResult<Lecturer> {
        self.store
            .lecturer(id)?
            .ok_or_else(|| SchedulingError::not_found(ResourceKind::Lecturer, id))
    }

    fn lecturer_day(
        &self,
        lecturer_id: &str,
        day: DayOfWeek,
        appointments: Vec<AppointmentSlot>,
    ) -> SchedulingResult<DayAvailability> {
        let filter = EntryFilter {
            lecturer_id: Some(lecturer_id.to_string()),
            ..EntryFilter::for_day(day)
        };
        let mut events = Vec::new();
        for entry in self.store.list_active_entries(&filter)? {
            let slot = join_slot(self.store.as_ref(), &entry)?;
            events.push(ScheduleEvent::Teaching(slot.into()));
        }
        events.extend(appointments.into_iter().map(ScheduleEvent::Appointment));

        let occupied: Vec<TimeInterval> = events.iter().map(ScheduleEvent::interval).collect();
        let mut availability = DayAvailability {
            free_slots: free_slots(&occupied, self.window),
            ..DayAvailability::default()
        };
        for event in events {
            match event {
                ScheduleEvent::Teaching(slot) => availability.teaching.push(slot),
                ScheduleEvent::Appointment(slot) => availability.appointments.push(slot),
            }
        }
        Ok(availability)
    }

    fn occupied_by_hall(&self, day: DayOfWeek) -> SchedulingResult<HashMap<String, Vec<TimeInterval>>> {
        let entries = self.store.list_active_entries(&EntryFilter::for_day(day))?;
        Ok(group_by_hall(entries))
    }
}

fn group_by_hall(entries: Vec<TimetableEntry>) -> HashMap<String, Vec<TimeInterval>> {
    let mut by_hall: HashMap<String, Vec<TimeInterval>> = HashMap::new();
    for entry in entries {
        by_hall.entry(entry.hall_id).or_default().push(entry.interval);
    }
    by_hall
}

/// This week's occupying appointments for a lecturer, bucketed by weekday.
///
/// "This week" is [`approximate_current_week`]; callers merge the result with
/// the recurring teaching template.
pub fn appointments_for_week<R>(
    reader: &R,
    lecturer_id: &str,
    today: NaiveDate,
) -> SchedulingResult<BTreeMap<DayOfWeek, Vec<AppointmentSlot>>>
where
    R: TimetableReader + ?Sized,
{
    let mut by_day: BTreeMap<DayOfWeek, Vec<AppointmentSlot>> = BTreeMap::new();
    for (day, slot) in appointment_slots(reader, lecturer_id, approximate_current_week(today))? {
        by_day.entry(day).or_default().push(slot);
    }
    Ok(by_day)
}

fn appointment_slots<R>(
    reader: &R,
    lecturer_id: &str,
    range: DateRange,
) -> SchedulingResult<Vec<(DayOfWeek, AppointmentSlot)>>
where
    R: TimetableReader + ?Sized,
{
    let appointments =
        reader.list_appointments(lecturer_id, &AppointmentStatus::OCCUPYING, range)?;
    Ok(appointments
        .into_iter()
        .filter_map(|appointment| {
            let interval = appointment.interval()?;
            Some((
                DayOfWeek::of(appointment.date_time.date()),
                AppointmentSlot {
                    id: appointment.id,
                    interval,
                    status: appointment.status,
                    counterpart_name: appointment.counterpart_name,
                },
            ))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_fall_back_to_permissive_defaults() {
        let params = HallSearchParams {
            day: Some("someday".into()),
            start_time: Some("10:00".into()),
            end_time: Some("09:00".into()),
            min_capacity: Some("lots".into()),
            building: Some("  ".into()),
            equipment: Some("projector, ,Computers".into()),
        };
        let query = params.into_query(DayOfWeek::Wednesday);
        assert_eq!(query.day, DayOfWeek::Wednesday);
        assert_eq!(query.window, None);
        assert_eq!(query.min_capacity, None);
        assert_eq!(query.building, None);
        assert_eq!(query.equipment, vec!["projector", "Computers"]);
    }

    #[test]
    fn single_bound_is_not_a_window() {
        let params = HallSearchParams {
            day: Some("tuesday".into()),
            start_time: Some("10:00".into()),
            ..HallSearchParams::default()
        };
        let query = params.into_query(DayOfWeek::Monday);
        assert_eq!(query.day, DayOfWeek::Tuesday);
        assert!(query.window.is_none());
    }

    #[test]
    fn equipment_matches_by_substring_ignoring_case() {
        let hall = Hall::new("h1", "Lab 1", "Computing Block", 40)
            .with_equipment(["Computers", "Smart Projector"]);
        let mut query = HallSearchQuery::for_day(DayOfWeek::Monday);
        query.equipment = vec!["projector".into(), "COMP".into()];
        assert!(query.has_equipment(&hall));
        query.equipment.push("whiteboard".into());
        assert!(!query.has_equipment(&hall));
    }
}
