use crate::calendar::DayOfWeek;
use crate::error::{ResourceKind, SchedulingError, SchedulingResult};
use crate::model::{DEFAULT_SEMESTER, DEFAULT_YEAR, EntryDraft, EntryFields, TimetableEntry};
use crate::persistence::TimetableReader;
use crate::time::{TimeInterval, TimeOfDay};

/// Validates a creation payload. Every scheduling field is required.
pub fn parse_new_entry(draft: &EntryDraft) -> SchedulingResult<EntryFields> {
    let day_of_week = parse_day(required(&draft.day_of_week, "dayOfWeek")?)?;
    let start = parse_time(required(&draft.start_time, "startTime")?)?;
    let end = parse_time(required(&draft.end_time, "endTime")?)?;
    let interval = TimeInterval::new(start, end)?;

    Ok(EntryFields {
        day_of_week,
        interval,
        semester: draft.semester.unwrap_or(DEFAULT_SEMESTER),
        year: draft.year.unwrap_or(DEFAULT_YEAR),
        course_id: required(&draft.course_id, "courseId")?.to_string(),
        lecturer_id: required(&draft.lecturer_id, "lecturerId")?.to_string(),
        hall_id: required(&draft.hall_id, "hallId")?.to_string(),
        group_id: required(&draft.group_id, "groupId")?.to_string(),
        is_active: draft.is_active.unwrap_or(true),
    })
}

/// Overlays the fields present in `draft` on `existing`, then validates the result.
pub fn merge_draft(existing: &TimetableEntry, draft: &EntryDraft) -> SchedulingResult<EntryFields> {
    let mut fields = existing.fields();
    if let Some(day) = &draft.day_of_week {
        fields.day_of_week = parse_day(day)?;
    }
    let start = match &draft.start_time {
        Some(value) => parse_time(value)?,
        None => fields.interval.start(),
    };
    let end = match &draft.end_time {
        Some(value) => parse_time(value)?,
        None => fields.interval.end(),
    };
    fields.interval = TimeInterval::new(start, end)?;

    if let Some(semester) = draft.semester {
        fields.semester = semester;
    }
    if let Some(year) = draft.year {
        fields.year = year;
    }
    overlay(&mut fields.course_id, &draft.course_id, "courseId")?;
    overlay(&mut fields.lecturer_id, &draft.lecturer_id, "lecturerId")?;
    overlay(&mut fields.hall_id, &draft.hall_id, "hallId")?;
    overlay(&mut fields.group_id, &draft.group_id, "groupId")?;
    if let Some(active) = draft.is_active {
        fields.is_active = active;
    }
    Ok(fields)
}

/// Fails with `NotFound` for the first reference missing from the directory.
pub fn ensure_references<R>(reader: &R, fields: &EntryFields) -> SchedulingResult<()>
where
    R: TimetableReader + ?Sized,
{
    if reader.course(&fields.course_id)?.is_none() {
        return Err(SchedulingError::not_found(ResourceKind::Course, &fields.course_id));
    }
    if reader.lecturer(&fields.lecturer_id)?.is_none() {
        return Err(SchedulingError::not_found(
            ResourceKind::Lecturer,
            &fields.lecturer_id,
        ));
    }
    if reader.hall(&fields.hall_id)?.is_none() {
        return Err(SchedulingError::not_found(ResourceKind::Hall, &fields.hall_id));
    }
    if reader.group(&fields.group_id)?.is_none() {
        return Err(SchedulingError::not_found(ResourceKind::Group, &fields.group_id));
    }
    Ok(())
}

fn required<'a>(value: &'a Option<String>, field: &str) -> SchedulingResult<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(SchedulingError::malformed(format!("{field} is required"))),
    }
}

fn overlay(target: &mut String, value: &Option<String>, field: &str) -> SchedulingResult<()> {
    if value.is_some() {
        *target = required(value, field)?.to_string();
    }
    Ok(())
}

fn parse_day(value: &str) -> SchedulingResult<DayOfWeek> {
    Ok(value.parse::<DayOfWeek>()?)
}

fn parse_time(value: &str) -> SchedulingResult<TimeOfDay> {
    Ok(value.trim().parse::<TimeOfDay>()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> EntryDraft {
        EntryDraft {
            day_of_week: Some("monday".into()),
            start_time: Some("09:00".into()),
            end_time: Some("10:00".into()),
            course_id: Some("c1".into()),
            lecturer_id: Some("l1".into()),
            hall_id: Some("h1".into()),
            group_id: Some("g1".into()),
            ..EntryDraft::default()
        }
    }

    #[test]
    fn defaults_fill_optional_fields() {
        let fields = parse_new_entry(&draft()).unwrap();
        assert_eq!(fields.day_of_week, DayOfWeek::Monday);
        assert_eq!(fields.semester, DEFAULT_SEMESTER);
        assert_eq!(fields.year, DEFAULT_YEAR);
        assert!(fields.is_active);
    }

    #[test]
    fn inverted_interval_rejected_before_reference_checks() {
        let mut bad = draft();
        bad.start_time = Some("11:00".into());
        bad.course_id = None;
        let err = parse_new_entry(&bad).unwrap_err();
        assert!(matches!(err, SchedulingError::InvalidInterval { .. }));
    }

    #[test]
    fn missing_and_malformed_fields_are_malformed_input() {
        let mut missing = draft();
        missing.hall_id = Some("  ".into());
        assert!(matches!(
            parse_new_entry(&missing),
            Err(SchedulingError::MalformedInput(_))
        ));

        let mut malformed = draft();
        malformed.end_time = Some("9:5".into());
        assert!(matches!(
            parse_new_entry(&malformed),
            Err(SchedulingError::MalformedInput(_))
        ));
    }

    #[test]
    fn merge_keeps_unspecified_fields() {
        let existing = TimetableEntry::from_fields("e1", parse_new_entry(&draft()).unwrap());
        let patch = EntryDraft {
            start_time: Some("09:30".into()),
            end_time: Some("10:30".into()),
            ..EntryDraft::default()
        };
        let merged = merge_draft(&existing, &patch).unwrap();
        assert_eq!(merged.interval, TimeInterval::parse("09:30", "10:30").unwrap());
        assert_eq!(merged.hall_id, "h1");
        assert_eq!(merged.day_of_week, DayOfWeek::Monday);
    }

    #[test]
    fn merge_validates_combined_interval() {
        let existing = TimetableEntry::from_fields("e1", parse_new_entry(&draft()).unwrap());
        let patch = EntryDraft {
            start_time: Some("10:00".into()),
            ..EntryDraft::default()
        };
        assert!(matches!(
            merge_draft(&existing, &patch),
            Err(SchedulingError::InvalidInterval { .. })
        ));
    }
}
