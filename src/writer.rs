use crate::cache::ResultCache;
use crate::calendar::DayOfWeek;
use crate::conflict::{Conflict, detect_conflicts};
use crate::entry_validation::{ensure_references, merge_draft, parse_new_entry};
use crate::error::{ResourceKind, SchedulingError, SchedulingResult};
use crate::model::{
    CandidateSlot, DEFAULT_SEMESTER, DEFAULT_YEAR, EntryDraft, EntryFields, TimetableEntry,
    TimetableSlot,
};
use crate::persistence::{
    EntryFilter, EntryTransaction, HallFilter, TimetableCsvRecord, TimetableStore,
    read_timetable_csv, write_timetable_csv,
};
use crate::time::TimeInterval;
use crate::timetable::{UserTimetable, join_slot};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Arc;

pub const DEFAULT_PAGE_LIMIT: usize = 20;
pub const MAX_PAGE_LIMIT: usize = 100;

/// First data row of an import file; the header is row 1.
const FIRST_DATA_ROW: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    pub row: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowConflicts {
    pub row: usize,
    pub conflicts: Vec<Conflict>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub total: usize,
    pub imported: usize,
}

/// Why a bulk import was rolled back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub total: usize,
    pub row_errors: Vec<RowError>,
    pub conflicts: Vec<RowConflicts>,
}

/// Listing filters as they arrive from a caller. Unparseable values are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryQuery {
    pub day: Option<String>,
    pub hall_id: Option<String>,
    pub lecturer_id: Option<String>,
    pub group_id: Option<String>,
    pub course_id: Option<String>,
    pub semester: Option<String>,
    pub year: Option<String>,
    pub search: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl EntryQuery {
    fn filter(&self) -> EntryFilter {
        EntryFilter {
            day: self.day.as_deref().and_then(|day| day.parse().ok()),
            hall_id: non_empty(&self.hall_id),
            lecturer_id: non_empty(&self.lecturer_id),
            group_ids: non_empty(&self.group_id).into_iter().collect(),
            course_id: non_empty(&self.course_id),
            semester: self.semester.as_deref().and_then(|v| v.trim().parse().ok()),
            year: self.year.as_deref().and_then(|v| v.trim().parse().ok()),
            exclude_id: None,
        }
    }

    fn page(&self) -> usize {
        self.page
            .as_deref()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(1)
            .max(1)
    }

    fn limit(&self) -> usize {
        self.limit
            .as_deref()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT)
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPage {
    pub items: Vec<TimetableSlot>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
}

/// The only mutation route for timetable entries. Every write checks
/// conflicts inside the store transaction and clears the result cache once
/// committed.
#[derive(Clone)]
pub struct TimetableWriter {
    store: Arc<dyn TimetableStore>,
    cache: Arc<ResultCache<UserTimetable>>,
}

impl TimetableWriter {
    pub fn new(store: Arc<dyn TimetableStore>, cache: Arc<ResultCache<UserTimetable>>) -> Self {
        Self { store, cache }
    }

    pub fn create_entry(&self, draft: &EntryDraft) -> SchedulingResult<TimetableEntry> {
        let fields = parse_new_entry(draft)?;
        let mut created = None;
        self.store.write(&mut |tx| {
            ensure_references(&*tx, &fields)?;
            reject_conflicts(&*tx, &fields, None)?;
            created = Some(tx.insert_entry(fields.clone())?);
            Ok(())
        })
        .inspect_err(log_rejection)?;
        let entry = committed(created)?;
        self.cache.invalidate_all();
        tracing::info!(entry_id = %entry.id, day = %entry.day_of_week, interval = %entry.interval, "timetable entry created");
        Ok(entry)
    }

    /// Merges `draft` over the stored entry, ignoring the entry itself when
    /// checking conflicts.
    pub fn update_entry(&self, id: &str, draft: &EntryDraft) -> SchedulingResult<TimetableEntry> {
        let mut updated = None;
        self.store.write(&mut |tx| {
            let existing = tx
                .entry(id)?
                .ok_or_else(|| SchedulingError::not_found(ResourceKind::Entry, id))?;
            let fields = merge_draft(&existing, draft)?;
            ensure_references(&*tx, &fields)?;
            reject_conflicts(&*tx, &fields, Some(id))?;
            updated = Some(tx.update_entry(id, fields)?);
            Ok(())
        })
        .inspect_err(log_rejection)?;
        let entry = committed(updated)?;
        self.cache.invalidate_all();
        tracing::info!(entry_id = %entry.id, day = %entry.day_of_week, interval = %entry.interval, "timetable entry updated");
        Ok(entry)
    }

    pub fn delete_entry(&self, id: &str) -> SchedulingResult<()> {
        self.store.write(&mut |tx| {
            if tx.delete_entry(id)? {
                Ok(())
            } else {
                Err(SchedulingError::not_found(ResourceKind::Entry, id))
            }
        })?;
        self.cache.invalidate_all();
        tracing::info!(entry_id = %id, "timetable entry deleted");
        Ok(())
    }

    /// Read-only conflict preview.
    pub fn check_conflicts(
        &self,
        candidate: &CandidateSlot,
        exclude_entry_id: Option<&str>,
    ) -> SchedulingResult<Vec<Conflict>> {
        detect_conflicts(self.store.as_ref(), candidate, exclude_entry_id)
    }

    /// Imports every row or none. Rows are checked against the store and
    /// against the rows before them in the same file.
    pub fn import_csv<R: Read>(&self, reader: R) -> SchedulingResult<ImportSummary> {
        let records = read_timetable_csv(reader)
            .map_err(|err| SchedulingError::malformed(format!("unreadable CSV: {err}")))?;
        if records.is_empty() {
            return Err(SchedulingError::malformed("CSV file contained no rows"));
        }

        let total = records.len();
        let mut outcome = None;
        let result = self.store.write(&mut |tx| {
            let directory = Directory::load(&*tx)?;
            let mut report = ImportReport {
                total,
                ..ImportReport::default()
            };
            let mut imported = 0;
            for (idx, record) in records.iter().enumerate() {
                let row = idx + FIRST_DATA_ROW;
                let fields = match directory.resolve(record) {
                    Ok(fields) => fields,
                    Err(message) => {
                        report.row_errors.push(RowError { row, message });
                        continue;
                    }
                };
                let conflicts = detect_conflicts(&*tx, &fields.candidate(), None)?;
                if !conflicts.is_empty() {
                    report.conflicts.push(RowConflicts { row, conflicts });
                    continue;
                }
                tx.insert_entry(fields)?;
                imported += 1;
            }
            if !report.row_errors.is_empty() || !report.conflicts.is_empty() {
                return Err(SchedulingError::Import(report));
            }
            outcome = Some(ImportSummary { total, imported });
            Ok(())
        });
        if let Err(SchedulingError::Import(report)) = &result {
            tracing::warn!(
                rows = total,
                invalid = report.row_errors.len(),
                conflicting = report.conflicts.len(),
                "timetable import rolled back"
            );
        }
        result?;
        let summary = outcome.ok_or_else(|| SchedulingError::malformed("import produced no result"))?;
        self.cache.invalidate_all();
        tracing::info!(imported = summary.imported, "timetable import committed");
        Ok(summary)
    }

    /// Writes every active entry in the import layout, so the output can be
    /// fed back through `import_csv` on another store.
    pub fn export_csv<W: Write>(&self, writer: W) -> SchedulingResult<usize> {
        let store = self.store.as_ref();
        let entries = store.list_active_entries(&EntryFilter::default())?;
        let mut records = Vec::with_capacity(entries.len());
        for entry in &entries {
            records.push(export_record(&join_slot(store, entry)?));
        }
        write_timetable_csv(writer, &records)?;
        tracing::info!(rows = records.len(), "timetable exported");
        Ok(records.len())
    }

    /// Active entries matching the query, joined for display, one page at a time.
    pub fn list_entries(&self, query: &EntryQuery) -> SchedulingResult<EntryPage> {
        let store = self.store.as_ref();
        let entries = store.list_active_entries(&query.filter())?;
        let needle = non_empty(&query.search).map(|s| s.to_lowercase());
        let mut slots = Vec::with_capacity(entries.len());
        for entry in &entries {
            let slot = join_slot(store, entry)?;
            if needle.as_deref().is_none_or(|needle| slot_matches(&slot, needle)) {
                slots.push(slot);
            }
        }

        let page = query.page();
        let limit = query.limit();
        let total = slots.len();
        let items = slots
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .collect();
        Ok(EntryPage {
            items,
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
        })
    }
}

fn export_record(slot: &TimetableSlot) -> TimetableCsvRecord {
    TimetableCsvRecord {
        day_of_week: slot.day_of_week.to_string(),
        start_time: slot.interval.start().to_string(),
        end_time: slot.interval.end().to_string(),
        course_code: slot.course.code.clone(),
        lecturer_email: slot.lecturer.email.clone(),
        hall_name: slot.hall.name.clone(),
        group_name: slot.group.name.clone(),
        semester: slot.semester.to_string(),
        year: slot.year.to_string(),
    }
}

fn slot_matches(slot: &TimetableSlot, needle: &str) -> bool {
    [
        slot.course.name.as_str(),
        slot.course.code.as_str(),
        slot.lecturer.first_name.as_str(),
        slot.lecturer.last_name.as_str(),
        slot.hall.name.as_str(),
        slot.group.name.as_str(),
    ]
    .iter()
    .any(|field| field.to_lowercase().contains(needle))
}

/// Runs conflict detection for every write. An inactive entry occupies
/// nothing, so its overlaps are logged but not rejected; reactivating it is a
/// write that is checked again.
fn reject_conflicts(
    tx: &dyn EntryTransaction,
    fields: &EntryFields,
    exclude: Option<&str>,
) -> SchedulingResult<()> {
    let conflicts = detect_conflicts(tx, &fields.candidate(), exclude)?;
    if conflicts.is_empty() {
        Ok(())
    } else if !fields.is_active {
        tracing::debug!(
            count = conflicts.len(),
            "inactive entry overlaps active entries; not rejected"
        );
        Ok(())
    } else {
        Err(SchedulingError::Conflict(conflicts))
    }
}

fn committed(entry: Option<TimetableEntry>) -> SchedulingResult<TimetableEntry> {
    entry.ok_or_else(|| SchedulingError::malformed("write committed without an entry"))
}

fn log_rejection(err: &SchedulingError) {
    match err {
        SchedulingError::Conflict(conflicts) => {
            tracing::warn!(count = conflicts.len(), "timetable write rejected: conflicts");
        }
        SchedulingError::Store(err) => tracing::error!(error = %err, "timetable write failed"),
        _ => {}
    }
}

/// Case-insensitive lookups used to resolve import rows.
struct Directory {
    courses: HashMap<String, String>,
    lecturers: HashMap<String, String>,
    halls: HashMap<String, String>,
    groups: HashMap<String, String>,
}

impl Directory {
    fn load(tx: &dyn EntryTransaction) -> SchedulingResult<Self> {
        let by_key = |pairs: Vec<(String, String)>| -> HashMap<String, String> {
            pairs
                .into_iter()
                .map(|(key, id)| (key.trim().to_lowercase(), id))
                .collect()
        };
        Ok(Self {
            courses: by_key(
                tx.list_courses()?
                    .into_iter()
                    .map(|course| (course.code, course.id))
                    .collect(),
            ),
            lecturers: by_key(
                tx.list_lecturers()?
                    .into_iter()
                    .map(|lecturer| (lecturer.email, lecturer.id))
                    .collect(),
            ),
            halls: by_key(
                tx.list_halls(&HallFilter {
                    include_inactive: true,
                    ..HallFilter::default()
                })?
                    .into_iter()
                    .map(|hall| (hall.name, hall.id))
                    .collect(),
            ),
            groups: by_key(
                tx.list_groups()?
                    .into_iter()
                    .map(|group| (group.name, group.id))
                    .collect(),
            ),
        })
    }

    fn resolve(&self, record: &TimetableCsvRecord) -> Result<EntryFields, String> {
        let day_of_week: DayOfWeek = record
            .day_of_week
            .parse()
            .map_err(|_| format!("invalid dayOfWeek '{}'", record.day_of_week))?;
        let interval = TimeInterval::parse(&record.start_time, &record.end_time)
            .map_err(|err| err.to_string())?;
        let lookup = |map: &HashMap<String, String>, value: &str, what: &str| {
            map.get(&value.trim().to_lowercase())
                .cloned()
                .ok_or_else(|| format!("{what} '{value}' not found"))
        };
        Ok(EntryFields {
            day_of_week,
            interval,
            semester: record.semester()?.unwrap_or(DEFAULT_SEMESTER),
            year: record.year()?.unwrap_or(DEFAULT_YEAR),
            course_id: lookup(&self.courses, &record.course_code, "course")?,
            lecturer_id: lookup(&self.lecturers, &record.lecturer_email, "lecturer")?,
            hall_id: lookup(&self.halls, &record.hall_name, "hall")?,
            group_id: lookup(&self.groups, &record.group_name, "group")?,
            is_active: true,
        })
    }
}
