use super::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// One row of a bulk timetable import. Resources are referenced by their
/// human-facing keys and resolved against the directory at import time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableCsvRecord {
    pub day_of_week: String,
    pub start_time: String,
    pub end_time: String,
    pub course_code: String,
    pub lecturer_email: String,
    pub hall_name: String,
    pub group_name: String,
    #[serde(default)]
    pub semester: String,
    #[serde(default)]
    pub year: String,
}

impl TimetableCsvRecord {
    pub fn semester(&self) -> Result<Option<u32>, String> {
        parse_optional(&self.semester, "semester")
    }

    pub fn year(&self) -> Result<Option<i32>, String> {
        parse_optional(&self.year, "year")
    }
}

fn parse_optional<T: std::str::FromStr>(input: &str, column: &str) -> Result<Option<T>, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<T>()
        .map(Some)
        .map_err(|_| format!("invalid {column} '{trimmed}'"))
}

/// Parses import rows. Headers and fields are trimmed; a row that cannot be
/// deserialised at all fails the whole read.
pub fn read_timetable_csv<R: Read>(reader: R) -> StoreResult<Vec<TimetableCsvRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let mut records = Vec::new();
    for record in reader.deserialize::<TimetableCsvRecord>() {
        records.push(record?);
    }
    Ok(records)
}

pub fn load_timetable_csv<P: AsRef<Path>>(path: P) -> StoreResult<Vec<TimetableCsvRecord>> {
    let file = File::open(path)?;
    read_timetable_csv(file)
}

/// Writes rows in the import layout, header included.
pub fn write_timetable_csv<W: std::io::Write>(
    writer: W,
    records: &[TimetableCsvRecord],
) -> StoreResult<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush().map_err(StoreError::from)?;
    Ok(())
}
