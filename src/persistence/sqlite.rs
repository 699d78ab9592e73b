use super::{
    DirectoryWriter, EntryFilter, EntryTransaction, HallFilter, StoreError, StoreResult,
    TimetableReader, TimetableStore, new_entry_id,
};
use crate::calendar::{DateRange, DayOfWeek};
use crate::error::SchedulingResult;
use crate::model::{
    Appointment, AppointmentStatus, Course, EntryFields, Hall, Lecturer, StudentGroup,
    TimetableEntry,
};
use crate::time::{TimeInterval, TimeOfDay};
use chrono::NaiveDateTime;
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params, params_from_iter};
use std::path::Path;
use std::time::Duration;

const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const ENTRY_COLUMNS: &str = "id, day_of_week, start_minute, end_minute, semester, year, \
     course_id, lecturer_id, hall_id, group_id, is_active";

pub struct SqliteStore {
    connection: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let connection = Connection::open(path)?;
        Self::from_connection(connection)
    }

    pub fn in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> StoreResult<Self> {
        connection.busy_timeout(BUSY_TIMEOUT)?;
        Self::initialize_schema(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn initialize_schema(connection: &Connection) -> StoreResult<()> {
        let ddl = r#"
            PRAGMA foreign_keys = ON;
            CREATE TABLE IF NOT EXISTS halls (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                building TEXT NOT NULL,
                floor INTEGER NOT NULL,
                capacity INTEGER NOT NULL,
                equipment_json TEXT NOT NULL,
                is_active INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS courses (
                id TEXT PRIMARY KEY,
                code TEXT NOT NULL,
                name TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS lecturers (
                id TEXT PRIMARY KEY,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                email TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS student_groups (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                batch_year INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS group_members (
                group_id TEXT NOT NULL REFERENCES student_groups(id) ON DELETE CASCADE,
                student_id TEXT NOT NULL,
                PRIMARY KEY (group_id, student_id)
            );
            CREATE TABLE IF NOT EXISTS appointments (
                id TEXT PRIMARY KEY,
                lecturer_id TEXT NOT NULL,
                date_time TEXT NOT NULL,
                duration_minutes INTEGER NOT NULL,
                status TEXT NOT NULL,
                counterpart_name TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS timetable_entries (
                id TEXT PRIMARY KEY,
                day_of_week TEXT NOT NULL,
                day_index INTEGER NOT NULL,
                start_minute INTEGER NOT NULL,
                end_minute INTEGER NOT NULL,
                semester INTEGER NOT NULL,
                year INTEGER NOT NULL,
                course_id TEXT NOT NULL,
                lecturer_id TEXT NOT NULL,
                hall_id TEXT NOT NULL,
                group_id TEXT NOT NULL,
                is_active INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_entries_day ON timetable_entries (day_index, start_minute);
            CREATE INDEX IF NOT EXISTS idx_appointments_lecturer ON appointments (lecturer_id, date_time);
        "#;
        connection.execute_batch(ddl)?;
        Ok(())
    }
}

/// Queries over one connection, or over an open transaction.
struct SqliteSession<'c> {
    conn: &'c Connection,
}

type EntryRow = (String, String, i64, i64, i64, i64, String, String, String, String, bool);

fn entry_from_row(row: EntryRow) -> StoreResult<TimetableEntry> {
    let (id, day, start, end, semester, year, course_id, lecturer_id, hall_id, group_id, is_active) =
        row;
    let day_of_week: DayOfWeek = day
        .parse()
        .map_err(|err| StoreError::InvalidData(format!("entry {id}: {err}")))?;
    let start = minute_of_day(&id, start)?;
    let end = minute_of_day(&id, end)?;
    let interval = TimeInterval::new(start, end)
        .map_err(|err| StoreError::InvalidData(format!("entry {id}: {err}")))?;
    Ok(TimetableEntry {
        day_of_week,
        interval,
        semester: u32::try_from(semester)
            .map_err(|_| StoreError::InvalidData(format!("entry {id}: bad semester")))?,
        year: i32::try_from(year)
            .map_err(|_| StoreError::InvalidData(format!("entry {id}: bad year {year}")))?,
        course_id,
        lecturer_id,
        hall_id,
        group_id,
        is_active,
        id,
    })
}

fn minute_of_day(id: &str, minutes: i64) -> StoreResult<TimeOfDay> {
    u32::try_from(minutes)
        .ok()
        .and_then(TimeOfDay::from_minutes)
        .ok_or_else(|| StoreError::InvalidData(format!("entry {id}: minute {minutes} out of range")))
}

fn read_entry_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntryRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
    ))
}

type HallRow = (String, String, String, i32, i64, String, bool);

fn hall_from_row(row: HallRow) -> StoreResult<Hall> {
    let (id, name, building, floor, capacity, equipment_json, is_active) = row;
    Ok(Hall {
        equipment: serde_json::from_str(&equipment_json)?,
        capacity: u32::try_from(capacity)
            .map_err(|_| StoreError::InvalidData(format!("hall {id}: bad capacity")))?,
        id,
        name,
        building,
        floor,
        is_active,
    })
}

fn read_hall_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<HallRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

type AppointmentRow = (String, String, String, i64, String, String);

fn appointment_from_row(row: AppointmentRow) -> StoreResult<Appointment> {
    let (id, lecturer_id, date_time, duration, status, counterpart_name) = row;
    let date_time = NaiveDateTime::parse_from_str(&date_time, DATE_TIME_FORMAT)
        .map_err(|err| StoreError::InvalidData(format!("appointment {id}: {err}")))?;
    let status = AppointmentStatus::parse(&status)
        .ok_or_else(|| StoreError::InvalidData(format!("appointment {id}: status {status}")))?;
    Ok(Appointment {
        duration_minutes: u32::try_from(duration)
            .map_err(|_| StoreError::InvalidData(format!("appointment {id}: bad duration")))?,
        id,
        lecturer_id,
        date_time,
        status,
        counterpart_name,
    })
}

impl SqliteSession<'_> {
    fn load_group(&self, id: String, name: String, batch_year: i32) -> StoreResult<StudentGroup> {
        let mut stmt = self
            .conn
            .prepare("SELECT student_id FROM group_members WHERE group_id = ?1 ORDER BY student_id")?;
        let members = stmt
            .query_map(params![id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(StudentGroup {
            id,
            name,
            batch_year,
            member_ids: members,
        })
    }

    fn write_entry(&self, entry: &TimetableEntry) -> StoreResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO timetable_entries \
             (id, day_of_week, day_index, start_minute, end_minute, semester, year, \
              course_id, lecturer_id, hall_id, group_id, is_active) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                entry.id,
                entry.day_of_week.as_str(),
                entry.day_of_week.days_from_monday(),
                entry.interval.start().minutes(),
                entry.interval.end().minutes(),
                entry.semester,
                entry.year,
                entry.course_id,
                entry.lecturer_id,
                entry.hall_id,
                entry.group_id,
                entry.is_active,
            ],
        )?;
        Ok(())
    }
}

impl TimetableReader for SqliteSession<'_> {
    fn list_active_entries(&self, filter: &EntryFilter) -> StoreResult<Vec<TimetableEntry>> {
        let mut sql = format!("SELECT {ENTRY_COLUMNS} FROM timetable_entries WHERE is_active = 1");
        let mut values: Vec<Value> = Vec::new();
        let mut push = |clause: &str, value: Value, sql: &mut String| {
            values.push(value);
            sql.push_str(&format!(" AND {clause} ?{}", values.len()));
        };
        if let Some(day) = filter.day {
            push("day_of_week =", Value::Text(day.as_str().into()), &mut sql);
        }
        if let Some(id) = &filter.hall_id {
            push("hall_id =", Value::Text(id.clone()), &mut sql);
        }
        if let Some(id) = &filter.lecturer_id {
            push("lecturer_id =", Value::Text(id.clone()), &mut sql);
        }
        if let Some(id) = &filter.course_id {
            push("course_id =", Value::Text(id.clone()), &mut sql);
        }
        if let Some(semester) = filter.semester {
            push("semester =", Value::Integer(i64::from(semester)), &mut sql);
        }
        if let Some(year) = filter.year {
            push("year =", Value::Integer(i64::from(year)), &mut sql);
        }
        if let Some(id) = &filter.exclude_id {
            push("id <>", Value::Text(id.clone()), &mut sql);
        }
        if !filter.group_ids.is_empty() {
            let start = values.len();
            let placeholders = filter
                .group_ids
                .iter()
                .enumerate()
                .map(|(idx, _)| format!("?{}", start + idx + 1))
                .collect::<Vec<_>>()
                .join(", ");
            values.extend(filter.group_ids.iter().cloned().map(Value::Text));
            sql.push_str(&format!(" AND group_id IN ({placeholders})"));
        }
        sql.push_str(" ORDER BY day_index, start_minute, end_minute, id");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), read_entry_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(entry_from_row).collect()
    }

    fn entry(&self, id: &str) -> StoreResult<Option<TimetableEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM timetable_entries WHERE id = ?1");
        let row = self
            .conn
            .query_row(&sql, params![id], read_entry_row)
            .optional()?;
        row.map(entry_from_row).transpose()
    }

    fn hall(&self, id: &str) -> StoreResult<Option<Hall>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, building, floor, capacity, equipment_json, is_active \
                 FROM halls WHERE id = ?1",
                params![id],
                read_hall_row,
            )
            .optional()?;
        row.map(hall_from_row).transpose()
    }

    fn list_halls(&self, filter: &HallFilter) -> StoreResult<Vec<Hall>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, building, floor, capacity, equipment_json, is_active \
             FROM halls ORDER BY name, id",
        )?;
        let rows = stmt
            .query_map([], read_hall_row)?
            .collect::<Result<Vec<_>, _>>()?;
        let mut halls = Vec::with_capacity(rows.len());
        for row in rows {
            let hall = hall_from_row(row)?;
            if filter.matches(&hall) {
                halls.push(hall);
            }
        }
        Ok(halls)
    }

    fn course(&self, id: &str) -> StoreResult<Option<Course>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, code, name FROM courses WHERE id = ?1",
                params![id],
                |row| Ok(Course::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?)),
            )
            .optional()?)
    }

    fn list_courses(&self) -> StoreResult<Vec<Course>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, code, name FROM courses ORDER BY id")?;
        let courses = stmt
            .query_map([], |row| {
                Ok(Course::new(
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(courses)
    }

    fn lecturer(&self, id: &str) -> StoreResult<Option<Lecturer>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, first_name, last_name, email FROM lecturers WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Lecturer::new(
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?)
    }

    fn list_lecturers(&self) -> StoreResult<Vec<Lecturer>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, first_name, last_name, email FROM lecturers ORDER BY id")?;
        let lecturers = stmt
            .query_map([], |row| {
                Ok(Lecturer::new(
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(lecturers)
    }

    fn group(&self, id: &str) -> StoreResult<Option<StudentGroup>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, batch_year FROM student_groups WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i32>(2)?,
                    ))
                },
            )
            .optional()?;
        row.map(|(id, name, batch_year)| self.load_group(id, name, batch_year))
            .transpose()
    }

    fn list_groups(&self) -> StoreResult<Vec<StudentGroup>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, batch_year FROM student_groups ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i32>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, name, batch_year)| self.load_group(id, name, batch_year))
            .collect()
    }

    fn student_group_ids(&self, student_id: &str) -> StoreResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT group_id FROM group_members WHERE student_id = ?1 ORDER BY group_id",
        )?;
        let ids = stmt
            .query_map(params![student_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn list_appointments(
        &self,
        lecturer_id: &str,
        statuses: &[AppointmentStatus],
        range: DateRange,
    ) -> StoreResult<Vec<Appointment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, lecturer_id, date_time, duration_minutes, status, counterpart_name \
             FROM appointments \
             WHERE lecturer_id = ?1 AND date_time >= ?2 AND date_time < ?3 \
             ORDER BY date_time, id",
        )?;
        let rows = stmt
            .query_map(
                params![
                    lecturer_id,
                    range.start.format(DATE_TIME_FORMAT).to_string(),
                    range.end.format(DATE_TIME_FORMAT).to_string(),
                ],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )?
            .collect::<Result<Vec<AppointmentRow>, _>>()?;
        let mut appointments = Vec::with_capacity(rows.len());
        for row in rows {
            let appointment = appointment_from_row(row)?;
            if statuses.contains(&appointment.status) {
                appointments.push(appointment);
            }
        }
        Ok(appointments)
    }
}

impl EntryTransaction for SqliteSession<'_> {
    fn insert_entry(&mut self, fields: EntryFields) -> StoreResult<TimetableEntry> {
        let entry = TimetableEntry::from_fields(new_entry_id(), fields);
        self.write_entry(&entry)?;
        Ok(entry)
    }

    fn update_entry(&mut self, id: &str, fields: EntryFields) -> StoreResult<TimetableEntry> {
        if self.entry(id)?.is_none() {
            return Err(StoreError::InvalidData(format!(
                "timetable entry {id} vanished during update"
            )));
        }
        let entry = TimetableEntry::from_fields(id, fields);
        self.write_entry(&entry)?;
        Ok(entry)
    }

    fn delete_entry(&mut self, id: &str) -> StoreResult<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM timetable_entries WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }
}

impl SqliteStore {
    fn session<T>(&self, f: impl FnOnce(&SqliteSession<'_>) -> StoreResult<T>) -> StoreResult<T> {
        let conn = self.connection.lock();
        f(&SqliteSession { conn: &conn })
    }

    /// Inserts an entry without conflict checks. Fixture loading only.
    pub fn insert_entry_unchecked(&self, entry: &TimetableEntry) -> StoreResult<()> {
        self.session(|session| session.write_entry(entry))
    }
}

impl TimetableReader for SqliteStore {
    fn list_active_entries(&self, filter: &EntryFilter) -> StoreResult<Vec<TimetableEntry>> {
        self.session(|s| s.list_active_entries(filter))
    }

    fn entry(&self, id: &str) -> StoreResult<Option<TimetableEntry>> {
        self.session(|s| s.entry(id))
    }

    fn hall(&self, id: &str) -> StoreResult<Option<Hall>> {
        self.session(|s| s.hall(id))
    }

    fn list_halls(&self, filter: &HallFilter) -> StoreResult<Vec<Hall>> {
        self.session(|s| s.list_halls(filter))
    }

    fn course(&self, id: &str) -> StoreResult<Option<Course>> {
        self.session(|s| s.course(id))
    }

    fn list_courses(&self) -> StoreResult<Vec<Course>> {
        self.session(|s| s.list_courses())
    }

    fn lecturer(&self, id: &str) -> StoreResult<Option<Lecturer>> {
        self.session(|s| s.lecturer(id))
    }

    fn list_lecturers(&self) -> StoreResult<Vec<Lecturer>> {
        self.session(|s| s.list_lecturers())
    }

    fn group(&self, id: &str) -> StoreResult<Option<StudentGroup>> {
        self.session(|s| s.group(id))
    }

    fn list_groups(&self) -> StoreResult<Vec<StudentGroup>> {
        self.session(|s| s.list_groups())
    }

    fn student_group_ids(&self, student_id: &str) -> StoreResult<Vec<String>> {
        self.session(|s| s.student_group_ids(student_id))
    }

    fn list_appointments(
        &self,
        lecturer_id: &str,
        statuses: &[AppointmentStatus],
        range: DateRange,
    ) -> StoreResult<Vec<Appointment>> {
        self.session(|s| s.list_appointments(lecturer_id, statuses, range))
    }
}

impl TimetableStore for SqliteStore {
    fn write(
        &self,
        op: &mut dyn FnMut(&mut dyn EntryTransaction) -> SchedulingResult<()>,
    ) -> SchedulingResult<()> {
        let mut conn = self.connection.lock();
        // IMMEDIATE takes the database write lock before the first read, so
        // writers on other connections queue behind this check-then-insert.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        {
            let mut session = SqliteSession { conn: &tx };
            op(&mut session)?;
        }
        tx.commit().map_err(StoreError::from)?;
        Ok(())
    }
}

impl DirectoryWriter for SqliteStore {
    fn upsert_hall(&self, hall: Hall) -> StoreResult<()> {
        let equipment_json = serde_json::to_string(&hall.equipment)?;
        self.session(|s| {
            s.conn.execute(
                "INSERT OR REPLACE INTO halls \
                 (id, name, building, floor, capacity, equipment_json, is_active) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    hall.id,
                    hall.name,
                    hall.building,
                    hall.floor,
                    hall.capacity,
                    equipment_json,
                    hall.is_active,
                ],
            )?;
            Ok(())
        })
    }

    fn upsert_course(&self, course: Course) -> StoreResult<()> {
        self.session(|s| {
            s.conn.execute(
                "INSERT OR REPLACE INTO courses (id, code, name) VALUES (?1, ?2, ?3)",
                params![course.id, course.code, course.name],
            )?;
            Ok(())
        })
    }

    fn upsert_lecturer(&self, lecturer: Lecturer) -> StoreResult<()> {
        self.session(|s| {
            s.conn.execute(
                "INSERT OR REPLACE INTO lecturers (id, first_name, last_name, email) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    lecturer.id,
                    lecturer.first_name,
                    lecturer.last_name,
                    lecturer.email,
                ],
            )?;
            Ok(())
        })
    }

    fn upsert_group(&self, group: StudentGroup) -> StoreResult<()> {
        let mut conn = self.connection.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO student_groups (id, name, batch_year) VALUES (?1, ?2, ?3)",
            params![group.id, group.name, group.batch_year],
        )?;
        tx.execute(
            "DELETE FROM group_members WHERE group_id = ?1",
            params![group.id],
        )?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO group_members (group_id, student_id) VALUES (?1, ?2)")?;
            for member in &group.member_ids {
                stmt.execute(params![group.id, member])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn upsert_appointment(&self, appointment: Appointment) -> StoreResult<()> {
        self.session(|s| {
            s.conn.execute(
                "INSERT OR REPLACE INTO appointments \
                 (id, lecturer_id, date_time, duration_minutes, status, counterpart_name) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    appointment.id,
                    appointment.lecturer_id,
                    appointment.date_time.format(DATE_TIME_FORMAT).to_string(),
                    appointment.duration_minutes,
                    appointment.status.as_str(),
                    appointment.counterpart_name,
                ],
            )?;
            Ok(())
        })
    }
}
