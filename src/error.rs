use crate::calendar::ParseDayError;
use crate::conflict::Conflict;
use crate::persistence::StoreError;
use crate::time::{TimeError, TimeOfDay};
use crate::writer::ImportReport;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Entry,
    Hall,
    Lecturer,
    Course,
    Group,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResourceKind::Entry => "timetable entry",
            ResourceKind::Hall => "hall",
            ResourceKind::Lecturer => "lecturer",
            ResourceKind::Course => "course",
            ResourceKind::Group => "group",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum SchedulingError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: ResourceKind, id: String },

    #[error("schedule conflicts detected ({} conflict(s))", .0.len())]
    Conflict(Vec<Conflict>),

    #[error("start time {start} must be before end time {end}")]
    InvalidInterval { start: TimeOfDay, end: TimeOfDay },

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("import rejected: {} invalid row(s), {} conflicting row(s)", .0.row_errors.len(), .0.conflicts.len())]
    Import(ImportReport),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SchedulingError {
    pub fn not_found(kind: ResourceKind, id: impl Into<String>) -> Self {
        SchedulingError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        SchedulingError::MalformedInput(message.into())
    }
}

impl From<TimeError> for SchedulingError {
    fn from(value: TimeError) -> Self {
        match value {
            TimeError::Inverted { start, end } => SchedulingError::InvalidInterval { start, end },
            TimeError::Malformed(_) => SchedulingError::MalformedInput(value.to_string()),
        }
    }
}

impl From<ParseDayError> for SchedulingError {
    fn from(value: ParseDayError) -> Self {
        SchedulingError::MalformedInput(value.to_string())
    }
}

pub type SchedulingResult<T> = Result<T, SchedulingError>;
