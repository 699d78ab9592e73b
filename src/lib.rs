pub mod availability;
pub mod cache;
pub mod calendar;
pub mod clock;
pub mod config;
pub mod conflict;
pub mod demo;
pub mod engine;
pub mod entry_validation;
pub mod error;
pub mod interval;
pub mod model;
pub mod persistence;
pub mod time;
pub mod timetable;
pub mod writer;

#[cfg(feature = "http_api")]
pub mod http_api;

pub use availability::{AvailabilityEngine, HallSearchParams, HallSearchQuery};
pub use cache::{CacheKey, ResultCache, Role};
pub use calendar::DayOfWeek;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use conflict::{Conflict, ConflictKind, detect_conflicts};
pub use engine::SchedulingEngine;
pub use error::{SchedulingError, SchedulingResult};
pub use interval::{FreeSlot, free_slots, overlaps};
pub use model::{EntryDraft, TimetableEntry};
pub use time::{TimeInterval, TimeOfDay};
pub use timetable::{TimetableService, UserTimetable};
pub use writer::TimetableWriter;
