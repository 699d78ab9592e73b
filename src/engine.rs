use crate::availability::AvailabilityEngine;
use crate::cache::{CacheStats, ResultCache};
use crate::clock::Clock;
use crate::config::{ConfigError, EngineConfig};
use crate::persistence::TimetableStore;
use crate::timetable::{TimetableService, UserTimetable};
use crate::writer::TimetableWriter;
use std::sync::Arc;

/// One store, one clock and one result cache shared by the read and write sides.
#[derive(Clone)]
pub struct SchedulingEngine {
    store: Arc<dyn TimetableStore>,
    cache: Arc<ResultCache<UserTimetable>>,
    writer: TimetableWriter,
    availability: AvailabilityEngine,
    timetables: TimetableService,
}

impl SchedulingEngine {
    pub fn new(
        store: Arc<dyn TimetableStore>,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Result<Self, ConfigError> {
        let window = config.window()?;
        let cache = Arc::new(ResultCache::new(config.cache_ttl(), clock.clone()));
        Ok(Self {
            writer: TimetableWriter::new(store.clone(), cache.clone()),
            availability: AvailabilityEngine::new(store.clone(), clock).with_window(window),
            timetables: TimetableService::new(store.clone(), cache.clone()),
            store,
            cache,
        })
    }

    pub fn store(&self) -> &Arc<dyn TimetableStore> {
        &self.store
    }

    pub fn writer(&self) -> &TimetableWriter {
        &self.writer
    }

    pub fn availability(&self) -> &AvailabilityEngine {
        &self.availability
    }

    pub fn timetables(&self) -> &TimetableService {
        &self.timetables
    }

    /// Clears every cached timetable and reports the cache afterwards.
    pub fn clear_cache(&self) -> CacheStats {
        self.cache.invalidate_all();
        self.cache.stats()
    }

    /// Clears the cached timetables of one student or lecturer.
    pub fn clear_cache_for(&self, subject: &str) -> CacheStats {
        self.cache.invalidate_subject(subject);
        self.cache.stats()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
