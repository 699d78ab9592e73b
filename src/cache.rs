use crate::clock::Clock;
use chrono::{Duration, NaiveDateTime};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_TTL_SECS: u64 = 5 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Student,
    Lecturer,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "STUDENT",
            Role::Lecturer => "LECTURER",
        }
    }
}

/// Role plus subject id, so a student and a lecturer sharing an id never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub role: Role,
    pub subject: String,
}

impl CacheKey {
    pub fn new(role: Role, subject: impl Into<String>) -> Self {
        Self {
            role,
            subject: subject.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timetable:{}:{}", self.role.as_str(), self.subject)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub ttl_secs: i64,
}

struct CacheEntry<V> {
    payload: V,
    expires_at: NaiveDateTime,
}

struct CacheState<V> {
    entries: HashMap<CacheKey, CacheEntry<V>>,
    /// Bumped by every invalidation.
    generation: u64,
}

/// TTL memo for aggregate timetable reads. Expiry is checked lazily on read.
pub struct ResultCache<V> {
    state: Mutex<CacheState<V>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> ResultCache<V> {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                generation: 0,
            }),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let expired = match state.entries.get(key) {
            None => return None,
            Some(entry) => now > entry.expires_at,
        };
        if expired {
            state.entries.remove(key);
            tracing::debug!(key = %key, "cache entry expired");
            return None;
        }
        state.entries.get(key).map(|entry| entry.payload.clone())
    }

    pub fn set(&self, key: CacheKey, payload: V) {
        let expires_at = self.clock.now() + self.ttl;
        self.state
            .lock()
            .entries
            .insert(key, CacheEntry { payload, expires_at });
    }

    /// Returns the cached value and `true`, or computes, stores and returns it
    /// with `false`. A value computed while an invalidation happened is
    /// returned but not stored.
    pub fn get_or_insert_with<E>(
        &self,
        key: CacheKey,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<(V, bool), E> {
        if let Some(hit) = self.get(&key) {
            tracing::debug!(key = %key, "cache hit");
            return Ok((hit, true));
        }
        tracing::debug!(key = %key, "cache miss");
        let generation = self.state.lock().generation;
        let payload = compute()?;

        let expires_at = self.clock.now() + self.ttl;
        let mut state = self.state.lock();
        if state.generation == generation {
            state.entries.insert(
                key,
                CacheEntry {
                    payload: payload.clone(),
                    expires_at,
                },
            );
        }
        Ok((payload, false))
    }

    pub fn invalidate_all(&self) {
        let mut state = self.state.lock();
        let dropped = state.entries.len();
        state.entries.clear();
        state.generation += 1;
        tracing::debug!(dropped, "cache invalidated");
    }

    /// Drops every role's entry for `subject`.
    pub fn invalidate_subject(&self, subject: &str) {
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|key, _| key.subject != subject);
        state.generation += 1;
        tracing::debug!(subject, dropped = before - state.entries.len(), "cache invalidated for subject");
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.state.lock().entries.len(),
            ttl_secs: self.ttl.num_seconds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::NaiveDate;

    fn cache() -> (Arc<ManualClock>, ResultCache<String>) {
        let start = NaiveDate::from_ymd_opt(2026, 10, 19)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let cache = ResultCache::new(Duration::seconds(DEFAULT_TTL_SECS as i64), clock.clone());
        (clock, cache)
    }

    #[test]
    fn key_renders_role_and_subject() {
        let key = CacheKey::new(Role::Lecturer, "lec-7");
        assert_eq!(key.to_string(), "timetable:LECTURER:lec-7");
    }

    #[test]
    fn entries_live_exactly_for_the_ttl() {
        let (clock, cache) = cache();
        let key = CacheKey::new(Role::Student, "s1");
        cache.set(key.clone(), "week".into());

        clock.advance(Duration::minutes(4) + Duration::seconds(59));
        assert_eq!(cache.get(&key).as_deref(), Some("week"));

        clock.advance(Duration::seconds(2));
        assert_eq!(cache.get(&key), None);
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn roles_do_not_collide() {
        let (_, cache) = cache();
        cache.set(CacheKey::new(Role::Student, "42"), "student".into());
        cache.set(CacheKey::new(Role::Lecturer, "42"), "lecturer".into());
        assert_eq!(
            cache.get(&CacheKey::new(Role::Student, "42")).as_deref(),
            Some("student")
        );
        cache.invalidate_subject("42");
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn invalidation_during_compute_is_not_overwritten() {
        let (_, cache) = cache();
        let key = CacheKey::new(Role::Student, "s1");
        let (value, hit) = cache
            .get_or_insert_with::<()>(key.clone(), || {
                cache.invalidate_all();
                Ok("stale".to_string())
            })
            .unwrap();
        assert_eq!(value, "stale");
        assert!(!hit);
        assert_eq!(cache.get(&key), None);

        let (_, hit) = cache
            .get_or_insert_with::<()>(key.clone(), || Ok("fresh".to_string()))
            .unwrap();
        assert!(!hit);
        let (value, hit) = cache
            .get_or_insert_with::<()>(key, || Ok("unused".to_string()))
            .unwrap();
        assert_eq!(value, "fresh");
        assert!(hit);
    }
}
