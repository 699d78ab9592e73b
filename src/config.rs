//! Engine configuration: optional TOML file, then `LECTURE_SCHEDULER_*`
//! environment overrides.

use crate::time::{TimeError, TimeInterval, TimeOfDay};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENV_PREFIX: &str = "LECTURE_SCHEDULER_";
/// Names a TOML file to load before applying the other overrides.
pub const CONFIG_PATH_VAR: &str = "LECTURE_SCHEDULER_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
    #[error("invalid day window: {0}")]
    Window(#[from] TimeError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub day_start: TimeOfDay,
    pub day_end: TimeOfDay,
    pub cache_ttl_secs: u64,
    pub http_addr: String,
    /// In-memory store when unset.
    pub database_path: Option<PathBuf>,
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            day_start: TimeInterval::DEFAULT_WINDOW.start(),
            day_end: TimeInterval::DEFAULT_WINDOW.end(),
            cache_ttl_secs: crate::cache::DEFAULT_TTL_SECS,
            http_addr: "0.0.0.0:3000".to_string(),
            database_path: None,
            log_filter: "info".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.window()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Process configuration: the file named by `LECTURE_SCHEDULER_CONFIG`
    /// if set, then the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base = match lookup(CONFIG_PATH_VAR) {
            Some(path) if !path.trim().is_empty() => Self::from_file(path.trim())?,
            _ => Self::default(),
        };
        base.with_overrides(lookup)
    }

    /// Applies `LECTURE_SCHEDULER_<FIELD>` values from `lookup`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        if let Some(value) = var("DAY_START") {
            self.day_start = parse_value("DAY_START", &value)?;
        }
        if let Some(value) = var("DAY_END") {
            self.day_end = parse_value("DAY_END", &value)?;
        }
        if let Some(value) = var("CACHE_TTL_SECS") {
            self.cache_ttl_secs = parse_value("CACHE_TTL_SECS", &value)?;
        }
        if let Some(value) = var("HTTP_ADDR") {
            self.http_addr = value;
        }
        if let Some(value) = var("DATABASE_PATH") {
            self.database_path = Some(PathBuf::from(value));
        }
        if let Some(value) = var("LOG") {
            self.log_filter = value;
        }
        self.window()?;
        Ok(self)
    }

    pub fn window(&self) -> Result<TimeInterval, ConfigError> {
        Ok(TimeInterval::new(self.day_start, self.day_end)?)
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.cache_ttl_secs).unwrap_or(i64::MAX))
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|err: T::Err| ConfigError::InvalidValue {
        key: format!("{ENV_PREFIX}{key}"),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_the_standard_window() {
        let config = EngineConfig::default();
        assert_eq!(config.window().unwrap(), TimeInterval::DEFAULT_WINDOW);
        assert_eq!(config.cache_ttl().num_seconds(), 300);
    }

    #[test]
    fn toml_overrides_only_given_fields() {
        let config = EngineConfig::from_toml_str(
            r#"
            day_start = "07:30"
            database_path = "timetable.db"
            "#,
        )
        .unwrap();
        assert_eq!(config.day_start, TimeOfDay::from_hm(7, 30).unwrap());
        assert_eq!(config.day_end, TimeOfDay::from_hm(18, 0).unwrap());
        assert_eq!(config.database_path, Some(PathBuf::from("timetable.db")));
    }

    #[test]
    fn inverted_window_is_rejected() {
        let err = EngineConfig::from_toml_str("day_start = \"18:00\"\nday_end = \"08:00\"\n");
        assert!(matches!(err, Err(ConfigError::Window(_))));
    }

    #[test]
    fn environment_overrides_apply() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("LECTURE_SCHEDULER_HTTP_ADDR", "127.0.0.1:8080"),
            ("LECTURE_SCHEDULER_CACHE_TTL_SECS", "60"),
            ("LECTURE_SCHEDULER_DAY_END", "20:00"),
        ]);
        let config =
            EngineConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.http_addr, "127.0.0.1:8080");
        assert_eq!(config.cache_ttl_secs, 60);
        assert_eq!(config.day_end, TimeOfDay::from_hm(20, 0).unwrap());

        let bad = EngineConfig::default()
            .with_overrides(|key| (key == "LECTURE_SCHEDULER_CACHE_TTL_SECS").then(|| "soon".into()));
        assert!(matches!(bad, Err(ConfigError::InvalidValue { .. })));
    }
}
