use std::path::PathBuf;
use std::time::Duration;

use crate::engine::{EngineConfig, DEFAULT_MAX_ATTEMPTS, DEFAULT_REFERENCE_PREFIX};
use crate::limits::MAX_REFERENCE_PREFIX_LEN;

/// Process configuration, read from `PARKEASE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub reminder_interval: Duration,
    pub compact_threshold: u64,
    pub reference_prefix: String,
    pub reference_max_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            reminder_interval: Duration::from_secs(300),
            compact_threshold: 1000,
            reference_prefix: DEFAULT_REFERENCE_PREFIX.to_string(),
            reference_max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        let reference_prefix = lookup("PARKEASE_REFERENCE_PREFIX")
            .map(|p| p.trim().to_ascii_uppercase())
            .filter(|p| {
                !p.is_empty()
                    && p.len() <= MAX_REFERENCE_PREFIX_LEN
                    && p.chars().all(|c| c.is_ascii_alphanumeric())
            })
            .unwrap_or(defaults.reference_prefix);

        Self {
            data_dir: lookup("PARKEASE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            metrics_port: lookup("PARKEASE_METRICS_PORT").and_then(|s| s.trim().parse().ok()),
            reminder_interval: parsed("PARKEASE_REMINDER_INTERVAL_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.reminder_interval),
            compact_threshold: parsed("PARKEASE_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            reference_prefix,
            reference_max_attempts: parsed("PARKEASE_REFERENCE_MAX_ATTEMPTS")
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(defaults.reference_max_attempts),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("reservations.wal")
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            reference_prefix: self.reference_prefix.clone(),
            reference_max_attempts: self.reference_max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config, Config::default());
        assert_eq!(config.wal_path(), PathBuf::from("./data/reservations.wal"));
    }

    #[test]
    fn reads_every_variable() {
        let config = Config::from_lookup(lookup_from(&[
            ("PARKEASE_DATA_DIR", "/var/lib/parkease"),
            ("PARKEASE_METRICS_PORT", "9100"),
            ("PARKEASE_REMINDER_INTERVAL_SECS", "60"),
            ("PARKEASE_COMPACT_THRESHOLD", "50"),
            ("PARKEASE_REFERENCE_PREFIX", "pe"),
            ("PARKEASE_REFERENCE_MAX_ATTEMPTS", "3"),
        ]));
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/parkease"));
        assert_eq!(config.metrics_port, Some(9100));
        assert_eq!(config.reminder_interval, Duration::from_secs(60));
        assert_eq!(config.compact_threshold, 50);
        assert_eq!(config.reference_prefix, "PE");
        assert_eq!(config.engine_config().reference_max_attempts, 3);
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            ("PARKEASE_METRICS_PORT", "not-a-port"),
            ("PARKEASE_REMINDER_INTERVAL_SECS", "0"),
            ("PARKEASE_REFERENCE_PREFIX", "PK-!"),
            ("PARKEASE_REFERENCE_MAX_ATTEMPTS", "-1"),
        ]));
        assert_eq!(config.metrics_port, None);
        assert_eq!(config.reminder_interval, Duration::from_secs(300));
        assert_eq!(config.reference_prefix, "PK");
        assert_eq!(config.reference_max_attempts, DEFAULT_MAX_ATTEMPTS);
    }
}
