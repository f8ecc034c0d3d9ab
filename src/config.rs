use std::path::PathBuf;

use thiserror::Error;

pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_WAL_FILE: &str = "classbook.wal";
pub const DEFAULT_COMPACT_THRESHOLD: u64 = 1000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?} as a number")]
    BadNumber { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub wal_file: String,
    /// Compact the WAL after this many appends.
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            wal_file: DEFAULT_WAL_FILE.into(),
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
            metrics_port: None,
        }
    }
}

impl EngineConfig {
    /// Read `CLASSBOOK_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            data_dir: lookup("CLASSBOOK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            wal_file: lookup("CLASSBOOK_WAL_FILE").unwrap_or(defaults.wal_file),
            compact_threshold: parse(&lookup, "CLASSBOOK_COMPACT_THRESHOLD")?
                .unwrap_or(defaults.compact_threshold),
            metrics_port: parse(&lookup, "CLASSBOOK_METRICS_PORT")?,
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(&self.wal_file)
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::BadNumber { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = EngineConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.wal_path(), PathBuf::from("./data/classbook.wal"));
    }

    #[test]
    fn reads_all_variables() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("CLASSBOOK_DATA_DIR", "/var/lib/classbook"),
            ("CLASSBOOK_WAL_FILE", "rooms.wal"),
            ("CLASSBOOK_COMPACT_THRESHOLD", "250"),
            ("CLASSBOOK_METRICS_PORT", "9100"),
        ]))
        .unwrap();
        assert_eq!(config.wal_path(), PathBuf::from("/var/lib/classbook/rooms.wal"));
        assert_eq!(config.compact_threshold, 250);
        assert_eq!(config.metrics_port, Some(9100));
    }

    #[test]
    fn malformed_number_is_an_error() {
        let err = EngineConfig::from_lookup(lookup_from(&[("CLASSBOOK_METRICS_PORT", "http")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::BadNumber {
                var: "CLASSBOOK_METRICS_PORT",
                value: "http".into()
            }
        );
    }
}
