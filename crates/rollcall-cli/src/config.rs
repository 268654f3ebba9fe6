use std::path::{Path, PathBuf};

use rollcall_core::{ConfirmConfig, LearningConfig, MatchConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Resolved configuration: built-in defaults, then an optional TOML file,
/// then `ROLLCALL_*` environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the profile store, its key and the ledger.
    pub data_dir: PathBuf,
    /// Encrypted profile store (default: `<data_dir>/profiles.enc`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_path: Option<PathBuf>,
    /// Profile key file (default: `<data_dir>/profiles.key`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_path: Option<PathBuf>,
    /// SQLite attendance ledger (default: `<data_dir>/attendance.db`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendance_path: Option<PathBuf>,
    /// Face crops collected per enrollment.
    pub required_samples: usize,
    /// Side length crops are resized to before matching; 0 keeps raw crops.
    pub sample_size: u32,
    #[serde(rename = "match")]
    pub matching: MatchConfig,
    pub learning: LearningConfig,
    pub confirm: ConfirmConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            profile_path: None,
            key_path: None,
            attendance_path: None,
            required_samples: 5,
            sample_size: 100,
            matching: MatchConfig::default(),
            learning: LearningConfig::default(),
            confirm: ConfirmConfig::default(),
        }
    }
}

impl Config {
    /// Load from the config file (`ROLLCALL_CONFIG`, else `<data_dir>/rollcall.toml`
    /// when present) and the process environment, then validate.
    pub fn load() -> Result<Self, ConfigError> {
        let lookup = |key: &str| std::env::var(key).ok();

        let explicit = lookup("ROLLCALL_CONFIG").map(PathBuf::from);
        let file = explicit.or_else(|| {
            let data_dir = lookup("ROLLCALL_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_data_dir);
            let candidate = data_dir.join("rollcall.toml");
            candidate.exists().then_some(candidate)
        });

        let mut config = match file {
            Some(path) => {
                let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                tracing::debug!(path = %path.display(), "loaded config file");
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        config.apply_env(lookup);
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Override fields from `ROLLCALL_*` variables resolved through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("ROLLCALL_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("ROLLCALL_PROFILE_PATH") {
            self.profile_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("ROLLCALL_KEY_PATH") {
            self.key_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("ROLLCALL_ATTENDANCE_PATH") {
            self.attendance_path = Some(PathBuf::from(path));
        }

        self.required_samples =
            env_usize(&lookup, "ROLLCALL_REQUIRED_SAMPLES", self.required_samples);
        self.sample_size = env_u32(&lookup, "ROLLCALL_SAMPLE_SIZE", self.sample_size);

        let m = &mut self.matching;
        m.match_confidence = env_f32(&lookup, "ROLLCALL_MATCH_CONFIDENCE", m.match_confidence);
        m.min_required_matches =
            env_usize(&lookup, "ROLLCALL_MIN_REQUIRED_MATCHES", m.min_required_matches);
        m.recognition_threshold = env_f32(
            &lookup,
            "ROLLCALL_RECOGNITION_THRESHOLD",
            m.recognition_threshold,
        );

        let l = &mut self.learning;
        l.learning_threshold =
            env_f32(&lookup, "ROLLCALL_LEARNING_THRESHOLD", l.learning_threshold);
        l.uniqueness_threshold =
            env_f32(&lookup, "ROLLCALL_UNIQUENESS_THRESHOLD", l.uniqueness_threshold);
        l.cooldown_ms = env_u64(&lookup, "ROLLCALL_LEARNING_COOLDOWN_MS", l.cooldown_ms);

        let c = &mut self.confirm;
        c.confirmation_delay_ms =
            env_u64(&lookup, "ROLLCALL_CONFIRMATION_DELAY_MS", c.confirmation_delay_ms);
        c.dropout_ms = env_u64(&lookup, "ROLLCALL_DROPOUT_MS", c.dropout_ms);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = [
            ("match.match_confidence", self.matching.match_confidence),
            ("match.recognition_threshold", self.matching.recognition_threshold),
            ("learning.learning_threshold", self.learning.learning_threshold),
            ("learning.uniqueness_threshold", self.learning.uniqueness_threshold),
        ];
        for (field, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{field} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.required_samples == 0 {
            return Err(ConfigError::Invalid(
                "required_samples must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn profile_path(&self) -> PathBuf {
        self.resolve(&self.profile_path, "profiles.enc")
    }

    pub fn key_path(&self) -> PathBuf {
        self.resolve(&self.key_path, "profiles.key")
    }

    pub fn attendance_path(&self) -> PathBuf {
        self.resolve(&self.attendance_path, "attendance.db")
    }

    fn resolve(&self, explicit: &Option<PathBuf>, file_name: &str) -> PathBuf {
        explicit
            .clone()
            .unwrap_or_else(|| self.data_dir.join(file_name))
    }

    /// Render the resolved configuration, paths included, as TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        let mut resolved = self.clone();
        resolved.profile_path = Some(self.profile_path());
        resolved.key_path = Some(self.key_path());
        resolved.attendance_path = Some(self.attendance_path());
        toml::to_string_pretty(&resolved)
    }
}

/// `$XDG_DATA_HOME/rollcall`, falling back to `~/.local/share/rollcall`.
pub fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            Path::new(&home).join(".local/share")
        })
        .join("rollcall")
}

fn env_f32(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: f32) -> f32 {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u32) -> u32 {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> u64 {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: usize) -> usize {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.required_samples, 5);
        assert_eq!(config.sample_size, 100);
        assert_eq!(config.matching.min_required_matches, 2);
        assert_eq!(config.learning.cooldown_ms, 2000);
        assert_eq!(config.confirm.dropout_ms, 1000);
        assert!(config.data_dir.ends_with("rollcall"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_paths_follow_data_dir_unless_overridden() {
        let mut config = Config {
            data_dir: PathBuf::from("/srv/rollcall"),
            ..Config::default()
        };
        assert_eq!(config.profile_path(), PathBuf::from("/srv/rollcall/profiles.enc"));
        assert_eq!(config.key_path(), PathBuf::from("/srv/rollcall/profiles.key"));
        assert_eq!(config.attendance_path(), PathBuf::from("/srv/rollcall/attendance.db"));

        config.key_path = Some(PathBuf::from("/secure/rollcall.key"));
        assert_eq!(config.key_path(), PathBuf::from("/secure/rollcall.key"));
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config = Config::from_toml(
            r#"
            data_dir = "/var/lib/rollcall"
            required_samples = 8

            [match]
            recognition_threshold = 0.7

            [confirm]
            dropout_ms = 1500
            "#,
        )
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/rollcall"));
        assert_eq!(config.required_samples, 8);
        assert_eq!(config.matching.recognition_threshold, 0.7);
        assert_eq!(config.matching.match_confidence, 0.60);
        assert_eq!(config.confirm.dropout_ms, 1500);
        assert_eq!(config.learning, LearningConfig::default());
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = Config::from_toml("required_samples = 8").unwrap();
        config.apply_env(vars(&[
            ("ROLLCALL_DATA_DIR", "/data"),
            ("ROLLCALL_REQUIRED_SAMPLES", "3"),
            ("ROLLCALL_LEARNING_THRESHOLD", "0.8"),
            ("ROLLCALL_DROPOUT_MS", "250"),
            ("ROLLCALL_SAMPLE_SIZE", "not-a-number"),
        ]));
        assert_eq!(config.data_dir, PathBuf::from("/data"));
        assert_eq!(config.required_samples, 3);
        assert_eq!(config.learning.learning_threshold, 0.8);
        assert_eq!(config.confirm.dropout_ms, 250);
        assert_eq!(config.sample_size, 100);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = Config::default();
        config.matching.match_confidence = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.required_samples = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_to_toml_lists_resolved_paths() {
        let config = Config {
            data_dir: PathBuf::from("/srv/rollcall"),
            ..Config::default()
        };
        let text = config.to_toml().unwrap();
        assert!(text.contains("/srv/rollcall/attendance.db"));
        let reparsed = Config::from_toml(&text).unwrap();
        assert_eq!(reparsed.profile_path(), config.profile_path());
        assert_eq!(reparsed.matching, config.matching);
    }
}
