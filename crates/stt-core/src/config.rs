//! Broker configuration.
//!
//! Values resolve in priority order: explicit overrides (command-line flags),
//! environment variables, the TOML config file, built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::audio::AdmissionPolicy;
use crate::error::{Error, Result};

pub const INPUT_ADDRESS_ENV: &str = "STT_INPUT_ADDRESS";
pub const OUTPUT_ADDRESS_ENV: &str = "LLM_RAG_PIPE_INPUT_ADDRESS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SttConfig {
    #[serde(default = "default_input_address")]
    pub input_address: String,
    #[serde(default = "default_output_address")]
    pub output_address: String,
    #[serde(default = "default_sample_rate")]
    pub expected_sample_rate: u32,
    #[serde(default)]
    pub convert_to_mono: bool,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// How the inference worker is launched and kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_name")]
    pub name: String,
    #[serde(default = "default_worker_command")]
    pub command: String,
    #[serde(default = "default_worker_args")]
    pub args: Vec<String>,
    #[serde(default = "default_idle_timeout_minutes")]
    pub idle_timeout_minutes: u64,
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,
}

/// Values supplied on the command line. `None` leaves the lower-priority
/// value in place.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub input_address: Option<String>,
    pub output_address: Option<String>,
    pub expected_sample_rate: Option<u32>,
    pub convert_to_mono: Option<bool>,
    pub model_name: Option<String>,
    pub worker_command: Option<String>,
    pub idle_timeout_minutes: Option<u64>,
    pub log_file: Option<PathBuf>,
    pub log_level: Option<String>,
}

fn default_input_address() -> String {
    "tcp://localhost:20499".to_string()
}

fn default_output_address() -> String {
    "tcp://localhost:25000".to_string()
}

fn default_sample_rate() -> u32 {
    16_000
}

fn default_log_file() -> PathBuf {
    PathBuf::from("stt.log")
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_model_name() -> String {
    "nvidia/parakeet-tdt-0.6b-v2".to_string()
}

fn default_worker_command() -> String {
    "python3".to_string()
}

fn default_worker_args() -> Vec<String> {
    vec!["-m".to_string(), "stt_worker".to_string()]
}

fn default_idle_timeout_minutes() -> u64 {
    10
}

fn default_monitor_interval_secs() -> u64 {
    60
}

fn default_ready_timeout_secs() -> u64 {
    600
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            input_address: default_input_address(),
            output_address: default_output_address(),
            expected_sample_rate: default_sample_rate(),
            convert_to_mono: false,
            model: ModelConfig::default(),
            staging_dir: None,
            log_file: default_log_file(),
            log_level: default_log_level(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            command: default_worker_command(),
            args: default_worker_args(),
            idle_timeout_minutes: default_idle_timeout_minutes(),
            monitor_interval_secs: default_monitor_interval_secs(),
            ready_timeout_secs: default_ready_timeout_secs(),
        }
    }
}

impl SttConfig {
    /// `<config_dir>/stt/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("stt").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Load file and environment layers.
    ///
    /// An explicit `path` must exist. The default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Self::default_path();
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: SttConfig = toml::from_str(&content)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply environment variables through `lookup`. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(address) = non_empty(INPUT_ADDRESS_ENV) {
            self.input_address = address;
        }
        if let Some(address) = non_empty(OUTPUT_ADDRESS_ENV) {
            self.output_address = address;
        }
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(address) = overrides.input_address {
            self.input_address = address;
        }
        if let Some(address) = overrides.output_address {
            self.output_address = address;
        }
        if let Some(rate) = overrides.expected_sample_rate {
            self.expected_sample_rate = rate;
        }
        if let Some(convert) = overrides.convert_to_mono {
            self.convert_to_mono = convert;
        }
        if let Some(name) = overrides.model_name {
            self.model.name = name;
        }
        if let Some(command) = overrides.worker_command {
            self.model.command = command;
        }
        if let Some(minutes) = overrides.idle_timeout_minutes {
            self.model.idle_timeout_minutes = minutes;
        }
        if let Some(log_file) = overrides.log_file {
            self.log_file = log_file;
        }
        if let Some(level) = overrides.log_level {
            self.log_level = level;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_address.trim().is_empty() {
            return Err(Error::Config("input_address cannot be empty".to_string()));
        }
        if self.output_address.trim().is_empty() {
            return Err(Error::Config("output_address cannot be empty".to_string()));
        }
        if self.expected_sample_rate == 0 {
            return Err(Error::Config(
                "expected_sample_rate must be positive".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be positive".to_string()));
        }
        if self.model.idle_timeout_minutes == 0 {
            return Err(Error::Config(
                "model.idle_timeout_minutes must be positive".to_string(),
            ));
        }
        if self.model.monitor_interval_secs == 0 {
            return Err(Error::Config(
                "model.monitor_interval_secs must be positive".to_string(),
            ));
        }
        if self.model.command.trim().is_empty() {
            return Err(Error::Config("model.command cannot be empty".to_string()));
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.model.idle_timeout_minutes.saturating_mul(60))
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.model.monitor_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn admission_policy(&self) -> AdmissionPolicy {
        AdmissionPolicy {
            expected_sample_rate: self.expected_sample_rate,
            convert_to_mono: self.convert_to_mono,
            staging_dir: self.staging_dir.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = SttConfig::default();
        assert_eq!(config.input_address, "tcp://localhost:20499");
        assert_eq!(config.output_address, "tcp://localhost:25000");
        assert_eq!(config.expected_sample_rate, 16_000);
        assert!(!config.convert_to_mono);
        assert_eq!(config.model.name, "nvidia/parakeet-tdt-0.6b-v2");
        assert_eq!(config.idle_timeout(), Duration::from_secs(600));
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        config.validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: SttConfig = toml::from_str(
            r#"
            convert_to_mono = true

            [model]
            idle_timeout_minutes = 2
            "#,
        )
        .unwrap();
        assert!(config.convert_to_mono);
        assert_eq!(config.model.idle_timeout_minutes, 2);
        assert_eq!(config.model.command, "python3");
        assert_eq!(config.input_address, "tcp://localhost:20499");
    }

    #[test]
    fn overrides_beat_env_which_beats_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            input_address = "tcp://file:1"
            output_address = "tcp://file:2"
            "#,
        )
        .unwrap();

        let mut config = SttConfig::from_file(&path).unwrap();
        config.apply_env(env(&[
            (INPUT_ADDRESS_ENV, "tcp://env:1"),
            (OUTPUT_ADDRESS_ENV, "tcp://env:2"),
        ]));
        config.apply_overrides(ConfigOverrides {
            input_address: Some("tcp://cli:1".to_string()),
            ..Default::default()
        });

        assert_eq!(config.input_address, "tcp://cli:1");
        assert_eq!(config.output_address, "tcp://env:2");
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut config = SttConfig::default();
        config.apply_env(env(&[(INPUT_ADDRESS_ENV, "  ")]));
        assert_eq!(config.input_address, "tcp://localhost:20499");
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = SttConfig::load(Some(Path::new("/nonexistent/stt/config.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "expected_sample_rate = \"fast\"").unwrap();
        assert!(matches!(SttConfig::from_file(&path), Err(Error::Config(_))));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = SttConfig::default();
        config.expected_sample_rate = 0;
        assert!(config.validate().is_err());

        let mut config = SttConfig::default();
        config.model.idle_timeout_minutes = 0;
        assert!(config.validate().is_err());

        let mut config = SttConfig::default();
        config.output_address = String::new();
        assert!(config.validate().is_err());
    }
}
