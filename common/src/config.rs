// Agent settings with layered configuration (defaults, file, env)
// The watched services themselves live in the watch store, not here.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main settings structure containing all agent options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub agent: AgentConfig,
    pub http: HttpConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Directory holding dronetrigger.toml
    pub config_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    /// Prometheus exporter port; metrics are only recorded in-process when unset
    pub metrics_port: Option<u16>,
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let defaults = Settings::default();

        let builder = Config::builder()
            .set_default("agent.config_dir", defaults.agent.config_dir.display().to_string())?
            .set_default("http.timeout_seconds", defaults.http.timeout_seconds as i64)?
            .set_default("observability.log_level", defaults.observability.log_level)?
            .set_default("observability.log_format", "json")?
            // Start with default configuration
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("DRONETRIGGER")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.agent.config_dir.as_os_str().is_empty() {
            return Err("Agent config_dir cannot be empty".to_string());
        }

        if self.http.timeout_seconds == 0 {
            return Err("HTTP timeout_seconds must be greater than 0".to_string());
        }

        if self.observability.log_level.trim().is_empty() {
            return Err("Observability log_level cannot be empty".to_string());
        }
        if self.observability.metrics_port == Some(0) {
            return Err("Observability metrics_port must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            agent: AgentConfig {
                config_dir: PathBuf::from("."),
            },
            http: HttpConfig {
                timeout_seconds: 30,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                log_format: LogFormat::Json,
                metrics_port: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_without_files_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from_path(dir.path()).unwrap();
        assert_eq!(settings.http.timeout_seconds, 30);
        assert_eq!(settings.observability.log_format, LogFormat::Json);
        assert!(settings.observability.metrics_port.is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            "[http]\ntimeout_seconds = 5\n\n[observability]\nlog_format = \"pretty\"\nmetrics_port = 9100\n",
        )
        .unwrap();

        let settings = Settings::load_from_path(dir.path()).unwrap();
        assert_eq!(settings.http.timeout_seconds, 5);
        assert_eq!(settings.observability.log_format, LogFormat::Pretty);
        assert_eq!(settings.observability.metrics_port, Some(9100));
    }

    #[test]
    fn test_validation_catches_zero_timeout() {
        let mut settings = Settings::default();
        settings.http.timeout_seconds = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_zero_metrics_port() {
        let mut settings = Settings::default();
        settings.observability.metrics_port = Some(0);
        assert!(settings.validate().is_err());
    }
}
