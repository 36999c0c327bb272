//! Engine configuration.

use std::env::VarError;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use dirsync_directory::ConnectionSettings;

use crate::error::{EngineError, EngineResult};

/// Tunables shared by every controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Retry delay after a transient "not ready" outcome.
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,

    /// Steady-state re-check interval, also used after failures.
    #[serde(default = "default_resync_interval")]
    pub resync_interval_secs: u64,

    /// Reconciles allowed to run at once.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Longest parent chain followed when computing a DN.
    #[serde(default = "default_max_reference_depth")]
    pub max_reference_depth: usize,

    /// Length of generated admin passwords.
    #[serde(default = "default_admin_password_length")]
    pub admin_password_length: usize,

    /// Finalizer guarding directory cleanup.
    #[serde(default = "default_finalizer")]
    pub finalizer: String,

    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Verify directory server certificates.
    #[serde(default = "default_verify_certificates")]
    pub verify_certificates: bool,
}

fn default_retry_interval() -> u64 {
    5
}

fn default_resync_interval() -> u64 {
    300
}

fn default_workers() -> usize {
    4
}

fn default_max_reference_depth() -> usize {
    32
}

fn default_admin_password_length() -> usize {
    32
}

fn default_finalizer() -> String {
    "dirsync.io/finalizer".to_string()
}

fn default_connection_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

fn default_verify_certificates() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry_interval_secs: default_retry_interval(),
            resync_interval_secs: default_resync_interval(),
            workers: default_workers(),
            max_reference_depth: default_max_reference_depth(),
            admin_password_length: default_admin_password_length(),
            finalizer: default_finalizer(),
            connection_timeout_secs: default_connection_timeout(),
            request_timeout_secs: default_request_timeout(),
            verify_certificates: default_verify_certificates(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            EngineError::Config(format!(
                "failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(content: &str) -> EngineResult<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| EngineError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) -> EngineResult<()> {
        self.apply_overrides(|key| std::env::var(key))
    }

    /// Apply overrides from a custom variable reader.
    ///
    /// This allows tests to supply variables without mutating process-global
    /// environment state.
    pub fn apply_overrides<F>(&mut self, reader: F) -> EngineResult<()>
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        if let Ok(value) = reader("DIRSYNC_WORKERS") {
            self.workers = parse_var("DIRSYNC_WORKERS", &value)?;
        }
        if let Ok(value) = reader("DIRSYNC_RETRY_INTERVAL_SECS") {
            self.retry_interval_secs = parse_var("DIRSYNC_RETRY_INTERVAL_SECS", &value)?;
        }
        if let Ok(value) = reader("DIRSYNC_RESYNC_INTERVAL_SECS") {
            self.resync_interval_secs = parse_var("DIRSYNC_RESYNC_INTERVAL_SECS", &value)?;
        }
        if let Ok(value) = reader("DIRSYNC_VERIFY_CERTIFICATES") {
            self.verify_certificates = parse_var("DIRSYNC_VERIFY_CERTIFICATES", &value)?;
        }
        self.validate()
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.workers == 0 {
            return Err(EngineError::Config("workers must be at least 1".into()));
        }
        if self.retry_interval_secs == 0 || self.resync_interval_secs == 0 {
            return Err(EngineError::Config(
                "retry and resync intervals must be greater than zero".into(),
            ));
        }
        if self.max_reference_depth == 0 {
            return Err(EngineError::Config(
                "max_reference_depth must be at least 1".into(),
            ));
        }
        if self.admin_password_length < 16 {
            return Err(EngineError::Config(
                "admin_password_length must be at least 16".into(),
            ));
        }
        if self.finalizer.trim().is_empty() {
            return Err(EngineError::Config("finalizer must not be empty".into()));
        }
        Ok(())
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    /// Timeouts handed to every directory client.
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            connection_timeout_secs: self.connection_timeout_secs,
            request_timeout_secs: self.request_timeout_secs,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> EngineResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| EngineError::Config(format!("invalid value for {name}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Create a reader closure from a HashMap (no global env mutation).
    fn make_reader(vars: HashMap<&str, &str>) -> impl Fn(&str) -> Result<String, VarError> {
        let owned: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| owned.get(key).cloned().ok_or(VarError::NotPresent)
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.retry_interval(), Duration::from_secs(5));
        assert_eq!(config.resync_interval_secs, 300);
        assert_eq!(config.workers, 4);
        assert_eq!(config.admin_password_length, 32);
        assert_eq!(config.finalizer, "dirsync.io/finalizer");
        assert!(config.verify_certificates);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml_fills_defaults() {
        let config = EngineConfig::from_yaml("workers: 8\nretry_interval_secs: 2\n").unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.retry_interval_secs, 2);
        assert_eq!(config.max_reference_depth, 32);
    }

    #[test]
    fn test_from_yaml_rejects_invalid() {
        assert!(EngineConfig::from_yaml("workers: 0\n").is_err());
        assert!(EngineConfig::from_yaml("workers: [\n").is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = EngineConfig::default();
        config
            .apply_overrides(make_reader(HashMap::from([
                ("DIRSYNC_WORKERS", "16"),
                ("DIRSYNC_VERIFY_CERTIFICATES", "false"),
            ])))
            .unwrap();

        assert_eq!(config.workers, 16);
        assert!(!config.verify_certificates);
        assert_eq!(config.retry_interval_secs, 5);
    }

    #[test]
    fn test_override_parse_error() {
        let mut config = EngineConfig::default();
        let err = config
            .apply_overrides(make_reader(HashMap::from([(
                "DIRSYNC_RESYNC_INTERVAL_SECS",
                "soon",
            )])))
            .unwrap_err();
        assert!(err.to_string().contains("DIRSYNC_RESYNC_INTERVAL_SECS"));
    }
}
