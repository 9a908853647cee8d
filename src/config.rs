//! Configuration loading and types.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Every section is optional and falls back to the
//! defaults below.

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Google Cloud Storage client settings.
    #[serde(default)]
    pub gcs: GcsConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Google Cloud Storage client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GcsConfig {
    /// JSON API endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Send requests without credentials (public buckets only).
    #[serde(default)]
    pub anonymous: bool,

    /// Path to a service account or authorized user JSON file.  Empty means
    /// Application Default Credentials.
    #[serde(default)]
    pub credentials_file: String,

    /// Connect and per-read timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GcsConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            anonymous: false,
            credentials_file: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObservabilityConfig {
    /// Install a Prometheus recorder and dump it to stderr on exit.
    #[serde(default)]
    pub metrics: bool,
}

// -- Defaults ----------------------------------------------------------------

fn default_endpoint() -> String {
    "https://storage.googleapis.com".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.gcs.endpoint, "https://storage.googleapis.com");
        assert!(!config.gcs.anonymous);
        assert_eq!(config.gcs.timeout_secs, 300);
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, "text");
        assert!(!config.observability.metrics);
    }

    #[test]
    fn test_load_partial_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "gcs:\n  anonymous: true\n  endpoint: http://localhost:4443\nlogging:\n  format: json\n"
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert!(config.gcs.anonymous);
        assert_eq!(config.gcs.endpoint, "http://localhost:4443");
        assert_eq!(config.gcs.timeout_secs, 300);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_load_empty_mapping() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{}}").unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.gcs.endpoint, "https://storage.googleapis.com");
    }

    #[test]
    fn test_example_config_parses() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/gsfetch.example.yaml");
        let config = load_config(path).unwrap();
        assert_eq!(config.gcs.endpoint, "https://storage.googleapis.com");
        assert_eq!(config.logging.level, "warn");
        assert!(!config.observability.metrics);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(load_config("/nonexistent/gsfetch.yaml").is_err());
    }
}
