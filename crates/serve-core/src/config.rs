//! Configuration management for modelserve
//!
//! Provides a unified configuration system that supports YAML files,
//! environment variables, and command-line argument overrides.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for modelserve components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServeConfig {
    /// Model cache and load behaviour
    pub engine: EngineConfig,

    /// Metrics recorder configuration
    pub metrics: MetricsConfig,

    /// Feature store client configuration
    pub feature_store: FeatureStoreConfig,

    /// Local artifact and metadata locations used by development tooling
    pub artifacts: ArtifactConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl ServeConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest)
    /// 2. Configuration file
    /// 3. Defaults (lowest)
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&Self::default())?);

        if let Ok(config_path) = std::env::var("MODELSERVE_CONFIG") {
            builder = builder.add_source(config::File::with_name(&config_path).required(false));
        } else {
            for path in &["./modelserve.yaml", "/etc/modelserve/config.yaml"] {
                builder = builder.add_source(config::File::with_name(path).required(false));
            }
        }

        // MODELSERVE_ENGINE__FETCH_TIMEOUT_MS=5000
        builder = builder.add_source(
            config::Environment::with_prefix("MODELSERVE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let parsed: Self = builder.build()?.try_deserialize()?;
        parsed.validate()?;

        Ok(parsed)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(config::File::from(path));

        let parsed: Self = builder.build()?.try_deserialize()?;
        parsed.validate()?;

        Ok(parsed)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        self.metrics.validate()?;
        self.feature_store.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Model cache and load behaviour.
///
/// Timeouts are in milliseconds; 0 disables the deadline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deadline for a registry metadata lookup
    pub registry_timeout_ms: u64,

    /// Deadline for an artifact fetch
    pub fetch_timeout_ms: u64,

    /// Deadline for key-value store calls made on the load and predict paths
    pub store_timeout_ms: u64,

    /// Expiry of the `model:loaded:{id}` marker written after a load
    pub loaded_marker_ttl_seconds: u64,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.loaded_marker_ttl_seconds == 0 {
            return Err(crate::Error::config("Loaded marker TTL must be > 0"));
        }
        Ok(())
    }

    pub fn registry_timeout(&self) -> Option<Duration> {
        crate::traits::timeout_from_ms(self.registry_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        crate::traits::timeout_from_ms(self.fetch_timeout_ms)
    }

    pub fn store_timeout(&self) -> Option<Duration> {
        crate::traits::timeout_from_ms(self.store_timeout_ms)
    }

    pub fn loaded_marker_ttl(&self) -> Duration {
        Duration::from_secs(self.loaded_marker_ttl_seconds)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            registry_timeout_ms: 5_000,
            fetch_timeout_ms: 60_000,
            store_timeout_ms: 2_000,
            loaded_marker_ttl_seconds: 3_600,
        }
    }
}

/// Metrics recorder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Number of most recent samples aggregated by `stats`
    pub window_size: usize,

    /// Maximum samples kept per series; `None` keeps everything
    pub max_samples_per_series: Option<usize>,

    /// Deadline for metric store calls, in milliseconds
    pub store_timeout_ms: u64,
}

impl MetricsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(crate::Error::config("Metrics window size must be > 0"));
        }

        if let Some(cap) = self.max_samples_per_series {
            if cap < self.window_size {
                return Err(crate::Error::config(format!(
                    "Metrics retention cap ({}) must be >= window size ({})",
                    cap, self.window_size
                )));
            }
        }

        Ok(())
    }

    pub fn store_timeout(&self) -> Option<Duration> {
        crate::traits::timeout_from_ms(self.store_timeout_ms)
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            window_size: 100,
            max_samples_per_series: Some(10_000),
            store_timeout_ms: 2_000,
        }
    }
}

/// Feature store client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureStoreConfig {
    /// Namespace prepended to every feature key
    pub key_prefix: String,

    /// Expiry applied when a caller does not pass one
    pub default_ttl_seconds: u64,

    /// Deadline for each store call, in milliseconds
    pub store_timeout_ms: u64,
}

impl FeatureStoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.key_prefix.is_empty() {
            return Err(crate::Error::config("Feature key prefix cannot be empty"));
        }
        if self.key_prefix.contains('*') {
            return Err(crate::Error::config("Feature key prefix cannot contain '*'"));
        }
        if self.default_ttl_seconds == 0 {
            return Err(crate::Error::config("Feature default TTL must be > 0"));
        }
        Ok(())
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }

    pub fn store_timeout(&self) -> Option<Duration> {
        crate::traits::timeout_from_ms(self.store_timeout_ms)
    }
}

impl Default for FeatureStoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: "feature".to_string(),
            default_ttl_seconds: 3_600,
            store_timeout_ms: 2_000,
        }
    }
}

/// Local artifact and metadata locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Directory whose subdirectories play the role of buckets
    pub root: PathBuf,

    /// Directory holding `<model_id>.yaml` / `<model_id>.json` metadata files
    pub metadata_dir: PathBuf,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data/artifacts"),
            metadata_dir: PathBuf::from("./data/metadata"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive
    pub level: String,

    /// Log format (`text` or `json`)
    pub format: String,

    /// Include the event target
    pub show_target: bool,

    /// Include thread ids
    pub show_thread_ids: bool,
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<()> {
        match self.format.as_str() {
            "text" | "json" => Ok(()),
            other => Err(crate::Error::config(format!(
                "Unknown log format '{}', expected text or json",
                other
            ))),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            show_target: true,
            show_thread_ids: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ServeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.metrics.window_size, 100);
        assert_eq!(config.feature_store.key_prefix, "feature");
        assert_eq!(config.engine.loaded_marker_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn test_metrics_validation() {
        let mut config = MetricsConfig::default();
        config.window_size = 0;
        assert!(config.validate().is_err());

        let mut config = MetricsConfig::default();
        config.max_samples_per_series = Some(50);
        assert!(config.validate().is_err());

        config.max_samples_per_series = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_disables_deadline() {
        let mut config = EngineConfig::default();
        config.fetch_timeout_ms = 0;
        assert_eq!(config.fetch_timeout(), None);
        assert_eq!(config.registry_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_zero_ttls_rejected() {
        let mut config = ServeConfig::default();
        config.engine.loaded_marker_ttl_seconds = 0;
        assert!(matches!(config.validate(), Err(crate::Error::InvalidConfiguration(_))));

        let mut config = ServeConfig::default();
        config.feature_store.default_ttl_seconds = 0;
        assert!(matches!(config.validate(), Err(crate::Error::InvalidConfiguration(_))));

        assert!(ServeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_logging_validation() {
        let mut config = LoggingConfig::default();
        config.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "engine:\n  fetch_timeout_ms: 1500\nmetrics:\n  max_samples_per_series: 500\nlogging:\n  format: json"
        )
        .unwrap();

        let config = ServeConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.engine.fetch_timeout_ms, 1500);
        assert_eq!(config.engine.registry_timeout_ms, 5_000);
        assert_eq!(config.metrics.max_samples_per_series, Some(500));
        assert_eq!(config.logging.format, "json");
    }
}
