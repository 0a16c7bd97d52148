//! Configuration and logging setup for the modelserve CLI

use anyhow::{Context, Result};
use serve_core::{LoggingConfig, ServeConfig};
use std::path::Path;

/// Load the serving configuration.
///
/// An explicit `--config` file replaces the default search path; environment
/// overrides apply only to the default search.
pub fn load_config(path: Option<&Path>) -> Result<ServeConfig> {
    match path {
        Some(path) => ServeConfig::load_from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => ServeConfig::load().context("failed to load configuration"),
    }
}

/// Initialize tracing from the logging section; `RUST_LOG` wins when set
pub fn init_logging(logging: &LoggingConfig, verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(logging.show_target)
        .with_thread_ids(logging.show_thread_ids)
        .with_writer(std::io::stderr);

    let installed = match logging.format.as_str() {
        "json" => subscriber.json().try_init(),
        _ => subscriber.try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install log subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_explicit_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("modelserve.yaml");
        std::fs::write(
            &file,
            "engine:\n  fetch_timeout_ms: 250\nmetrics:\n  window_size: 50\n",
        )
        .unwrap();

        let config = load_config(Some(&file)).unwrap();
        assert_eq!(config.engine.fetch_timeout_ms, 250);
        assert_eq!(config.metrics.window_size, 50);
        assert_eq!(config.feature_store.key_prefix, "feature");
    }

    #[test]
    fn test_invalid_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("modelserve.yaml");
        std::fs::write(&file, "logging:\n  format: xml\n").unwrap();

        let err = load_config(Some(&file)).unwrap_err();
        assert!(err.to_string().contains("failed to load configuration"));
    }
}
