//! Scaffold a local demo workspace

use crate::output::{OutputFormat, OutputFormatter};
use anyhow::{Context, Result};
use serve_core::ServeConfig;
use serve_dev::fixtures::all_fixtures;
use serve_dev::FileModelRegistry;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEMO_CONFIG_FILE: &str = "modelserve.yaml";

/// Write every fixture model plus a configuration pointing at them.
///
/// Returns the path of the written configuration file.
pub async fn init_demo(dir: &Path, output_format: OutputFormat) -> Result<PathBuf> {
    let artifact_root = dir.join("artifacts");
    let registry = FileModelRegistry::new(dir.join("metadata"));

    let fixtures = all_fixtures();
    for fixture in &fixtures {
        fixture
            .write_to(&artifact_root, &registry)
            .await
            .with_context(|| format!("failed to write demo model {}", fixture.model_id()))?;
        info!("Wrote demo model {} to {}", fixture.model_id(), fixture.artifact_path);
    }

    let mut config = ServeConfig::default();
    config.artifacts.root = artifact_root;
    config.artifacts.metadata_dir = registry.dir().to_path_buf();

    let config_file = dir.join(DEMO_CONFIG_FILE);
    std::fs::write(&config_file, serde_yaml::to_string(&config)?)
        .with_context(|| format!("failed to write {}", config_file.display()))?;

    let names: Vec<&str> = fixtures.iter().map(|f| f.model_id()).collect();
    OutputFormatter::new(output_format).print_success(&format!(
        "Demo models [{}] ready; run with --config {}",
        names.join(", "),
        config_file.display()
    ))?;
    Ok(config_file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;
    use crate::engine::LocalEngine;
    use serve_core::{FeatureMap, FeatureValue};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_demo_workspace_serves_predictions() {
        let dir = TempDir::new().unwrap();
        let config_file = init_demo(dir.path(), OutputFormat::Json).await.unwrap();

        let config = load_config(Some(&config_file)).unwrap();
        assert_eq!(config.artifacts.root, dir.path().join("artifacts"));

        let engine = LocalEngine::from_config(&config).unwrap();
        engine.ensure_loaded("price-tree", None).await.unwrap();

        let features: FeatureMap =
            [("sqft".to_string(), FeatureValue::Number(800.0))].into_iter().collect();
        let result = engine.cache().predict("price-tree", &features).await.unwrap();
        assert_eq!(result.predicted_value, Some(150000.0));
    }

    #[tokio::test]
    async fn test_unknown_model_fails_to_load() {
        let dir = TempDir::new().unwrap();
        let config_file = init_demo(dir.path(), OutputFormat::Json).await.unwrap();
        let engine = LocalEngine::from_config(&load_config(Some(&config_file)).unwrap()).unwrap();

        let err = engine.ensure_loaded("ghost", None).await.unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }
}
