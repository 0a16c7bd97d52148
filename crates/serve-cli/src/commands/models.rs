//! Model inspection and load-testing commands

use crate::engine::LocalEngine;
use crate::output::{OutputFormat, OutputFormatter};
use anyhow::{Context, Result};
use serve_dev::generate_test_data;
use tracing::info;

/// Load a model and show its metadata
pub async fn describe_model(
    engine: &LocalEngine,
    model_id: &str,
    artifact: Option<&str>,
    output_format: OutputFormat,
) -> Result<()> {
    engine.ensure_loaded(model_id, artifact).await?;
    let metadata = engine
        .cache()
        .metadata(model_id)
        .with_context(|| format!("model {} disappeared after loading", model_id))?;

    OutputFormatter::new(output_format).print_item(&metadata)
}

/// Run `requests` random predictions and report the recorded statistics
pub async fn bench_model(
    engine: &LocalEngine,
    model_id: &str,
    artifact: Option<&str>,
    requests: usize,
    show_metrics: bool,
    output_format: OutputFormat,
) -> Result<()> {
    engine.ensure_loaded(model_id, artifact).await?;
    let metadata = engine
        .cache()
        .metadata(model_id)
        .with_context(|| format!("model {} disappeared after loading", model_id))?;

    let formatter = OutputFormatter::new(output_format);
    let mut generator = generate_test_data();
    let mut failures = 0usize;

    for _ in 0..requests {
        let features = generator.random_features(&metadata);
        if engine.cache().predict(model_id, &features).await.is_err() {
            failures += 1;
        }
    }
    info!("Ran {} predictions against {} ({} failed)", requests, model_id, failures);

    if failures > 0 {
        formatter.print_warning(&format!("{} of {} predictions failed", failures, requests))?;
    }

    let stats = engine.cache().stats(model_id).await?;
    formatter.print_item(&stats)?;

    if show_metrics {
        formatter.print_raw(&serve_engine::telemetry::render(&engine.registry)?);
    }
    Ok(())
}
