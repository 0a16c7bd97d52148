//! Prometheus metrics for the serving path

use prometheus::{CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use serve_core::{Error, Framework, Result};

const UNKNOWN_MODEL: &str = "unknown";

const LATENCY_BUCKETS_MS: &[f64] = &[
    0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0,
];

/// Counters and histograms exported by the model cache
#[derive(Debug, Clone)]
pub struct ServeMetrics {
    /// Predictions by model and outcome (`ok` or an error category)
    pub predictions_total: CounterVec,

    /// Dispatch latency in milliseconds
    pub prediction_latency_ms: HistogramVec,

    /// Load attempts by outcome
    pub loads_total: CounterVec,

    /// Models currently held in the cache
    pub loaded_models: Gauge,
}

impl ServeMetrics {
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            predictions_total: CounterVec::new(
                Opts::new("modelserve_predictions_total", "Total predictions served"),
                &["model", "status"],
            )?,
            prediction_latency_ms: HistogramVec::new(
                HistogramOpts::new(
                    "modelserve_prediction_latency_ms",
                    "Inference dispatch latency in milliseconds",
                )
                .buckets(LATENCY_BUCKETS_MS.to_vec()),
                &["model", "framework"],
            )?,
            loads_total: CounterVec::new(
                Opts::new("modelserve_model_loads_total", "Total model load attempts"),
                &["outcome"],
            )?,
            loaded_models: Gauge::with_opts(Opts::new(
                "modelserve_loaded_models",
                "Number of models held in the cache",
            ))?,
        })
    }

    /// Register all metrics with the given registry
    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.predictions_total.clone()))?;
        registry.register(Box::new(self.prediction_latency_ms.clone()))?;
        registry.register(Box::new(self.loads_total.clone()))?;
        registry.register(Box::new(self.loaded_models.clone()))?;
        Ok(())
    }

    pub fn observe_prediction(&self, model_id: &str, framework: Framework, latency_ms: f64) {
        self.predictions_total
            .with_label_values(&[model_id, "ok"])
            .inc();
        self.prediction_latency_ms
            .with_label_values(&[model_id, framework.as_str()])
            .observe(latency_ms);
    }

    /// Ids of models that are not loaded share the `unknown` label
    pub fn observe_prediction_error(&self, model_id: &str, error: &Error) {
        let model = match error {
            Error::ModelNotLoaded(_) => UNKNOWN_MODEL,
            _ => model_id,
        };
        self.predictions_total
            .with_label_values(&[model, error.category()])
            .inc();
    }

    pub fn observe_load(&self, outcome: &Result<()>) {
        let label = match outcome {
            Ok(()) => "ok",
            Err(e) => e.category(),
        };
        self.loads_total.with_label_values(&[label]).inc();
    }

    pub fn set_loaded_models(&self, count: usize) {
        self.loaded_models.set(count as f64);
    }
}

/// Render every metric in `registry` in the Prometheus text format
pub fn render(registry: &Registry) -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .map_err(|e| Error::internal(format!("failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer).map_err(|e| Error::internal(format!("metrics are not UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_render() {
        let registry = Registry::new();
        let metrics = ServeMetrics::new().unwrap();
        metrics.register(&registry).unwrap();

        metrics.observe_prediction("churn", Framework::TabularEstimator, 1.5);
        metrics.observe_prediction_error("churn", &Error::missing_feature("age"));
        metrics.observe_load(&Ok(()));
        metrics.observe_load(&Err(Error::download("gone")));
        metrics.set_loaded_models(1);

        let text = render(&registry).unwrap();
        assert!(text.contains("modelserve_predictions_total"));
        assert!(text.contains("status=\"ok\""));
        assert!(text.contains("modelserve_prediction_latency_ms_bucket"));
        assert!(text.contains("modelserve_loaded_models 1"));
    }

    #[test]
    fn test_unloaded_models_share_one_series() {
        let registry = Registry::new();
        let metrics = ServeMetrics::new().unwrap();
        metrics.register(&registry).unwrap();

        for i in 0..20 {
            let id = format!("ghost-{}", i);
            metrics.observe_prediction_error(&id, &Error::model_not_loaded(&id));
        }

        let text = render(&registry).unwrap();
        assert!(!text.contains("ghost-"));
        assert!(text.contains("model=\"unknown\",status=\"model_not_loaded\"} 20"));
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        let metrics = ServeMetrics::new().unwrap();
        metrics.register(&registry).unwrap();
        assert!(metrics.register(&registry).is_err());
    }
}
