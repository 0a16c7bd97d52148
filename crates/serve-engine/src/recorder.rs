//! Per-model latency and confidence series with on-demand aggregates
//!
//! Samples are appended to time-ordered series in the key-value store under
//! `model:metrics:{kind}:{model_id}`; counters live under
//! `model:stats:{model_id}:*`. Every model owns its own keys, so writers for
//! different models never touch the same entry.

use crate::deadline::bounded;
use chrono::{DateTime, Utc};
use serve_core::{KeyValueStore, MetricKind, MetricSample, MetricsConfig, ModelStats, Result};
use std::sync::Arc;
use tracing::{debug, warn};

pub fn series_key(kind: MetricKind, model_id: &str) -> String {
    format!("model:metrics:{}:{}", kind, model_id)
}

pub fn predictions_key(model_id: &str) -> String {
    format!("model:stats:{}:predictions", model_id)
}

pub fn last_prediction_key(model_id: &str) -> String {
    format!("model:stats:{}:last_prediction", model_id)
}

/// Appends metric samples and derives [`ModelStats`]
#[derive(Clone)]
pub struct MetricsRecorder {
    store: Arc<dyn KeyValueStore>,
    config: MetricsConfig,
}

impl MetricsRecorder {
    pub fn new(store: Arc<dyn KeyValueStore>, config: MetricsConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Record one prediction. The confidence sample is skipped when absent.
    ///
    /// The writes are not atomic. The counter and last-prediction time are
    /// written before the samples, so a failed append can leave the counter
    /// one ahead of the series but never behind it.
    pub async fn record(
        &self,
        model_id: &str,
        latency_ms: f64,
        confidence: Option<f64>,
    ) -> Result<()> {
        let latency = MetricSample::new(latency_ms);
        let recorded_at = latency.timestamp;

        let timeout = self.config.store_timeout();
        bounded(
            timeout,
            "prediction counter update",
            self.store.incr(&predictions_key(model_id), 1),
        )
        .await?;
        bounded(
            timeout,
            "last prediction update",
            self.store
                .set(&last_prediction_key(model_id), recorded_at.to_rfc3339(), None),
        )
        .await?;

        self.append(MetricKind::Latency, model_id, latency).await?;
        if let Some(confidence) = confidence {
            self.append(MetricKind::Confidence, model_id, MetricSample::new(confidence))
                .await?;
        }

        debug!(
            "Recorded prediction for {}: {:.3}ms, confidence {:?}",
            model_id, latency_ms, confidence
        );
        Ok(())
    }

    async fn append(&self, kind: MetricKind, model_id: &str, sample: MetricSample) -> Result<()> {
        let key = series_key(kind, model_id);
        let member = serde_json::to_string(&sample)?;
        let timeout = self.config.store_timeout();

        bounded(
            timeout,
            "metric append",
            self.store.series_append(&key, sample.score(), member),
        )
        .await?;

        if let Some(cap) = self.config.max_samples_per_series {
            let removed = bounded(timeout, "metric trim", self.store.series_trim(&key, cap)).await?;
            if removed > 0 {
                debug!("Trimmed {} old samples from {}", removed, key);
            }
        }

        Ok(())
    }

    /// Newest `window_size` samples of a series, newest first
    pub async fn recent(&self, kind: MetricKind, model_id: &str) -> Result<Vec<MetricSample>> {
        let key = series_key(kind, model_id);
        let members = bounded(
            self.config.store_timeout(),
            "metric read",
            self.store.series_latest(&key, self.config.window_size),
        )
        .await?;

        Ok(members
            .iter()
            .filter_map(|member| match serde_json::from_str::<MetricSample>(member) {
                Ok(sample) => Some(sample),
                Err(e) => {
                    warn!("Skipping unreadable sample in {}: {}", key, e);
                    None
                }
            })
            .collect())
    }

    /// Aggregate statistics over the most recent window of samples
    pub async fn stats(&self, model_id: &str) -> Result<ModelStats> {
        let latencies = self.recent(MetricKind::Latency, model_id).await?;
        let confidences = self.recent(MetricKind::Confidence, model_id).await?;
        let timeout = self.config.store_timeout();

        let total_predictions = bounded(
            timeout,
            "prediction counter read",
            self.store.get(&predictions_key(model_id)),
        )
        .await?
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

        let last_prediction_time = bounded(
            timeout,
            "last prediction read",
            self.store.get(&last_prediction_key(model_id)),
        )
        .await?
        .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
        .map(|t| t.with_timezone(&Utc));

        let mut values: Vec<f64> = latencies.iter().map(|s| s.value).collect();
        values.sort_by(f64::total_cmp);

        let average_confidence = (!confidences.is_empty())
            .then(|| mean(confidences.iter().map(|s| s.value)));

        Ok(ModelStats {
            model_id: model_id.to_string(),
            total_predictions,
            last_prediction_time,
            average_latency_ms: if values.is_empty() {
                0.0
            } else {
                mean(values.iter().copied())
            },
            p95_latency_ms: percentile(&values, 95),
            p99_latency_ms: percentile(&values, 99),
            average_confidence,
        })
    }
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecorder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn mean(values: impl ExactSizeIterator<Item = f64>) -> f64 {
    let n = values.len();
    values.sum::<f64>() / n as f64
}

/// Nearest-rank percentile of ascending `sorted`; 0.0 when empty
pub fn percentile(sorted: &[f64], p: usize) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p * sorted.len()).div_ceil(100).clamp(1, sorted.len());
    sorted[rank - 1]
}
