//! # serve-engine
//!
//! The serving engine of modelserve: loads model artifacts into an in-process
//! cache, turns named features into model input, dispatches inference per
//! framework and records per-model latency and confidence.
//!
//! ## Components
//!
//! - [`ModelCacheManager`] owns loaded models and guarantees one load per id
//! - [`assembler`] builds ordered feature vectors from named values
//! - [`dispatch`] decodes artifacts and runs inference
//! - [`MetricsRecorder`] appends samples and computes statistics
//! - [`FeatureStoreClient`] caches entity features with a TTL
//! - [`PredictionService`] merges stored and request features per call

pub mod assembler;
pub mod cache;
pub mod deadline;
pub mod dispatch;
pub mod feature_store;
pub mod kv;
pub mod model;
pub mod recorder;
pub mod service;
pub mod telemetry;

pub use assembler::assemble;
pub use cache::{LoadHandle, ModelCacheManager};
pub use dispatch::{decode_artifact, InferenceBackend, InferenceDispatcher, RawOutput};
pub use feature_store::FeatureStoreClient;
pub use kv::MemoryKeyValueStore;
pub use model::{LoadedMarker, LoadedModel};
pub use recorder::MetricsRecorder;
pub use service::{BatchItem, BatchResponse, PredictionRequest, PredictionResponse, PredictionService};
pub use telemetry::ServeMetrics;
