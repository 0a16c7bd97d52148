//! # serve-core
//!
//! Core types, traits, and utilities for modelserve - a low-latency model serving engine.
//!
//! This crate provides the foundational data structures and interfaces that are
//! shared across all other modelserve components. It includes:
//!
//! - Model metadata, feature values and prediction results
//! - Collaborator traits for artifact storage, the model registry and the key-value store
//! - Configuration schema and parsing utilities
//! - Error handling types and utilities

pub mod config;
pub mod error;
pub mod metadata;
pub mod prediction;
pub mod traits;
pub mod types;

// Re-export commonly used types at the crate root
pub use config::{
    ArtifactConfig, EngineConfig, FeatureStoreConfig, LoggingConfig, MetricsConfig, ServeConfig,
};
pub use error::{Error, ErrorContext, Result};
pub use metadata::{CategoricalEncoder, ModelMetadata};
pub use prediction::{MetricKind, MetricSample, ModelStats, PredictionResult};
pub use traits::{ArtifactStore, KeyValueStore, ModelRegistry};
pub use types::{ArtifactPath, FeatureMap, FeatureValue, FeatureVector, Framework, TaskKind};
