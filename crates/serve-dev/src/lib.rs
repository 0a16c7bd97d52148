//! # serve-dev
//!
//! Development and testing utilities for modelserve.
//!
//! This crate provides:
//! - Mock artifact store and model registry with simulated latency and failures
//! - Filesystem-backed artifact store and registry for local serving
//! - Model fixtures covering every supported framework
//! - Test logging and random input generation

pub mod fixtures;
pub mod fs;
pub mod mock_stores;
pub mod utils;

// Re-export commonly used types
pub use fixtures::ModelFixture;
pub use fs::{FileModelRegistry, FsArtifactStore};
pub use mock_stores::{MockArtifactStore, MockBehavior, MockModelRegistry};
pub use utils::{create_test_config, generate_test_data, setup_test_logging, TestDataGenerator};
