//! Command implementations for the modelserve CLI

pub mod config;
pub mod demo;
pub mod models;
pub mod predict;
