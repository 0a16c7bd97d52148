//! Deadlines for collaborator calls

use serve_core::{Error, Result};
use std::future::Future;
use std::time::Duration;

/// Await `fut`, failing with `Error::Timeout` once `limit` elapses.
///
/// `None` waits without a deadline.
pub async fn bounded<F, T>(limit: Option<Duration>, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            Error::timeout(format!("{} did not complete within {:?}", operation, limit))
        })?,
        None => fut.await,
    }
}
