use cinema_core::{StoreError, StoreResult};
use std::future::Future;
use std::time::Duration;

/// Runs a store call with an upper bound. Dropping the returned future
/// abandons the call.
pub(crate) async fn bounded<T, F>(limit: Duration, call: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}
