//! The one timeout primitive every phase uses to bound a collaborator call.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{operation} timed out after {}ms", after.as_millis())]
pub struct TimedOut {
    pub operation: &'static str,
    pub after: Duration,
}

/// Races `fut` against a timer. On expiry the future is dropped; the caller
/// proceeds as if the operation failed.
pub async fn within<F>(operation: &'static str, limit: Duration, fut: F) -> Result<F::Output, TimedOut>
where
    F: Future,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(output) => Ok(output),
        Err(_) => {
            warn!("{} timed out after {:?}", operation, limit);
            Err(TimedOut {
                operation,
                after: limit,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_within_returns_output() {
        let result = within("quick", Duration::from_secs(1), async { 7 }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_within_bounds_hung_future() {
        let started = tokio::time::Instant::now();
        let result = within("hang", Duration::from_secs(3), std::future::pending::<()>()).await;

        let err = result.unwrap_err();
        assert_eq!(err.operation, "hang");
        assert_eq!(err.after, Duration::from_secs(3));
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert_eq!(err.to_string(), "hang timed out after 3000ms");
    }
}
