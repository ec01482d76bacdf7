//! Retry wrapper for database calls that can fail transiently under write contention.

use std::{future::Future, time::Duration};

use backon::{ExponentialBuilder, Retryable};
use tracing::warn;

// SQLITE_BUSY, SQLITE_LOCKED, SQLITE_LOCKED_SHAREDCACHE, SQLITE_BUSY_SNAPSHOT
const TRANSIENT_SQLITE_CODES: &[&str] = &["5", "6", "262", "517"];

/// Returns true if the error is transient and the statement should be retried.
pub fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db_err) => db_err
            .code()
            .as_deref()
            .is_some_and(|code| TRANSIENT_SQLITE_CODES.contains(&code)),
        _ => false,
    }
}

/// Run `f`, retrying with exponential backoff while it fails with a transient error.
pub async fn with_retry<T, F, Fut>(operation: &str, f: F) -> Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    f.retry(
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(50))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(3)
            .with_jitter(),
    )
    .when(is_transient)
    .notify(|e, dur| {
        warn!(
            operation = operation,
            "Database call failed, retrying after {:.2}s: {}",
            dur.as_secs_f64(),
            e
        )
    })
    .await
}
