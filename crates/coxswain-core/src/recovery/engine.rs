//! Retry orchestration around fallible operations.

use std::future::Future;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::recovery::classifier;
use crate::recovery::strategy::RetryStrategy;

/// Run `operation` with classification-driven retries.
///
/// The strategy is resolved from the first failure's classification and
/// kept for the whole loop, so a network error that later times out still
/// backs off on the network schedule. Exhausting the strategy returns the
/// last error unchanged.
pub async fn execute_with_recovery<T, F, Fut>(operation_name: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    let mut selected: Option<RetryStrategy> = None;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(
                        operation = operation_name,
                        attempts = attempt,
                        "Operation succeeded after retries"
                    );
                }
                return Ok(value);
            }
            Err(error) => {
                let kind = classifier::classify_error(&error);
                debug!(
                    operation = operation_name,
                    attempt,
                    kind = kind.as_str(),
                    error = %error,
                    "Operation failed"
                );

                let strategy = *selected.get_or_insert_with(|| RetryStrategy::for_kind(kind));

                if !strategy.should_retry(attempt) {
                    warn!(
                        operation = operation_name,
                        attempts = attempt,
                        kind = kind.as_str(),
                        "Giving up on operation"
                    );
                    if let Some(hint) = classifier::recovery_hint(kind) {
                        info!(operation = operation_name, hint, "Recovery hint");
                    }
                    return Err(error);
                }

                if let Some(hint) = classifier::recovery_hint(kind) {
                    debug!(operation = operation_name, hint, "Recovery hint");
                }
                strategy.wait(attempt).await;
            }
        }
    }
}
