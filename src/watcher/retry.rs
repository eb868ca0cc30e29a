//! Retry with exponential backoff for long-running connection tasks.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Retry configuration for the watcher's connect/run loop
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Initial delay between retry attempts
    pub initial_delay: Duration,
    /// Maximum delay (backoff caps at this value)
    pub max_delay: Duration,
    /// Minimum run time before resetting backoff on failure
    /// If an attempt runs for at least this long before failing,
    /// the backoff delay resets to initial_delay
    pub stable_run_threshold: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            stable_run_threshold: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Create a new RetryConfig with custom delays
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            stable_run_threshold: Duration::from_secs(30),
        }
    }
}

/// Run `attempt` until it returns `Ok` or `shutdown` fires.
///
/// `Err` from an attempt schedules another one after the current backoff
/// delay. The attempt itself must watch `shutdown` and return `Ok` when it
/// fires; it is never dropped mid-flight here.
pub async fn run_with_retry<F, Fut>(
    name: &str,
    config: &RetryConfig,
    shutdown: &CancellationToken,
    mut attempt: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut delay = config.initial_delay;

    loop {
        // Check for shutdown before attempting
        if shutdown.is_cancelled() {
            info!("{}: shutdown before attempt", name);
            break;
        }

        let start = Instant::now();
        match attempt().await {
            Ok(()) => {
                info!("{}: clean exit", name);
                break;
            }
            Err(e) => {
                let run_duration = start.elapsed();

                // Reset backoff if we had a stable run before failing
                if run_duration >= config.stable_run_threshold {
                    info!(
                        "{}: ran for {:?} before failure, resetting backoff",
                        name, run_duration
                    );
                    delay = config.initial_delay;
                }

                warn!("{}: error ({:#}), retrying in {:?}", name, e, delay);

                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("{}: shutdown during backoff", name);
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {
                        // Exponential backoff capped at max_delay
                        delay = (delay * 2).min(config.max_delay);
                    }
                }
            }
        }
    }
}
