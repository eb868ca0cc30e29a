//! MpdWatcher - keeps an idle connection open and republishes notifications
//!
//! Connects, authenticates if a password is configured, then loops on the
//! blocking idle wait, publishing one `MpdChanged` per notification. Lost
//! connections are retried with exponential backoff until shutdown.

mod retry;

pub use retry::{run_with_retry, RetryConfig};

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::bus::{BusEvent, SharedBus};
use crate::client::Connection;
use crate::config::Config;

pub struct MpdWatcher {
    config: Config,
    bus: SharedBus,
    shutdown: CancellationToken,
}

impl MpdWatcher {
    pub fn new(config: Config, bus: SharedBus, shutdown: CancellationToken) -> Self {
        Self {
            config,
            bus,
            shutdown,
        }
    }

    /// Run until `shutdown` fires, reconnecting after failures.
    /// Publishes `WatcherStopped` on exit.
    pub async fn run(self, retry: RetryConfig) {
        let name = format!("mpd-watcher[{}]", self.config.address());
        run_with_retry(&name, &retry, &self.shutdown, || self.run_once()).await;

        self.bus.publish(BusEvent::WatcherStopped);
        info!("{}: stopped", name);
    }

    /// One connection lifetime. `Ok` only on shutdown.
    async fn run_once(&self) -> Result<()> {
        let host = self.config.address();
        let mut conn = Connection::open(&self.config.host, self.config.port, self.config.timeout())
            .await
            .with_context(|| format!("connecting to {}", host))?;

        if let Some(ref password) = self.config.password {
            if let Err(e) = conn.password(password).await {
                conn.close().await;
                return Err(e).context("authentication failed");
            }
        }

        self.bus.publish(BusEvent::MpdConnected {
            host: host.clone(),
            version: conn.version().to_string(),
        });

        let canceller = conn.idle_canceller();
        let result = loop {
            if self.shutdown.is_cancelled() {
                break Ok(());
            }

            let bus = self.bus.clone();
            let changed_host = host.clone();
            let idle = conn.idle(move |flags| {
                bus.publish(BusEvent::MpdChanged {
                    host: changed_host,
                    subsystems: flags.names().into_iter().map(String::from).collect(),
                });
            });
            tokio::pin!(idle);

            // The idle wait is polled first so it has entered idle mode
            // before shutdown turns into a cancel; the connection then
            // leaves idle cleanly instead of being dropped mid-wait.
            let notified = tokio::select! {
                biased;
                notified = &mut idle => notified,
                _ = self.shutdown.cancelled() => {
                    canceller.cancel();
                    idle.await
                }
            };

            match notified {
                Ok(Some(_)) => continue,
                Ok(None) => break Ok(()),
                Err(e) => break Err(anyhow::Error::new(e).context("idle wait failed")),
            }
        };

        conn.close().await;
        self.bus.publish(BusEvent::MpdDisconnected { host });
        result
    }
}
