//! # Connectivity Probe
//!
//! A headless process has no browser `online`/`offline` events, so the
//! monitor is fed by pinging the backend on a fixed interval.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use super::ConnectivityMonitor;
use crate::backend::LocationBackend;

pub struct ConnectivityProbe {
    backend: Arc<dyn LocationBackend>,
    monitor: ConnectivityMonitor,
    interval: Duration,
}

impl ConnectivityProbe {
    pub fn new(
        backend: Arc<dyn LocationBackend>,
        monitor: ConnectivityMonitor,
        interval: Duration,
    ) -> Self {
        Self {
            backend,
            monitor,
            interval,
        }
    }

    /// Ping once and feed the result to the monitor
    pub async fn probe_once(&self) -> bool {
        let online = match self.backend.ping().await {
            Ok(()) => true,
            Err(e) => {
                debug!("Connectivity probe failed: {}", e);
                false
            }
        };
        self.monitor.set_online(online);
        online
    }

    /// Probe every interval until `shutdown` resolves
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    self.probe_once().await;
                }
            }
        }
    }
}
