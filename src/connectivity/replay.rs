//! # Queue Replay
//!
//! Drains the offline queue through the pipeline's remote-persistence step
//! once connectivity returns.
//!
//! ## Algorithm
//!
//! While online and the queue is non-empty: take the oldest entry, persist
//! it remotely, and remove it only after the store confirmed it. The first
//! failure halts the pass without skipping ahead, so the queue keeps its
//! order and the failed entry is retried first next time.
//!
//! Only one pass runs at a time. The queue lock is never held across a
//! network call. Each step reloads the stored queue first, so captures queued
//! by other processes are picked up, and a sent entry is only removed if it
//! is still the stored head.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{error, info, warn};

use super::ConnectivityEvent;
use crate::capture::UnitId;
use crate::error::BackendError;
use crate::pipeline::SubmissionPipeline;

/// Why a replay pass stopped before emptying the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayStop {
    /// Another pass is already draining the queue
    AlreadyRunning,
    /// Connectivity dropped mid-pass
    WentOffline,
    /// The head entry could not reach the store
    Unreachable(String),
    /// The store refused the head entry; it stays queued until resolved
    Rejected { unit_id: UnitId, message: String },
    /// The head entry was sent but the queue could not be rewritten
    Storage(String),
}

/// Summary of one replay pass
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReplayReport {
    pub replayed: usize,
    pub remaining: usize,
    pub stopped: Option<ReplayStop>,
}

impl ReplayReport {
    pub fn is_complete(&self) -> bool {
        self.stopped.is_none() && self.remaining == 0
    }
}

pub struct QueueReplayer {
    pipeline: Arc<SubmissionPipeline>,
    pass: Mutex<()>,
    recheck: Option<Duration>,
}

impl QueueReplayer {
    pub fn new(pipeline: Arc<SubmissionPipeline>) -> Self {
        Self {
            pipeline,
            pass: Mutex::new(()),
            recheck: None,
        }
    }

    /// Also look for stored entries every `every` while online
    ///
    /// Catches captures queued by another process while this one stayed
    /// online, which never produce a transition here.
    pub fn with_recheck(mut self, every: Duration) -> Self {
        self.recheck = Some(every);
        self
    }

    /// Run one replay pass now ("sync now")
    pub async fn replay(&self) -> ReplayReport {
        let _pass = match self.pass.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                return ReplayReport {
                    remaining: self.pipeline.queue().lock().await.count(),
                    stopped: Some(ReplayStop::AlreadyRunning),
                    ..ReplayReport::default()
                };
            }
        };

        let queue = self.pipeline.queue();
        let mut report = ReplayReport::default();

        loop {
            let head = {
                let mut queue = queue.lock().await;
                if let Err(e) = queue.refresh() {
                    error!("Offline queue could not be reloaded: {}", e);
                    report.stopped = Some(ReplayStop::Storage(e.to_string()));
                    break;
                }
                queue.peek_oldest().cloned()
            };
            let head = match head {
                Some(head) => head,
                None => break,
            };

            if !self.pipeline.connectivity().is_online() {
                report.stopped = Some(ReplayStop::WentOffline);
                break;
            }

            match self.pipeline.persist_remote(&head.capture).await {
                Ok(_) => {
                    // A `None` means another holder already removed it
                    if let Err(e) = queue.lock().await.remove_if_oldest(&head) {
                        error!("Replayed entry could not be removed from queue: {}", e);
                        report.stopped = Some(ReplayStop::Storage(e.to_string()));
                        break;
                    }
                    report.replayed += 1;
                    info!(
                        "Replayed queued location for unit {} (queued at {})",
                        head.capture.unit_id(),
                        head.enqueued_at
                    );
                }
                Err(BackendError::Connectivity(reason)) => {
                    warn!("Replay halted, backend unreachable: {}", reason);
                    report.stopped = Some(ReplayStop::Unreachable(reason));
                    break;
                }
                Err(e) => {
                    warn!(
                        "Replay halted, queued location for unit {} refused: {}",
                        head.capture.unit_id(),
                        e
                    );
                    report.stopped = Some(ReplayStop::Rejected {
                        unit_id: head.capture.unit_id().clone(),
                        message: e.to_string(),
                    });
                    break;
                }
            }
        }

        report.remaining = queue.lock().await.count();
        if report.replayed > 0 || report.stopped.is_some() {
            info!(
                "Replay pass finished: {} replayed, {} remaining",
                report.replayed, report.remaining
            );
        }
        report
    }

    /// Replay on every offline→online transition until `shutdown` resolves
    ///
    /// A pass also runs at startup when already online with entries queued,
    /// which covers captures left over from a previous run.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let connectivity = self.pipeline.connectivity().clone();
        let mut events = connectivity.subscribe();
        let mut recheck = self.recheck.map(|every| {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        tokio::pin!(shutdown);

        if connectivity.is_online() && self.has_pending().await {
            self.replay().await;
        }

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = next_tick(recheck.as_mut()) => {
                    if connectivity.is_online() && self.has_pending().await {
                        self.replay().await;
                    }
                }
                event = events.recv() => match event {
                    Ok(ConnectivityEvent::WentOnline) => {
                        self.replay().await;
                    }
                    Ok(ConnectivityEvent::WentOffline) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Missed {} connectivity events", skipped);
                        if connectivity.is_online() {
                            self.replay().await;
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    }

    async fn has_pending(&self) -> bool {
        let mut queue = self.pipeline.queue().lock().await;
        if let Err(e) = queue.refresh() {
            warn!("Offline queue could not be reloaded: {}", e);
        }
        !queue.is_empty()
    }
}

async fn next_tick(ticker: Option<&mut Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
