//! # Submission Pipeline
//!
//! Takes a finalized [`LocationCapture`] and gets it recorded, either on the
//! remote store right away or in the offline queue for later replay.
//!
//! ## Flow
//!
//! 1. **Validate**: unit set, coordinate in range. Failures are returned and
//!    never queued.
//! 2. **Offline?** Enqueue without touching the network.
//! 3. **Remote**: resolve the current user, then create the record.
//!    - connectivity-class failure: enqueue
//!    - unauthenticated: validation error (missing user)
//!    - rejected by the store: remote rejection
//! 4. **Enqueue**: report `Queued`, distinct from a confirmed `Recorded`.

use std::sync::Arc;
use tracing::{info, warn};

use crate::backend::{LocationBackend, LocationRecord, NewLocationRecord, UserId};
use crate::capture::LocationCapture;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{BackendError, LocatorError, Result, ValidationError};
use crate::queue::SharedQueue;

/// Why a capture went to the queue instead of the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueReason {
    /// Connectivity monitor reported offline; no request was made
    Offline,
    /// The request failed for a connectivity-class reason
    Unreachable(String),
}

/// Successful result of a submission
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Confirmed by the remote store
    Recorded {
        record: LocationRecord,
        recorded_by: UserId,
    },
    /// Saved locally for later sync
    Queued { pending: usize, reason: QueueReason },
}

impl SubmitOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, SubmitOutcome::Queued { .. })
    }

    /// Operator-facing notice
    pub fn user_message(&self) -> String {
        match self {
            SubmitOutcome::Recorded { .. } => "Location recorded.".to_string(),
            SubmitOutcome::Queued { pending, .. } => format!(
                "Saved for later sync ({} pending). It will be sent when you are back online.",
                pending
            ),
        }
    }
}

pub struct SubmissionPipeline {
    backend: Arc<dyn LocationBackend>,
    queue: SharedQueue,
    connectivity: ConnectivityMonitor,
}

impl SubmissionPipeline {
    pub fn new(
        backend: Arc<dyn LocationBackend>,
        queue: SharedQueue,
        connectivity: ConnectivityMonitor,
    ) -> Self {
        Self {
            backend,
            queue,
            connectivity,
        }
    }

    pub fn queue(&self) -> &SharedQueue {
        &self.queue
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    /// Record a capture remotely, or queue it when that is not possible
    ///
    /// # Errors
    ///
    /// - [`LocatorError::Validation`] for local validation failures and a
    ///   missing authenticated user
    /// - [`LocatorError::RemoteRejection`] when the store refuses the record
    /// - [`LocatorError::Storage`] if the capture had to be queued and the
    ///   queue could not be written
    pub async fn submit(&self, capture: &LocationCapture) -> Result<SubmitOutcome> {
        capture.validate()?;

        if !self.connectivity.is_online() {
            info!("Offline, queueing location for unit {}", capture.unit_id());
            return self.enqueue(capture, QueueReason::Offline).await;
        }

        match self.persist_remote(capture).await {
            Ok((record, recorded_by)) => {
                info!(
                    "Recorded location for unit {} at {} (by {})",
                    capture.unit_id(),
                    capture.coordinate(),
                    recorded_by
                );
                Ok(SubmitOutcome::Recorded {
                    record,
                    recorded_by,
                })
            }
            Err(BackendError::Connectivity(reason)) => {
                warn!(
                    "Backend unreachable ({}), queueing location for unit {}",
                    reason,
                    capture.unit_id()
                );
                self.enqueue(capture, QueueReason::Unreachable(reason)).await
            }
            Err(e) => Err(terminal_error(e)),
        }
    }

    /// The remote-persistence step on its own, shared with queue replay
    pub async fn persist_remote(
        &self,
        capture: &LocationCapture,
    ) -> std::result::Result<(LocationRecord, UserId), BackendError> {
        let user = self.backend.current_user().await?;
        let record = self
            .backend
            .create_location_record(&NewLocationRecord::from(capture))
            .await?;
        Ok((record, user))
    }

    async fn enqueue(&self, capture: &LocationCapture, reason: QueueReason) -> Result<SubmitOutcome> {
        let pending = self.queue.lock().await.enqueue(capture.clone())?;
        Ok(SubmitOutcome::Queued { pending, reason })
    }
}

/// Map a non-retryable backend error onto the user-facing taxonomy
pub(crate) fn terminal_error(e: BackendError) -> LocatorError {
    match e {
        BackendError::Unauthenticated(_) => ValidationError::MissingUser.into(),
        BackendError::Rejected(message) => LocatorError::RemoteRejection(message),
        BackendError::Connectivity(message) => LocatorError::RemoteRejection(message),
    }
}
