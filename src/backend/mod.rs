//! # Backend Module
//!
//! Contracts with the hosted data store that owns units, users and location
//! history. The capture workflow only needs three calls:
//!
//! - create a location record for a unit
//! - resolve the authenticated user the record is attributed to
//! - check that the store is reachable at all

pub mod rest;

use async_trait::async_trait;
use std::fmt;

use crate::capture::LocationCapture;
use crate::error::BackendError;

/// Identifier of the authenticated user recording locations
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Arguments of the create-location-record call
#[derive(Debug, Clone, PartialEq)]
pub struct NewLocationRecord {
    pub unit_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub notes: Option<String>,
}

impl From<&LocationCapture> for NewLocationRecord {
    fn from(capture: &LocationCapture) -> Self {
        let coordinate = capture.coordinate();
        Self {
            unit_id: capture.unit_id().as_str().to_string(),
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
            notes: capture.notes().map(str::to_string),
        }
    }
}

/// The store's confirmation of a persisted record
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LocationRecord {
    pub record_id: Option<String>,
    pub message: Option<String>,
}

/// Remote persistence used by the submission pipeline and the replayer
#[async_trait]
pub trait LocationBackend: Send + Sync {
    async fn create_location_record(
        &self,
        record: &NewLocationRecord,
    ) -> Result<LocationRecord, BackendError>;

    async fn current_user(&self) -> Result<UserId, BackendError>;

    /// Succeeds if the store answered at all, whatever the status
    async fn ping(&self) -> Result<(), BackendError>;
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Backend that records every create call and answers from a script
    ///
    /// Unscripted creates succeed.
    #[derive(Clone)]
    pub struct RecordingBackend {
        pub created: Arc<Mutex<Vec<NewLocationRecord>>>,
        pub create_results: Arc<Mutex<VecDeque<Result<LocationRecord, BackendError>>>>,
        pub user: Arc<Mutex<Result<UserId, BackendError>>>,
        pub reachable: Arc<Mutex<bool>>,
    }

    impl RecordingBackend {
        pub fn new() -> Self {
            Self {
                created: Arc::new(Mutex::new(Vec::new())),
                create_results: Arc::new(Mutex::new(VecDeque::new())),
                user: Arc::new(Mutex::new(Ok(UserId("user-1".to_string())))),
                reachable: Arc::new(Mutex::new(true)),
            }
        }

        pub fn script(&self, result: Result<LocationRecord, BackendError>) {
            self.create_results.lock().unwrap().push_back(result);
        }

        pub fn set_user(&self, user: Result<UserId, BackendError>) {
            *self.user.lock().unwrap() = user;
        }

        pub fn set_reachable(&self, reachable: bool) {
            *self.reachable.lock().unwrap() = reachable;
        }

        pub fn created_units(&self) -> Vec<String> {
            self.created
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.unit_id.clone())
                .collect()
        }

        pub fn create_calls(&self) -> usize {
            self.created.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LocationBackend for RecordingBackend {
        async fn create_location_record(
            &self,
            record: &NewLocationRecord,
        ) -> Result<LocationRecord, BackendError> {
            self.created.lock().unwrap().push(record.clone());
            self.create_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(LocationRecord::default()))
        }

        async fn current_user(&self) -> Result<UserId, BackendError> {
            self.user.lock().unwrap().clone()
        }

        async fn ping(&self) -> Result<(), BackendError> {
            if *self.reachable.lock().unwrap() {
                Ok(())
            } else {
                Err(BackendError::Connectivity("unreachable".to_string()))
            }
        }
    }
}
