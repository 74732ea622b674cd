//! # Fix Log Provider
//!
//! A [`PositionProvider`] that replays position fixes from a JSON Lines file.
//! Used by the command-line front end on machines without a positioning
//! device, and for reproducing field sessions.
//!
//! ## Format
//!
//! One JSON object per line; blank lines and lines starting with `#` are
//! skipped:
//!
//! ```text
//! {"latitude": 51.5074, "longitude": -0.1278, "accuracy": 25.0, "delay_ms": 500}
//! {"error": "timeout"}
//! ```
//!
//! `error` is one of `permission_denied`, `position_unavailable`, `timeout`.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::provider::{PositionProvider, PositionSample, SampleSink, WatchId, WatchOptions};
use crate::error::{DeviceError, LocatorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum LoggedError {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
}

impl From<LoggedError> for DeviceError {
    fn from(e: LoggedError) -> Self {
        match e {
            LoggedError::PermissionDenied => DeviceError::PermissionDenied,
            LoggedError::PositionUnavailable => DeviceError::PositionUnavailable,
            LoggedError::Timeout => DeviceError::Timeout,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct FixLogEntry {
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default)]
    accuracy: Option<f64>,
    #[serde(default)]
    delay_ms: u64,
    #[serde(default)]
    error: Option<LoggedError>,
}

impl FixLogEntry {
    fn to_event(&self) -> Option<std::result::Result<PositionSample, DeviceError>> {
        if let Some(e) = self.error {
            return Some(Err(e.into()));
        }
        match (self.latitude, self.longitude, self.accuracy) {
            (Some(lat), Some(lon), Some(acc)) => Some(Ok(PositionSample::new(lat, lon, acc))),
            _ => None,
        }
    }
}

pub struct FixLogProvider {
    entries: Vec<FixLogEntry>,
    tasks: Mutex<HashMap<WatchId, JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl FixLogProvider {
    /// Read and parse a fix log
    ///
    /// # Errors
    ///
    /// Returns [`LocatorError::Io`] if the file cannot be read and
    /// [`LocatorError::InvalidInput`] naming the line if an entry is malformed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for (lineno, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let entry: FixLogEntry = serde_json::from_str(line).map_err(|e| {
                LocatorError::InvalidInput(format!("fix log line {}: {}", lineno + 1, e))
            })?;
            if entry.to_event().is_none() {
                return Err(LocatorError::InvalidInput(format!(
                    "fix log line {}: needs latitude, longitude and accuracy, or error",
                    lineno + 1
                )));
            }
            entries.push(entry);
        }
        Ok(Self {
            entries,
            ..Self::default()
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An empty log: every watch fails with [`DeviceError::Unsupported`]
impl Default for FixLogProvider {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            tasks: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl PositionProvider for FixLogProvider {
    /// Replay the log on a task of the current Tokio runtime
    ///
    /// Without a runtime the watch fails with [`DeviceError::Unsupported`].
    fn watch_position(
        &self,
        options: &WatchOptions,
        sink: SampleSink,
    ) -> std::result::Result<WatchId, DeviceError> {
        if self.entries.is_empty() {
            return Err(DeviceError::Unsupported);
        }
        let runtime = Handle::try_current().map_err(|e| {
            warn!("Fix log replay needs a Tokio runtime: {}", e);
            DeviceError::Unsupported
        })?;

        let id = WatchId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let entries = self.entries.clone();
        debug!(
            "Replaying {} logged fixes for watch {:?} (high_accuracy={})",
            entries.len(),
            id,
            options.high_accuracy
        );

        let task = runtime.spawn(async move {
            for entry in entries {
                if entry.delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(entry.delay_ms)).await;
                }
                if let Some(event) = entry.to_event() {
                    if sink.send(event).is_err() {
                        break;
                    }
                }
            }
        });

        match self.tasks.lock() {
            Ok(mut tasks) => {
                tasks.insert(id, task);
            }
            Err(_) => {
                warn!("Fix log task table poisoned, aborting watch {:?}", id);
                task.abort();
                return Err(DeviceError::PositionUnavailable);
            }
        }
        Ok(id)
    }

    fn clear_watch(&self, id: WatchId) {
        if let Ok(mut tasks) = self.tasks.lock() {
            if let Some(task) = tasks.remove(&id) {
                task.abort();
            }
        }
    }
}
