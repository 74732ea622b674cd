//! Trait abstraction for the device positioning API to enable testing

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::capture::Coordinate;
use crate::config::GeolocationConfig;
use crate::error::DeviceError;

/// A single fix reported by the positioning hardware
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    pub coordinate: Coordinate,
    /// Radius of the confidence circle in meters
    pub accuracy_m: f64,
    pub timestamp: DateTime<Utc>,
}

impl PositionSample {
    pub fn new(latitude: f64, longitude: f64, accuracy_m: f64) -> Self {
        Self {
            coordinate: Coordinate::new(latitude, longitude),
            accuracy_m,
            timestamp: Utc::now(),
        }
    }
}

/// What a provider delivers for each watch callback
pub type PositionEvent = Result<PositionSample, DeviceError>;

/// Channel end a provider pushes events into.
///
/// Sends after the watcher stopped fail silently; providers should ignore the
/// error.
pub type SampleSink = mpsc::UnboundedSender<PositionEvent>;

/// Handle for an active hardware watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(pub u64);

/// Options passed to the device when a watch starts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    /// Bounded wait per fix attempt
    pub timeout: Duration,
    /// Maximum age of a cached fix the device may return
    pub maximum_age: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_secs(30),
            maximum_age: Duration::ZERO,
        }
    }
}

impl From<&GeolocationConfig> for WatchOptions {
    fn from(config: &GeolocationConfig) -> Self {
        Self {
            high_accuracy: config.high_accuracy,
            timeout: Duration::from_millis(config.timeout_ms),
            maximum_age: Duration::from_millis(config.maximum_age_ms),
        }
    }
}

/// Continuous position updates from the host device
#[cfg_attr(test, mockall::automock)]
pub trait PositionProvider: Send + Sync {
    /// Begin pushing fixes and errors into `sink` until [`clear_watch`] is called
    ///
    /// [`clear_watch`]: PositionProvider::clear_watch
    fn watch_position(&self, options: &WatchOptions, sink: SampleSink)
        -> Result<WatchId, DeviceError>;

    /// Release the hardware handle. Must tolerate unknown or already-cleared ids.
    fn clear_watch(&self, id: WatchId);
}
