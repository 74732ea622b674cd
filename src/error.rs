//! # Error Types
//!
//! Custom error types for Unit Locator using `thiserror`.
//!
//! The taxonomy follows how each failure is surfaced to the operator:
//!
//! - [`ValidationError`]: terminal, shown immediately, never queued
//! - [`DeviceError`]: recoverable locally (retry sampling or go manual)
//! - [`BackendError`]: split into connectivity-class failures (absorbed by the
//!   submission pipeline and queued) and remote rejections (terminal)

use thiserror::Error;

/// A capture failed local validation before any network or queue interaction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// No unit was selected for the capture
    #[error("no unit selected")]
    MissingUnit,

    /// Latitude outside [-90, 90] or not finite
    #[error("latitude {0} is outside the valid range [-90, 90]")]
    LatitudeOutOfRange(f64),

    /// Longitude outside [-180, 180] or not finite
    #[error("longitude {0} is outside the valid range [-180, 180]")]
    LongitudeOutOfRange(f64),

    /// No position has been determined yet
    #[error("please wait for location to be determined")]
    MissingPosition,

    /// The backend could not attribute the record to an authenticated user
    #[error("no authenticated user found")]
    MissingUser,
}

/// Positioning hardware failure, classified for operator messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// The operator or OS refused location access
    #[error("location permission denied")]
    PermissionDenied,

    /// The device could not produce a fix
    #[error("position unavailable")]
    PositionUnavailable,

    /// No fix arrived within the bounded wait
    #[error("position request timed out")]
    Timeout,

    /// No positioning device is present
    #[error("geolocation is not supported on this device")]
    Unsupported,
}

impl DeviceError {
    /// Operator-facing message for this error class
    pub fn user_message(&self) -> &'static str {
        match self {
            DeviceError::PermissionDenied => {
                "Location permission denied. Please enable location services."
            }
            DeviceError::PositionUnavailable => {
                "Location information is unavailable. Please try again."
            }
            DeviceError::Timeout => "Location request timed out. Please try again.",
            DeviceError::Unsupported => "Geolocation is not supported by your device.",
        }
    }

    /// Whether retrying the GPS watch is a sensible next step.
    ///
    /// Timeouts and missing fixes are transient; denied or unsupported
    /// devices point the operator at the manual override instead.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeviceError::Timeout | DeviceError::PositionUnavailable)
    }
}

/// Failure reported by the hosted data store client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The request never got a usable answer (offline, DNS, reset, 5xx, 429)
    #[error("backend unreachable: {0}")]
    Connectivity(String),

    /// The server answered and refused the request
    #[error("backend rejected request: {0}")]
    Rejected(String),

    /// The session has no authenticated user
    #[error("not authenticated: {0}")]
    Unauthenticated(String),
}

impl BackendError {
    /// Connectivity-class failures are queued for replay; everything else is terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Connectivity(_))
    }
}

/// Main error type for Unit Locator
#[derive(Debug, Error)]
pub enum LocatorError {
    /// Capture validation errors
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Positioning device errors
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// The remote store reached the server but refused the record
    #[error("location rejected: {0}")]
    RemoteRejection(String),

    /// Offline queue persistence errors
    #[error("storage error: {0}")]
    Storage(String),

    /// Malformed input file, such as a fix log
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// JSON encoding or decoding errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Unit Locator
pub type Result<T> = std::result::Result<T, LocatorError>;
