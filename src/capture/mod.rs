//! # Capture Module
//!
//! Value types shared by the watcher, the submission pipeline and the offline
//! queue.
//!
//! A [`LocationCapture`] is immutable once built: the pipeline takes it by
//! reference and a resubmission after failure always produces a new value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

/// Accuracy below which a fix is graded good (meters)
pub const GOOD_ACCURACY_M: f64 = 10.0;

/// Accuracy below which a fix is graded fair (meters)
pub const FAIR_ACCURACY_M: f64 = 30.0;

/// Opaque identifier of a tracked unit (trailer, container, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(String);

impl UnitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A blank id counts as "no unit selected".
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// WGS84 coordinate in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check that both axes are finite and inside their valid ranges
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::LatitudeOutOfRange`] or
    /// [`ValidationError::LongitudeOutOfRange`] for the first offending axis.
    ///
    /// # Examples
    ///
    /// ```
    /// use unit_locator::capture::Coordinate;
    ///
    /// assert!(Coordinate::new(51.5074, -0.1278).validate().is_ok());
    /// assert!(Coordinate::new(91.0, 0.0).validate().is_err());
    /// assert!(Coordinate::new(0.0, 181.0).validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ValidationError::LatitudeOutOfRange(self.latitude));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ValidationError::LongitudeOutOfRange(self.longitude));
        }
        Ok(())
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

/// Where a capture's coordinate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaptureSource {
    /// Measured by the positioning hardware
    Gps,
    /// Asserted by the operator on the map surface
    Manual,
}

/// Coarse accuracy grading used for operator messaging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccuracyGrade {
    /// Below 10 m
    Good,
    /// Below 30 m
    Fair,
    /// 30 m or worse
    Poor,
}

impl AccuracyGrade {
    pub fn from_meters(accuracy_m: f64) -> Self {
        if accuracy_m < GOOD_ACCURACY_M {
            AccuracyGrade::Good
        } else if accuracy_m < FAIR_ACCURACY_M {
            AccuracyGrade::Fair
        } else {
            AccuracyGrade::Poor
        }
    }
}

impl fmt::Display for AccuracyGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AccuracyGrade::Good => "good",
            AccuracyGrade::Fair => "fair",
            AccuracyGrade::Poor => "poor",
        };
        f.write_str(label)
    }
}

/// A finalized location reading for one unit, ready for submission
#[derive(Debug, Clone, PartialEq)]
pub struct LocationCapture {
    unit_id: UnitId,
    coordinate: Coordinate,
    accuracy_m: Option<f64>,
    source: CaptureSource,
    notes: Option<String>,
    captured_at: DateTime<Utc>,
}

impl LocationCapture {
    /// Build a capture stamped with the current time.
    ///
    /// Blank notes are stored as `None`.
    pub fn new(
        unit_id: UnitId,
        coordinate: Coordinate,
        accuracy_m: Option<f64>,
        source: CaptureSource,
        notes: Option<String>,
    ) -> Self {
        Self::with_timestamp(unit_id, coordinate, accuracy_m, source, notes, Utc::now())
    }

    pub fn with_timestamp(
        unit_id: UnitId,
        coordinate: Coordinate,
        accuracy_m: Option<f64>,
        source: CaptureSource,
        notes: Option<String>,
        captured_at: DateTime<Utc>,
    ) -> Self {
        let notes = notes.filter(|n| !n.trim().is_empty());
        Self {
            unit_id,
            coordinate,
            accuracy_m,
            source,
            notes,
            captured_at,
        }
    }

    pub fn unit_id(&self) -> &UnitId {
        &self.unit_id
    }

    pub fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    pub fn accuracy_m(&self) -> Option<f64> {
        self.accuracy_m
    }

    pub fn source(&self) -> CaptureSource {
        self.source
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Local validation run before any network or queue interaction
    ///
    /// # Errors
    ///
    /// - [`ValidationError::MissingUnit`] if the unit id is blank
    /// - a range error if the coordinate is invalid
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.unit_id.is_blank() {
            return Err(ValidationError::MissingUnit);
        }
        self.coordinate.validate()
    }
}

/// A capture waiting in the offline queue for remote persistence
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedSubmission {
    pub capture: LocationCapture,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedSubmission {
    pub fn new(capture: LocationCapture, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            capture,
            enqueued_at,
        }
    }
}
