//! Persisted form of a queued submission.
//!
//! Entries are stored as a JSON array of
//! `{unitId, latitude, longitude, notes, enqueuedAt}` objects. `source`,
//! `accuracyMeters` and `capturedAt` are written too so a capture survives a
//! restart unchanged; they default when missing so older entries still load.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capture::{CaptureSource, Coordinate, LocationCapture, QueuedSubmission, UnitId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSubmission {
    pub unit_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub notes: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default = "default_source")]
    pub source: CaptureSource,
    #[serde(default)]
    pub accuracy_meters: Option<f64>,
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
}

fn default_source() -> CaptureSource {
    CaptureSource::Gps
}

impl From<&QueuedSubmission> for StoredSubmission {
    fn from(entry: &QueuedSubmission) -> Self {
        let capture = &entry.capture;
        let coordinate = capture.coordinate();
        Self {
            unit_id: capture.unit_id().as_str().to_string(),
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
            notes: capture.notes().map(str::to_string),
            enqueued_at: entry.enqueued_at,
            source: capture.source(),
            accuracy_meters: capture.accuracy_m(),
            captured_at: Some(capture.captured_at()),
        }
    }
}

impl From<StoredSubmission> for QueuedSubmission {
    fn from(stored: StoredSubmission) -> Self {
        // Entries without a capture time were captured when they were queued
        let captured_at = stored.captured_at.unwrap_or(stored.enqueued_at);
        let capture = LocationCapture::with_timestamp(
            UnitId::new(stored.unit_id),
            Coordinate::new(stored.latitude, stored.longitude),
            stored.accuracy_meters,
            stored.source,
            stored.notes,
            captured_at,
        );
        QueuedSubmission::new(capture, stored.enqueued_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_minimal_entry_parses_with_defaults() {
        let json = r#"{
            "unitId": "6f1c",
            "latitude": 51.5,
            "longitude": -0.12,
            "notes": null,
            "enqueuedAt": "2024-03-01T10:00:00Z"
        }"#;
        let stored: StoredSubmission = serde_json::from_str(json).unwrap();
        let entry = QueuedSubmission::from(stored);
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(entry.enqueued_at, at);
        assert_eq!(entry.capture.captured_at(), at);
        assert_eq!(entry.capture.source(), CaptureSource::Gps);
        assert_eq!(entry.capture.accuracy_m(), None);
    }

    #[test]
    fn test_written_field_names() {
        let capture = LocationCapture::new(
            UnitId::new("U1"),
            Coordinate::new(1.0, 2.0),
            Some(10.0),
            CaptureSource::Manual,
            Some("gate 3".to_string()),
        );
        let entry = QueuedSubmission::new(capture, Utc::now());
        let value = serde_json::to_value(StoredSubmission::from(&entry)).unwrap();
        for field in [
            "unitId",
            "latitude",
            "longitude",
            "notes",
            "enqueuedAt",
            "source",
            "accuracyMeters",
            "capturedAt",
        ] {
            assert!(value.get(field).is_some(), "missing {}", field);
        }
        assert_eq!(value["source"], "MANUAL");
    }
}
