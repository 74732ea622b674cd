//! # Location Recorder
//!
//! Coordinates one "record location" interaction for a selected unit: owns
//! the [`WatchSession`], the [`GeolocationWatcher`] feeding it and the
//! [`ManualOverride`], and produces the final immutable [`LocationCapture`].
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use unit_locator::capture::UnitId;
//! use unit_locator::config::Config;
//! use unit_locator::geolocation::fix_log::FixLogProvider;
//! use unit_locator::geolocation::recorder::LocationRecorder;
//!
//! # async fn run() -> unit_locator::error::Result<()> {
//! let config = Config::default();
//! let provider = Arc::new(FixLogProvider::open("fixes.jsonl")?);
//! let mut recorder = LocationRecorder::begin(UnitId::new("U1"), provider, &config);
//!
//! // Sample until the fix settles, the device errors out or the feed ends
//! let _ = recorder.settle().await;
//! let capture = recorder.finalize(Some("north yard".to_string()))?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use tracing::{info, warn};

use super::manual::{ManualOverride, MapInteraction};
use super::provider::{PositionProvider, WatchOptions};
use super::session::{SampleOutcome, StopReason, WatchMode, WatchSession};
use super::watcher::GeolocationWatcher;
use crate::capture::{CaptureSource, Coordinate, LocationCapture, UnitId};
use crate::config::Config;
use crate::error::{DeviceError, ValidationError};

/// What happened while waiting on the device
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecorderUpdate {
    Sample(SampleOutcome),
    Error(DeviceError),
    /// Not watching, or the device stream ended
    Idle,
}

/// The coordinate a capture would use if finalized now
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectedPosition {
    pub coordinate: Coordinate,
    pub accuracy_m: Option<f64>,
    pub source: CaptureSource,
}

#[derive(Debug)]
pub struct LocationRecorder {
    unit_id: UnitId,
    session: WatchSession,
    watcher: GeolocationWatcher,
    manual: ManualOverride,
}

impl LocationRecorder {
    /// Select a unit and start sampling
    ///
    /// A device that refuses the watch does not fail the interaction: the
    /// error is kept on the session so the operator can retry or go manual.
    pub fn begin(unit_id: UnitId, provider: Arc<dyn PositionProvider>, config: &Config) -> Self {
        let watcher = GeolocationWatcher::new(provider, WatchOptions::from(&config.geolocation));
        let mut recorder = Self {
            unit_id,
            session: WatchSession::new(config.geolocation.target_accuracy_m),
            watcher,
            manual: ManualOverride::from_config(&config.manual),
        };
        info!("Recording location for unit {}", recorder.unit_id);
        recorder.start_watch();
        recorder
    }

    pub fn unit_id(&self) -> &UnitId {
        &self.unit_id
    }

    pub fn session(&self) -> &WatchSession {
        &self.session
    }

    pub fn is_sampling(&self) -> bool {
        self.watcher.is_active()
    }

    fn start_watch(&mut self) {
        if let Err(e) = self.watcher.start() {
            warn!("Could not start position watch: {}", e.user_message());
            self.session.record_error(e);
        }
    }

    /// Wait for one device event and apply it to the session
    pub async fn next_update(&mut self) -> RecorderUpdate {
        if self.session.mode() != WatchMode::Watching {
            return RecorderUpdate::Idle;
        }

        match self.watcher.next_event().await {
            Some(Ok(sample)) => {
                let outcome = self.session.apply_sample(&sample);
                if self.session.mode() != WatchMode::Watching {
                    self.watcher.stop();
                }
                RecorderUpdate::Sample(outcome)
            }
            Some(Err(e)) => {
                warn!("Position error: {}", e.user_message());
                self.session.record_error(e);
                RecorderUpdate::Error(e)
            }
            None => RecorderUpdate::Idle,
        }
    }

    /// Keep sampling until the session stops watching or the stream ends
    ///
    /// # Errors
    ///
    /// Returns the first [`DeviceError`] so the caller can offer "retry" for
    /// timeouts and "go manual" for hard failures. Sampling continues in the
    /// background watch; calling `settle` again resumes waiting.
    pub async fn settle(&mut self) -> Result<(), DeviceError> {
        loop {
            match self.next_update().await {
                RecorderUpdate::Sample(_) => continue,
                RecorderUpdate::Error(e) => return Err(e),
                RecorderUpdate::Idle => return Ok(()),
            }
        }
    }

    /// Discard the current session and start sampling from scratch
    pub fn refresh(&mut self) {
        if self.session.is_finished() {
            return;
        }
        self.manual.disable();
        self.session = WatchSession::new(self.session.target_accuracy_m());
        self.start_watch();
    }

    /// Suspend GPS and switch to a manually placed pin
    pub fn enable_manual(&mut self) -> Option<Coordinate> {
        if !self.session.enter_manual() {
            return None;
        }
        self.watcher.stop();
        let pin = self.manual.enable(self.session.current_coordinate());
        info!("Manual override enabled for unit {} at {}", self.unit_id, pin);
        Some(pin)
    }

    /// Move the manual pin, enabling the override first if needed
    ///
    /// # Errors
    ///
    /// Returns a range error for coordinates outside valid bounds.
    pub fn set_manual_position(
        &mut self,
        interaction: MapInteraction,
    ) -> Result<Coordinate, ValidationError> {
        interaction.coordinate().validate()?;
        if !self.manual.is_active() && self.enable_manual().is_none() {
            return Err(ValidationError::MissingPosition);
        }
        self.manual.set_position(interaction)
    }

    /// Leave manual mode and restart GPS with a fresh session
    pub fn disable_manual(&mut self) {
        if !self.manual.is_active() {
            return;
        }
        info!("Manual override disabled for unit {}, restarting GPS", self.unit_id);
        self.refresh();
    }

    /// The coordinate a capture would carry right now
    pub fn selected_position(&self) -> Option<SelectedPosition> {
        if self.session.mode() == WatchMode::Manual {
            return self.manual.position().map(|coordinate| SelectedPosition {
                coordinate,
                accuracy_m: Some(self.manual.nominal_accuracy_m()),
                source: CaptureSource::Manual,
            });
        }

        self.session.best_fix().map(|fix| SelectedPosition {
            coordinate: fix.coordinate,
            accuracy_m: Some(fix.accuracy_m),
            source: CaptureSource::Gps,
        })
    }

    /// Stop sampling and produce the capture for submission
    ///
    /// # Errors
    ///
    /// [`ValidationError::MissingPosition`] if no fix or pin exists yet; the
    /// recorder keeps sampling in that case.
    pub fn finalize(&mut self, notes: Option<String>) -> Result<LocationCapture, ValidationError> {
        if self.session.is_finished() {
            return Err(ValidationError::MissingPosition);
        }
        let selected = self
            .selected_position()
            .ok_or(ValidationError::MissingPosition)?;

        self.watcher.stop();
        self.session.stop(StopReason::Submitted);

        Ok(LocationCapture::new(
            self.unit_id.clone(),
            selected.coordinate,
            selected.accuracy_m,
            selected.source,
            notes,
        ))
    }

    /// Abandon the interaction and release the device
    pub fn cancel(&mut self) {
        self.watcher.stop();
        self.session.stop(StopReason::Cancelled);
        info!("Location recording cancelled for unit {}", self.unit_id);
    }
}
