//! # Watch Session
//!
//! Live GPS sampling state for one "record location" interaction.
//!
//! The session is a plain state machine with no I/O: the watcher feeds it
//! samples and errors in arrival order, and it decides which fix to keep.
//!
//! ## Acceptance Rule
//!
//! A sample replaces the current fix only if its accuracy is strictly better
//! (lower meters) than the best seen so far. `best_accuracy_m` is therefore
//! monotonically non-increasing for the lifetime of a session.
//!
//! ## Lifecycle
//!
//! ```text
//! WATCHING ──(best <= target)──► STOPPED
//!    │  ▲                          │
//!    │  └──── (fresh session) ─────┤
//!    ▼                             ▼
//!  MANUAL ──(submit / cancel)──► STOPPED
//! ```

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::provider::PositionSample;
use crate::capture::{AccuracyGrade, Coordinate};
use crate::error::DeviceError;

/// Sampling mode of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchMode {
    Watching,
    Manual,
    Stopped,
}

/// Why a session reached `Stopped`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Best accuracy reached the target threshold
    TargetAccuracyReached,
    /// The capture was handed to the submission pipeline
    Submitted,
    /// The operator abandoned the interaction
    Cancelled,
}

/// Result of feeding one sample to the session
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleOutcome {
    /// New best fix
    Accepted { accuracy_m: f64 },
    /// New best fix, and it met the target: sampling should stop
    Settled { accuracy_m: f64 },
    /// Not better than the current best; discarded
    Regressed { accuracy_m: f64, best_m: f64 },
    /// Coordinate out of range or accuracy not a finite non-negative number
    Invalid,
    /// The session is not watching; the sample is a no-op
    Ignored,
}

/// Best GPS fix of a session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub coordinate: Coordinate,
    pub accuracy_m: f64,
    pub timestamp: DateTime<Utc>,
}

impl Fix {
    pub fn grade(&self) -> AccuracyGrade {
        AccuracyGrade::from_meters(self.accuracy_m)
    }
}

#[derive(Debug, Clone)]
pub struct WatchSession {
    mode: WatchMode,
    best: Option<Fix>,
    target_accuracy_m: f64,
    samples_seen: u32,
    last_error: Option<DeviceError>,
    stop_reason: Option<StopReason>,
}

impl WatchSession {
    /// Start a session in `Watching` mode with no fix
    pub fn new(target_accuracy_m: f64) -> Self {
        Self {
            mode: WatchMode::Watching,
            best: None,
            target_accuracy_m,
            samples_seen: 0,
            last_error: None,
            stop_reason: None,
        }
    }

    pub fn mode(&self) -> WatchMode {
        self.mode
    }

    pub fn best_accuracy_m(&self) -> Option<f64> {
        self.best.map(|f| f.accuracy_m)
    }

    pub fn current_coordinate(&self) -> Option<Coordinate> {
        self.best.map(|f| f.coordinate)
    }

    pub fn best_fix(&self) -> Option<Fix> {
        self.best
    }

    pub fn target_accuracy_m(&self) -> f64 {
        self.target_accuracy_m
    }

    pub fn samples_seen(&self) -> u32 {
        self.samples_seen
    }

    pub fn last_error(&self) -> Option<DeviceError> {
        self.last_error
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// Submitted and cancelled sessions are finished for good
    pub fn is_finished(&self) -> bool {
        matches!(
            self.stop_reason,
            Some(StopReason::Submitted) | Some(StopReason::Cancelled)
        )
    }

    /// Apply one sample under the "only improve, never regress" rule
    pub fn apply_sample(&mut self, sample: &PositionSample) -> SampleOutcome {
        if self.mode != WatchMode::Watching {
            debug!("Ignoring sample while {:?}", self.mode);
            return SampleOutcome::Ignored;
        }

        self.samples_seen += 1;

        if sample.coordinate.validate().is_err()
            || !sample.accuracy_m.is_finite()
            || sample.accuracy_m < 0.0
        {
            debug!(
                "Discarding invalid sample {} (±{}m)",
                sample.coordinate, sample.accuracy_m
            );
            return SampleOutcome::Invalid;
        }

        if let Some(best) = self.best {
            if sample.accuracy_m >= best.accuracy_m {
                debug!(
                    "Sample ±{:.1}m not better than ±{:.1}m, keeping current fix",
                    sample.accuracy_m, best.accuracy_m
                );
                return SampleOutcome::Regressed {
                    accuracy_m: sample.accuracy_m,
                    best_m: best.accuracy_m,
                };
            }
        }

        self.best = Some(Fix {
            coordinate: sample.coordinate,
            accuracy_m: sample.accuracy_m,
            timestamp: sample.timestamp,
        });
        self.last_error = None;
        debug!(
            "Accepted fix {} ±{:.1}m ({})",
            sample.coordinate,
            sample.accuracy_m,
            AccuracyGrade::from_meters(sample.accuracy_m)
        );

        if sample.accuracy_m <= self.target_accuracy_m {
            info!(
                "Target accuracy reached (±{:.1}m <= {:.1}m), stopping watch",
                sample.accuracy_m, self.target_accuracy_m
            );
            self.stop(StopReason::TargetAccuracyReached);
            return SampleOutcome::Settled {
                accuracy_m: sample.accuracy_m,
            };
        }

        SampleOutcome::Accepted {
            accuracy_m: sample.accuracy_m,
        }
    }

    /// Remember a device error. No effect unless watching.
    pub fn record_error(&mut self, error: DeviceError) {
        if self.mode == WatchMode::Watching {
            self.last_error = Some(error);
        }
    }

    /// Switch to manual mode. Returns false if the session is already finished.
    pub fn enter_manual(&mut self) -> bool {
        if self.is_finished() {
            return false;
        }
        self.mode = WatchMode::Manual;
        self.stop_reason = None;
        true
    }

    pub fn stop(&mut self, reason: StopReason) {
        if self.is_finished() {
            return;
        }
        self.mode = WatchMode::Stopped;
        self.stop_reason = Some(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(accuracy_m: f64) -> PositionSample {
        PositionSample::new(51.5, -0.12, accuracy_m)
    }

    #[test]
    fn test_new_session_is_watching_without_fix() {
        let session = WatchSession::new(10.0);
        assert_eq!(session.mode(), WatchMode::Watching);
        assert_eq!(session.best_accuracy_m(), None);
        assert_eq!(session.current_coordinate(), None);
    }

    #[test]
    fn test_first_sample_accepted() {
        let mut session = WatchSession::new(10.0);
        assert_eq!(
            session.apply_sample(&sample(25.0)),
            SampleOutcome::Accepted { accuracy_m: 25.0 }
        );
        assert_eq!(session.best_accuracy_m(), Some(25.0));
    }

    #[test]
    fn test_worse_sample_does_not_overwrite() {
        let mut session = WatchSession::new(10.0);
        session.apply_sample(&PositionSample::new(51.0, 0.0, 20.0));
        let outcome = session.apply_sample(&PositionSample::new(52.0, 1.0, 40.0));
        assert_eq!(
            outcome,
            SampleOutcome::Regressed {
                accuracy_m: 40.0,
                best_m: 20.0
            }
        );
        assert_eq!(session.current_coordinate(), Some(Coordinate::new(51.0, 0.0)));
    }

    #[test]
    fn test_equal_accuracy_is_not_an_improvement() {
        let mut session = WatchSession::new(10.0);
        session.apply_sample(&PositionSample::new(51.0, 0.0, 20.0));
        session.apply_sample(&PositionSample::new(52.0, 1.0, 20.0));
        assert_eq!(session.current_coordinate(), Some(Coordinate::new(51.0, 0.0)));
    }

    #[test]
    fn test_best_accuracy_monotonic_over_sequence() {
        let mut session = WatchSession::new(1.0);
        let sequence = [50.0, 80.0, 35.0, 35.0, 60.0, 12.0, 40.0, 11.5, 90.0];
        let mut previous = f64::INFINITY;
        let mut previous_coord = None;
        for (i, accuracy) in sequence.iter().enumerate() {
            let s = PositionSample::new(50.0 + i as f64 * 0.01, 0.0, *accuracy);
            let outcome = session.apply_sample(&s);
            let best = session.best_accuracy_m().unwrap();
            assert!(best <= previous);
            match outcome {
                SampleOutcome::Accepted { .. } => assert!(best < previous),
                _ => assert_eq!(session.current_coordinate(), previous_coord),
            }
            previous = best;
            previous_coord = session.current_coordinate();
        }
        assert_eq!(session.best_accuracy_m(), Some(11.5));
    }

    #[test]
    fn test_settles_at_target_and_ignores_further_samples() {
        let mut session = WatchSession::new(10.0);
        session.apply_sample(&sample(25.0));
        assert_eq!(
            session.apply_sample(&sample(8.0)),
            SampleOutcome::Settled { accuracy_m: 8.0 }
        );
        assert_eq!(session.mode(), WatchMode::Stopped);
        assert_eq!(session.stop_reason(), Some(StopReason::TargetAccuracyReached));

        assert_eq!(session.apply_sample(&sample(2.0)), SampleOutcome::Ignored);
        assert_eq!(session.best_accuracy_m(), Some(8.0));
    }

    #[test]
    fn test_exactly_target_settles() {
        let mut session = WatchSession::new(10.0);
        assert!(matches!(
            session.apply_sample(&sample(10.0)),
            SampleOutcome::Settled { .. }
        ));
    }

    #[test]
    fn test_invalid_samples_rejected() {
        let mut session = WatchSession::new(10.0);
        assert_eq!(
            session.apply_sample(&PositionSample::new(91.0, 0.0, 5.0)),
            SampleOutcome::Invalid
        );
        assert_eq!(
            session.apply_sample(&PositionSample::new(0.0, 0.0, -1.0)),
            SampleOutcome::Invalid
        );
        assert_eq!(
            session.apply_sample(&PositionSample::new(0.0, 0.0, f64::NAN)),
            SampleOutcome::Invalid
        );
        assert_eq!(session.best_accuracy_m(), None);
        assert_eq!(session.samples_seen(), 3);
    }

    #[test]
    fn test_manual_mode_ignores_samples() {
        let mut session = WatchSession::new(10.0);
        assert!(session.enter_manual());
        assert_eq!(session.apply_sample(&sample(3.0)), SampleOutcome::Ignored);
        assert_eq!(session.samples_seen(), 0);
    }

    #[test]
    fn test_error_recorded_and_cleared_by_next_fix() {
        let mut session = WatchSession::new(10.0);
        session.record_error(DeviceError::Timeout);
        assert_eq!(session.last_error(), Some(DeviceError::Timeout));
        session.apply_sample(&sample(20.0));
        assert_eq!(session.last_error(), None);
    }

    #[test]
    fn test_finished_session_cannot_go_manual() {
        let mut session = WatchSession::new(10.0);
        session.stop(StopReason::Cancelled);
        assert!(!session.enter_manual());
        session.stop(StopReason::Submitted);
        assert_eq!(session.stop_reason(), Some(StopReason::Cancelled));
    }

    #[test]
    fn test_settled_session_can_still_go_manual() {
        let mut session = WatchSession::new(10.0);
        session.apply_sample(&sample(5.0));
        assert!(session.enter_manual());
        assert_eq!(session.mode(), WatchMode::Manual);
    }
}
