//! # Manual Position Override
//!
//! Lets an operator supersede GPS with a coordinate chosen on a map surface.
//! Manually chosen coordinates carry a fixed nominal accuracy, marking them as
//! operator-asserted rather than measured.

use tracing::debug;

use crate::capture::Coordinate;
use crate::config::ManualConfig;
use crate::error::ValidationError;

/// Nominal accuracy assigned to manual coordinates (meters)
pub const DEFAULT_NOMINAL_ACCURACY_M: f64 = 10.0;

/// Direct interaction with the map surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MapInteraction {
    /// Marker dropped at the end of a drag
    Drag(Coordinate),
    /// Tap or click on the map
    Click(Coordinate),
}

impl MapInteraction {
    pub fn coordinate(&self) -> Coordinate {
        match self {
            MapInteraction::Drag(c) | MapInteraction::Click(c) => *c,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ManualOverride {
    nominal_accuracy_m: f64,
    default_center: Coordinate,
    position: Option<Coordinate>,
    active: bool,
}

impl ManualOverride {
    pub fn new(nominal_accuracy_m: f64, default_center: Coordinate) -> Self {
        Self {
            nominal_accuracy_m,
            default_center,
            position: None,
            active: false,
        }
    }

    pub fn from_config(config: &ManualConfig) -> Self {
        Self::new(
            config.nominal_accuracy_m,
            Coordinate::new(config.default_latitude, config.default_longitude),
        )
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn nominal_accuracy_m(&self) -> f64 {
        self.nominal_accuracy_m
    }

    /// Current manual pin, if the override is active
    pub fn position(&self) -> Option<Coordinate> {
        self.position.filter(|_| self.active)
    }

    /// Activate the override and place the initial pin.
    ///
    /// The pin starts at `seed` (usually the best GPS fix) or the default map
    /// centre when there is no fix.
    pub fn enable(&mut self, seed: Option<Coordinate>) -> Coordinate {
        let start = seed.unwrap_or(self.default_center);
        self.active = true;
        self.position = Some(start);
        debug!("Manual override enabled at {}", start);
        start
    }

    /// Move the pin in response to a map interaction
    ///
    /// # Errors
    ///
    /// Returns a range error if the interaction lands outside valid
    /// latitude/longitude bounds; the previous pin is kept.
    pub fn set_position(&mut self, interaction: MapInteraction) -> Result<Coordinate, ValidationError> {
        let coordinate = interaction.coordinate();
        coordinate.validate()?;
        self.active = true;
        self.position = Some(coordinate);
        debug!("Manual pin moved to {} via {:?}", coordinate, interaction);
        Ok(coordinate)
    }

    pub fn disable(&mut self) {
        self.active = false;
        self.position = None;
    }
}

impl Default for ManualOverride {
    fn default() -> Self {
        Self::from_config(&ManualConfig::default())
    }
}
