//! # Geolocation Module
//!
//! Device position sampling for the location capture workflow.
//!
//! This module handles:
//! - Continuous position watches with a bounded wait per fix
//! - Accuracy-based fix selection (only improve, never regress)
//! - Auto-stop once the target accuracy is reached
//! - Device error classification
//! - Manual override from a map surface

pub mod fix_log;
pub mod manual;
pub mod provider;
pub mod recorder;
pub mod session;
pub mod watcher;
