//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and field is optional; missing values fall back to the
//! `default_*` functions below. Backend credentials can also be supplied via
//! environment variables so they stay out of the config file.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{LocatorError, Result};

/// Environment variable overriding `backend.url`
pub const ENV_BACKEND_URL: &str = "UNIT_LOCATOR_BACKEND_URL";
/// Environment variable overriding `backend.anon_key`
pub const ENV_ANON_KEY: &str = "UNIT_LOCATOR_ANON_KEY";
/// Environment variable overriding `backend.access_token`
pub const ENV_ACCESS_TOKEN: &str = "UNIT_LOCATOR_ACCESS_TOKEN";

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub geolocation: GeolocationConfig,
    #[serde(default)]
    pub manual: ManualConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub connectivity: ConnectivityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Hosted data store connection
#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub url: String,

    #[serde(default)]
    pub anon_key: String,

    /// User session token; requests fall back to the anon key without one
    #[serde(default)]
    pub access_token: Option<String>,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_application_name")]
    pub application_name: String,
}

/// Device position sampling
#[derive(Debug, Deserialize, Clone)]
pub struct GeolocationConfig {
    #[serde(default = "default_high_accuracy")]
    pub high_accuracy: bool,

    /// Bounded wait for each fix
    #[serde(default = "default_fix_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub maximum_age_ms: u64,

    /// Sampling stops once the best fix is at or below this accuracy
    #[serde(default = "default_target_accuracy_m")]
    pub target_accuracy_m: f64,
}

/// Manual position override
#[derive(Debug, Deserialize, Clone)]
pub struct ManualConfig {
    /// Nominal accuracy stamped on operator-asserted coordinates
    #[serde(default = "default_nominal_accuracy_m")]
    pub nominal_accuracy_m: f64,

    /// Map centre used when no GPS fix is available
    #[serde(default = "default_center_latitude")]
    pub default_latitude: f64,

    #[serde(default = "default_center_longitude")]
    pub default_longitude: f64,
}

/// Offline queue persistence
#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_storage_key")]
    pub storage_key: String,
}

/// Connectivity probing
#[derive(Debug, Deserialize, Clone)]
pub struct ConnectivityConfig {
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,

    /// Assume online at startup until the first probe says otherwise
    #[serde(default = "default_assume_online")]
    pub assume_online: bool,
}

/// Log output
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Directory for daily-rolling log files; console only when unset
    #[serde(default)]
    pub file_dir: Option<PathBuf>,

    #[serde(default)]
    pub filter: Option<String>,
}

// Default value functions
fn default_backend_url() -> String { "http://localhost:54321".to_string() }
fn default_request_timeout_ms() -> u64 { 15000 }
fn default_application_name() -> String { "trailer-locator".to_string() }

fn default_high_accuracy() -> bool { true }
fn default_fix_timeout_ms() -> u64 { 30000 }
fn default_target_accuracy_m() -> f64 { 10.0 }

fn default_nominal_accuracy_m() -> f64 { 10.0 }
fn default_center_latitude() -> f64 { 51.5074 }
fn default_center_longitude() -> f64 { -0.1278 }

fn default_data_dir() -> PathBuf { PathBuf::from("./data") }
fn default_storage_key() -> String { "trailer-locator-offline-queue".to_string() }

fn default_probe_interval_ms() -> u64 { 5000 }
fn default_assume_online() -> bool { true }

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            anon_key: String::new(),
            access_token: None,
            request_timeout_ms: default_request_timeout_ms(),
            application_name: default_application_name(),
        }
    }
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            high_accuracy: default_high_accuracy(),
            timeout_ms: default_fix_timeout_ms(),
            maximum_age_ms: 0,
            target_accuracy_m: default_target_accuracy_m(),
        }
    }
}

impl Default for ManualConfig {
    fn default() -> Self {
        Self {
            nominal_accuracy_m: default_nominal_accuracy_m(),
            default_latitude: default_center_latitude(),
            default_longitude: default_center_longitude(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            storage_key: default_storage_key(),
        }
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_interval_ms: default_probe_interval_ms(),
            assume_online: default_assume_online(),
        }
    }
}

fn invalid(msg: impl std::fmt::Display) -> LocatorError {
    LocatorError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Environment overrides are applied after parsing and before validation.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use unit_locator::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse, apply environment overrides and validate
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(contents)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply backend overrides from a variable lookup.
    ///
    /// Takes the lookup as a closure so tests don't touch process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BACKEND_URL).filter(|v| !v.is_empty()) {
            self.backend.url = url;
        }
        if let Some(key) = lookup(ENV_ANON_KEY).filter(|v| !v.is_empty()) {
            self.backend.anon_key = key;
        }
        if let Some(token) = lookup(ENV_ACCESS_TOKEN).filter(|v| !v.is_empty()) {
            self.backend.access_token = Some(token);
        }
    }

    /// Path of the file backing the offline queue
    pub fn queue_file(&self) -> PathBuf {
        self.queue.data_dir.join(format!("{}.json", self.queue.storage_key))
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.backend.url.is_empty() {
            return Err(invalid("backend url cannot be empty"));
        }

        if !self.backend.url.starts_with("http://") && !self.backend.url.starts_with("https://") {
            return Err(invalid("backend url must start with http:// or https://"));
        }

        if self.backend.request_timeout_ms == 0 || self.backend.request_timeout_ms > 120000 {
            return Err(invalid("request_timeout_ms must be between 1 and 120000"));
        }

        if self.geolocation.timeout_ms < 1000 || self.geolocation.timeout_ms > 120000 {
            return Err(invalid("geolocation timeout_ms must be between 1000 and 120000"));
        }

        if !self.geolocation.target_accuracy_m.is_finite()
            || self.geolocation.target_accuracy_m <= 0.0
        {
            return Err(invalid("target_accuracy_m must be greater than 0"));
        }

        if !self.manual.nominal_accuracy_m.is_finite() || self.manual.nominal_accuracy_m < 0.0 {
            return Err(invalid("nominal_accuracy_m must be non-negative"));
        }

        if !(-90.0..=90.0).contains(&self.manual.default_latitude) {
            return Err(invalid("default_latitude must be between -90 and 90"));
        }

        if !(-180.0..=180.0).contains(&self.manual.default_longitude) {
            return Err(invalid("default_longitude must be between -180 and 180"));
        }

        if self.queue.storage_key.is_empty() {
            return Err(invalid("queue storage_key cannot be empty"));
        }

        if self
            .queue
            .storage_key
            .chars()
            .any(|c| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        {
            return Err(invalid(
                "queue storage_key may only contain ASCII letters, digits, '-' and '_'",
            ));
        }

        if self.connectivity.probe_interval_ms < 100 || self.connectivity.probe_interval_ms > 600000 {
            return Err(invalid("probe_interval_ms must be between 100 and 600000"));
        }

        Ok(())
    }
}
