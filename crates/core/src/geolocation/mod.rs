//! Device position acquisition.
//!
//! A single actor owns the position sensor: it asks for permission with a
//! bounded-retry one-shot request, then keeps a time-boxed continuous watch
//! running. Callers talk to it through [`GeolocationAcquisition`] and read
//! the published [`LocationState`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use geo::Point;

use crate::config::GeolocationConfig;

pub mod acquisition;
pub mod sensor;

pub use acquisition::GeolocationAcquisition;
pub use sensor::{FixFuture, FixStream, FixedPositionSensor, PermissionFuture, PositionSensor};

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PositionError {
    #[error("Position sensor is not available on this device")]
    CapabilityUnavailable,

    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Position unavailable")]
    PositionUnavailable,

    #[error("Position request timed out")]
    Timeout,

    #[error("Position request cancelled")]
    Cancelled,
}

impl PositionError {
    /// Failures worth retrying before reporting them
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::PositionUnavailable | Self::Timeout)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum PermissionState {
    #[default]
    Idle,
    /// Passive permission query in flight; nothing is prompted
    Checking,
    Prompting,
    Granted,
    Denied,
    Unsupported,
}

/// What the platform says about location permission without asking the user
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum SensorPermission {
    Granted,
    Denied,
    /// Not decided yet; a request would show the prompt
    #[default]
    Prompt,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PositionFix {
    pub coordinate: Point,
    pub accuracy_meters: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl PositionFix {
    pub fn new(coordinate: Point) -> Self {
        Self {
            coordinate,
            accuracy_meters: None,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    pub maximum_age: Duration,
}

impl From<&GeolocationConfig> for PositionOptions {
    fn from(config: &GeolocationConfig) -> Self {
        Self {
            high_accuracy: config.high_accuracy,
            timeout: config.fix_timeout(),
            maximum_age: config.maximum_age(),
        }
    }
}

/// What the UI sees: `{state, position, error}` plus retry/watch bookkeeping
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LocationState {
    pub permission: PermissionState,
    /// Last good fix; kept across watch errors
    pub position: Option<PositionFix>,
    pub error: Option<PositionError>,
    /// Retry delays taken by the current request
    pub retries: u32,
    pub watching: bool,
}
