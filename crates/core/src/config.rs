//! Runtime configuration.
//!
//! Every section has defaults, so a partial (or empty) JSON document is a
//! valid configuration. Durations are stored as milliseconds to keep the
//! file format flat.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;

pub const MAPBOX_TOKEN_ENV: &str = "MAPBOX_ACCESS_TOKEN";
pub const RED_TOKEN_ENV: &str = "RED_PREDICTOR_TOKEN";

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub geolocation: GeolocationConfig,
    pub sync: SyncConfig,
    pub red: RedConfig,
    pub mapbox: MapboxConfig,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeolocationConfig {
    /// Upper bound for a single position request
    pub fix_timeout_ms: u64,
    /// Oldest cached fix the sensor may hand back
    pub maximum_age_ms: u64,
    pub high_accuracy: bool,
    /// Retries after the first attempt for unavailable/timeout failures
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// How long a continuous watch may run before it is cancelled
    pub watch_duration_ms: u64,
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            fix_timeout_ms: 5_000,
            maximum_age_ms: 100,
            high_accuracy: true,
            max_retries: 3,
            retry_delay_ms: 1_000,
            watch_duration_ms: 5_000,
        }
    }
}

impl GeolocationConfig {
    pub fn fix_timeout(&self) -> Duration {
        Duration::from_millis(self.fix_timeout_ms)
    }

    pub fn maximum_age(&self) -> Duration {
        Duration::from_millis(self.maximum_age_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn watch_duration(&self) -> Duration {
        Duration::from_millis(self.watch_duration_ms)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Length of one refresh cycle
    pub interval_ms: u64,
    /// Clock resolution of the cycle driver (one animation frame)
    pub frame_ms: u64,
    /// Fraction of the cycle at which the background fetch starts
    pub fetch_at: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            frame_ms: 16,
            fetch_at: 0.5,
        }
    }
}

impl SyncConfig {
    /// Never shorter than one millisecond
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    /// Never shorter than one millisecond
    pub fn frame(&self) -> Duration {
        Duration::from_millis(self.frame_ms.max(1))
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RedConfig {
    pub base_url: String,
    pub predictor_token: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for RedConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.red.cl".to_string(),
            predictor_token: None,
            request_timeout_ms: 8_000,
        }
    }
}

impl RedConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct MapboxConfig {
    pub base_url: String,
    pub access_token: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for MapboxConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.mapbox.com".to_string(),
            access_token: None,
            request_timeout_ms: 8_000,
        }
    }
}

impl MapboxConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Config {
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        let config: Config =
            serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Fill tokens from the environment. Environment values win over the file.
    pub fn apply_env(mut self) -> Self {
        if let Some(token) = non_empty_env(MAPBOX_TOKEN_ENV) {
            self.mapbox.access_token = Some(token);
        }
        if let Some(token) = non_empty_env(RED_TOKEN_ENV) {
            self.red.predictor_token = Some(token);
        }
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.sync.interval_ms == 0 {
            return Err(Error::Config("sync.interval_ms must be greater than zero".into()));
        }
        if self.sync.frame_ms == 0 || self.sync.frame_ms > self.sync.interval_ms {
            return Err(Error::Config(
                "sync.frame_ms must be between 1 and sync.interval_ms".into(),
            ));
        }
        if !(self.sync.fetch_at > 0.0 && self.sync.fetch_at < 1.0) {
            return Err(Error::Config("sync.fetch_at must be inside (0, 1)".into()));
        }
        if self.geolocation.fix_timeout_ms == 0 {
            return Err(Error::Config(
                "geolocation.fix_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.geolocation.watch_duration_ms == 0 {
            return Err(Error::Config(
                "geolocation.watch_duration_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.sync.interval(), Duration::from_secs(5));
        assert_eq!(config.sync.fetch_at, 0.5);
        assert_eq!(config.geolocation.max_retries, 3);
        assert_eq!(config.geolocation.retry_delay(), Duration::from_secs(1));
        assert!(config.geolocation.high_accuracy);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config = Config::from_json_str(
            r#"{ "sync": { "interval_ms": 8000 }, "mapbox": { "access_token": "pk.test" } }"#,
        )
        .unwrap();

        assert_eq!(config.sync.interval_ms, 8000);
        assert_eq!(config.sync.frame_ms, 16);
        assert_eq!(config.mapbox.access_token.as_deref(), Some("pk.test"));
        assert_eq!(config.red, RedConfig::default());
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(Config::from_json_str("{}").unwrap(), Config::default());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Config::from_json_str(r#"{ "sync": { "interval_ms": 0 } }"#).is_err());
        assert!(Config::from_json_str(r#"{ "sync": { "fetch_at": 1.0 } }"#).is_err());
        assert!(Config::from_json_str(r#"{ "sync": { "frame_ms": 9000 } }"#).is_err());
        assert!(Config::from_json_str(r#"{ "geolocation": { "fix_timeout_ms": 0 } }"#).is_err());
        assert!(Config::from_json_str("not json").is_err());
    }

    #[test]
    fn test_sync_durations_are_never_zero() {
        let sync = SyncConfig {
            interval_ms: 0,
            frame_ms: 0,
            fetch_at: 0.5,
        };
        assert_eq!(sync.interval(), Duration::from_millis(1));
        assert_eq!(sync.frame(), Duration::from_millis(1));
    }
}
