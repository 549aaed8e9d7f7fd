//! Core data types and enums for stop and arrival data.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use geo::{LineString, Point};

use crate::identifiers::*;

// ============================================================================
// Enums
// ============================================================================

/// Point types published by the transit authority's stop endpoints
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StopKind {
    /// A physical bus stop
    BusStop,
    /// A fare-card top-up kiosk
    FareCardPoint,
    Other(u8),
}

impl StopKind {
    pub fn from_authority(value: u8) -> Self {
        match value {
            0 => Self::BusStop,
            1 => Self::FareCardPoint,
            other => Self::Other(other),
        }
    }

    pub fn is_bus_stop(&self) -> bool {
        matches!(self, Self::BusStop)
    }
}

// ============================================================================
// Stops
// ============================================================================

/// A stop record as delivered by the stop list endpoints.
///
/// `coordinate` is optional because the upstream occasionally omits the
/// position on kiosk entries; such records never rank.
#[derive(Clone, Debug, PartialEq)]
pub struct RawStop {
    pub id: StopIdentifier,
    pub code: StopCode,
    pub name: Arc<str>,
    pub coordinate: Option<Point>,
    pub kind: StopKind,
    pub commune: Option<Arc<str>>,
}

impl RawStop {
    pub fn bus_stop(
        id: impl Into<StopIdentifier>,
        code: impl Into<StopCode>,
        name: &str,
        coordinate: Point,
    ) -> Self {
        Self {
            id: id.into(),
            code: code.into(),
            name: name.into(),
            coordinate: Some(coordinate),
            kind: StopKind::BusStop,
            commune: None,
        }
    }
}

/// A ranked stop, ready for display.
///
/// `distance_meters` is derived from the query origin and is recomputed on
/// every resolver call.
#[derive(Clone, Debug, PartialEq)]
pub struct StopCandidate {
    pub id: StopIdentifier,
    pub code: StopCode,
    pub name: Arc<str>,
    pub coordinate: Point,
    pub distance_meters: f64,
}

// ============================================================================
// Arrivals
// ============================================================================

/// A live prediction for one vehicle on one line, as reported upstream.
///
/// ETAs are whole minutes.
#[derive(Clone, Debug, PartialEq)]
pub struct VehicleReport {
    pub line_id: LineIdentifier,
    pub vehicle_id: VehicleIdentifier,
    pub distance_meters: f64,
    pub min_eta: u32,
    pub max_eta: u32,
    /// The vehicle is at, or about to reach, the stop
    pub arriving: bool,
    /// `false` when the line is out of service or has no vehicles coming
    pub line_valid: bool,
    pub destination: Option<Arc<str>>,
    /// Line colour as hex RGB (e.g. "#E3001B")
    pub color: Option<Arc<str>>,
    /// Human readable service status for invalid lines
    pub status: Option<Arc<str>>,
}

impl VehicleReport {
    /// Whether this report describes a usable vehicle prediction.
    ///
    /// Reports on invalid lines are always kept (they are ranked last);
    /// reports on valid lines need a sane ETA window and a finite distance.
    pub fn is_well_formed(&self) -> bool {
        if !self.line_valid {
            return true;
        }

        self.min_eta <= self.max_eta
            && self.distance_meters.is_finite()
            && self.distance_meters >= 0.0
    }
}

/// All vehicle reports for one stop at one instant
#[derive(Clone, Debug, PartialEq)]
pub struct ArrivalSnapshot {
    pub stop: StopCode,
    pub reports: Vec<VehicleReport>,
    pub fetched_at: DateTime<Utc>,
}

// ============================================================================
// Routing
// ============================================================================

/// A walking route as returned by the routing service
#[derive(Clone, Debug, PartialEq)]
pub struct RouteResponse {
    pub polyline: LineString,
    /// Total distance reported by the service, in meters
    pub distance_meters: f64,
    pub duration_seconds: f64,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TransitError {
    #[error("Stop not found: {0}")]
    StopNotFound(StopCode),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Upstream fetch failed: {0}")]
    UpstreamFetch(String),

    #[error("No route available between the requested points")]
    NoRouteAvailable,
}

pub type Result<T> = std::result::Result<T, TransitError>;
