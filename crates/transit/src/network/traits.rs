//! Pluggable networking traits.
//!
//! External crates implement these to provide data fetching capabilities.
//! Futures are `'static` so callers can keep them in flight while the
//! source itself stays shared behind an `Arc`.

use std::future::Future;
use std::pin::Pin;

use geo::Point;

use crate::identifiers::StopCode;
use crate::models::types::{ArrivalSnapshot, RawStop, Result, RouteResponse};

pub type SourceFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'static>>;

/// Fetch raw stop records from the transit authority
pub trait StopSource: Send + Sync {
    /// Stops (and other points) around a coordinate
    fn stops_around(&self, origin: Point) -> SourceFuture<Vec<RawStop>>;

    /// The authority's complete stop listing
    fn all_stops(&self) -> SourceFuture<Vec<RawStop>>;
}

/// Fetch live vehicle predictions for a stop
pub trait ArrivalSource: Send + Sync {
    fn arrivals(&self, stop: &StopCode) -> SourceFuture<ArrivalSnapshot>;
}

/// Fetch a walking path between two coordinates
pub trait RouteSource: Send + Sync {
    /// Fails with `TransitError::NoRouteAvailable` when the service answers
    /// but has no path between the points.
    fn walking_route(&self, from: Point, to: Point) -> SourceFuture<RouteResponse>;
}
