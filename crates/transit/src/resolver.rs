//! Nearest-stop resolution over raw stop records.
//!
//! Pure functions: the same origin and input list always produce the same
//! ranking.

use geo::Point;

use crate::identifiers::StopCode;
use crate::models::types::{RawStop, StopCandidate};
use crate::spatial::queries::distance_meters;

/// Rank the bus stops in `raw_stops` by distance from `origin`, nearest first.
///
/// Fare-card kiosks and other non-stop points are dropped, as are records
/// without a usable coordinate. Equal distances keep their input order.
pub fn nearby(origin: Point, raw_stops: &[RawStop]) -> Vec<StopCandidate> {
    let candidates = raw_stops
        .iter()
        .filter(|stop| stop.kind.is_bus_stop())
        .filter_map(|stop| to_candidate(stop, Some(origin)))
        .collect();

    rank_candidates(candidates)
}

/// Exact, case-sensitive lookup of a bus stop by its code.
///
/// The returned candidate has no origin to measure from, so its distance is 0.
pub fn by_code(raw_stops: &[RawStop], code: &str) -> Option<StopCandidate> {
    raw_stops
        .iter()
        .filter(|stop| stop.kind.is_bus_stop())
        .find(|stop| stop.code.as_str() == code)
        .and_then(|stop| to_candidate(stop, None))
}

/// Stable sort by ascending distance
pub fn rank_candidates(mut candidates: Vec<StopCandidate>) -> Vec<StopCandidate> {
    candidates.sort_by(|a, b| a.distance_meters.total_cmp(&b.distance_meters));
    candidates
}

pub(crate) fn to_candidate(stop: &RawStop, origin: Option<Point>) -> Option<StopCandidate> {
    let coordinate = stop
        .coordinate
        .filter(|p| p.x().is_finite() && p.y().is_finite())?;

    Some(StopCandidate {
        id: stop.id.clone(),
        code: stop.code.clone(),
        name: stop.name.clone(),
        coordinate,
        distance_meters: origin.map_or(0.0, |origin| distance_meters(origin, coordinate)),
    })
}

/// Convenience for callers holding a typed code
pub fn by_stop_code(raw_stops: &[RawStop], code: &StopCode) -> Option<StopCandidate> {
    by_code(raw_stops, code.as_str())
}
