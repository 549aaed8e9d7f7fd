//! Core traits for stop data.
//!
//! These traits define the public interface for stop lookups.
//! Implementations can be in-memory, database-backed, or remote.

use geo::Point;

use crate::identifiers::*;
use crate::models::types::*;

// ============================================================================
// Provider Trait
// ============================================================================

/// Provider of bus stops with lookup and spatial query methods.
///
/// Every query returns candidates ranked nearest-first with ties kept in
/// the provider's insertion order.
pub trait StopProvider: Send + Sync {
    // ---- Lookups ----

    /// Exact, case-sensitive match on the stop code
    fn stop_by_code(&self, code: &StopCode) -> Option<StopCandidate>;

    // ---- Collections ----
    fn stop_count(&self) -> usize;

    // ---- Spatial queries ----

    /// Find stops within radius (meters)
    fn stops_near(&self, point: Point, radius_m: f64) -> Vec<StopCandidate>;

    /// Find the N nearest stops to a point
    fn nearest_stops(&self, point: Point, n: usize) -> Vec<StopCandidate>;
}
