//! In-memory stop provider backed by a full stop list.
//!
//! Stores every bus stop in memory with a spatial index for fast radius and
//! k-nearest queries. Built once from the authority's "all stops" listing.

use std::collections::HashMap;
use std::sync::Arc;

use geo::Point;
use rstar::{PointDistance, RTree};

use crate::identifiers::*;
use crate::models::{traits::*, types::*};
use crate::resolver::{rank_candidates, to_candidate};
use crate::spatial::index::{radius_degrees, radius_envelope, StopNode};
use crate::spatial::queries::distance_meters;

// ============================================================================
// Static Provider
// ============================================================================

/// In-memory stop provider with spatial indexing
///
/// This type is cheap to clone since all data is stored in `Arc`s.
#[derive(Clone)]
pub struct StaticStopProvider {
    // Core data, in input order
    stops: Arc<[StopCandidate]>,

    // Lookup maps
    code_map: Arc<HashMap<StopCode, usize>>,

    // Spatial index
    stop_tree: Arc<RTree<StopNode>>,
}

impl StaticStopProvider {
    /// Create a new empty provider
    pub fn new() -> Self {
        Self::from_raw(Vec::new())
    }

    /// Build provider from raw stop records.
    ///
    /// Only bus stops with a usable coordinate are kept. When two records
    /// share a code the first one wins lookups.
    pub fn from_raw(raw_stops: Vec<RawStop>) -> Self {
        let stops: Vec<StopCandidate> = raw_stops
            .iter()
            .filter(|stop| stop.kind.is_bus_stop())
            .filter_map(|stop| to_candidate(stop, None))
            .collect();

        // Build lookup maps
        let mut code_map = HashMap::with_capacity(stops.len());
        for (slot, stop) in stops.iter().enumerate() {
            code_map.entry(stop.code.clone()).or_insert(slot);
        }

        // Build spatial index
        let stop_tree = RTree::bulk_load(
            stops
                .iter()
                .enumerate()
                .map(|(slot, stop)| StopNode::new(stop.coordinate, slot))
                .collect(),
        );

        Self {
            stops: stops.into(),
            code_map: Arc::new(code_map),
            stop_tree: Arc::new(stop_tree),
        }
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    fn measured(&self, slot: usize, origin: Point) -> StopCandidate {
        let mut candidate = self.stops[slot].clone();
        candidate.distance_meters = distance_meters(origin, candidate.coordinate);
        candidate
    }

    /// Rank slots by distance, ties broken by insertion order
    fn ranked(&self, mut slots: Vec<usize>, origin: Point) -> Vec<StopCandidate> {
        slots.sort_unstable();
        rank_candidates(slots.into_iter().map(|slot| self.measured(slot, origin)).collect())
    }
}

impl Default for StaticStopProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl StopProvider for StaticStopProvider {
    fn stop_by_code(&self, code: &StopCode) -> Option<StopCandidate> {
        self.code_map.get(code).map(|&slot| self.stops[slot].clone())
    }

    fn stop_count(&self) -> usize {
        self.len()
    }

    fn stops_near(&self, point: Point, radius_m: f64) -> Vec<StopCandidate> {
        // Validate radius is positive
        if radius_m <= 0.0 || !radius_m.is_finite() {
            return Vec::new();
        }

        let slots = self
            .stop_tree
            .locate_in_envelope(&radius_envelope(point, radius_m))
            .filter(|node| distance_meters(point, node.location()) <= radius_m)
            .map(|node| node.slot)
            .collect();

        self.ranked(slots, point)
    }

    fn nearest_stops(&self, point: Point, n: usize) -> Vec<StopCandidate> {
        if n == 0 {
            return Vec::new();
        }

        // The tree ranks by degree distance, which overweights longitude.
        // Keep pulling until no unseen node can beat the current n-th best.
        let query = [point.x(), point.y()];
        let mut best: Vec<(f64, usize)> = Vec::with_capacity(n + 1);

        for node in self.stop_tree.nearest_neighbor_iter(&query) {
            if let Some(&(worst, _)) = best.get(n - 1) {
                let cutoff = radius_degrees(point, worst);
                if node.distance_2(&query) > cutoff * cutoff {
                    break;
                }
            }

            let entry = (distance_meters(point, node.location()), node.slot);
            let at = best.partition_point(|kept| {
                kept.0 < entry.0 || (kept.0 == entry.0 && kept.1 < entry.1)
            });
            best.insert(at, entry);
            best.truncate(n);
        }

        self.ranked(best.into_iter().map(|(_, slot)| slot).collect(), point)
    }
}
