//! R-tree nodes for spatial indexing.
//!
//! Wraps bus stops with geometric data for efficient spatial queries.
//!
//! ## Two-Stage Filtering
//!
//! The spatial queries use a two-stage filtering approach:
//! 1. **R-tree filter**: a degree-space bounding box around the query radius
//! 2. **Haversine filter**: accurate geodesic distance on the survivors
//!
//! Degrees of longitude shrink with latitude, so the bounding box is widened
//! by `1 / cos(latitude)` on the x axis; the haversine pass does the real cut.

use geo::Point;
use rstar::{PointDistance, RTreeObject, AABB};

use crate::spatial::queries::{meters_to_degrees_approx, meters_to_longitude_degrees_approx};

// ============================================================================
// Stop Spatial Node
// ============================================================================

#[derive(Clone, Debug)]
pub struct StopNode {
    /// Position of the stop in the provider's insertion order
    pub slot: usize,
    point: [f64; 2],
}

impl StopNode {
    pub fn new(location: Point, slot: usize) -> Self {
        Self {
            slot,
            point: [location.x(), location.y()],
        }
    }

    pub fn location(&self) -> Point {
        Point::new(self.point[0], self.point[1])
    }
}

impl RTreeObject for StopNode {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

impl PointDistance for StopNode {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.point[0] - point[0];
        let dy = self.point[1] - point[1];
        dx * dx + dy * dy
    }
}

/// Degree-space envelope that contains every point within `radius_m` of `center`
pub fn radius_envelope(center: Point, radius_m: f64) -> AABB<[f64; 2]> {
    let d_lat = meters_to_degrees_approx(radius_m) * 1.01;
    let d_lon =
        meters_to_longitude_degrees_approx(radius_m, poleward_latitude(center, radius_m)) * 1.01;

    AABB::from_corners(
        [center.x() - d_lon, center.y() - d_lat],
        [center.x() + d_lon, center.y() + d_lat],
    )
}

/// Upper bound on the degree-space distance from `center` to any point
/// within `radius_m` meters of it.
///
/// A degree of longitude is shortest at the poleward edge of the band, so
/// the bound uses that latitude's scale for both axes.
pub fn radius_degrees(center: Point, radius_m: f64) -> f64 {
    meters_to_longitude_degrees_approx(radius_m, poleward_latitude(center, radius_m)) * 1.01
}

fn poleward_latitude(center: Point, radius_m: f64) -> f64 {
    (center.y().abs() + meters_to_degrees_approx(radius_m) * 1.01).min(90.0)
}
