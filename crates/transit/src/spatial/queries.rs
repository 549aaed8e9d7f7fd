//! Spatial query utilities for distance calculations.
//!
//! Uses Haversine formula for accurate distances on Earth's surface.
//! Points are `geo::Point` with `x = longitude`, `y = latitude`, in degrees.

use geo::{Coord, LineString, Point};

/// Mean Earth radius (IUGG), meters
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// Calculate Haversine distance between two points in meters.
///
/// The haversine term is clamped to `[0, 1]` so rounding on antipodal
/// inputs cannot push `asin` out of its domain.
pub fn distance_meters(a: Point, b: Point) -> f64 {
    let lat1 = a.y().to_radians();
    let lat2 = b.y().to_radians();
    let d_lat = lat2 - lat1;
    let d_lon = (b.x() - a.x()).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_METERS * h.clamp(0.0, 1.0).sqrt().asin()
}

/// Running distance (meters) from the first vertex to every vertex of the polyline.
///
/// The first entry is always 0 and the last is the total length; empty
/// polylines yield an empty table.
pub fn cumulative_distances(polyline: &LineString) -> Vec<f64> {
    let mut table = Vec::with_capacity(polyline.0.len());
    let mut total = 0.0;

    for (i, coord) in polyline.0.iter().enumerate() {
        if i > 0 {
            total += distance_meters(polyline.0[i - 1].into(), (*coord).into());
        }
        table.push(total);
    }

    table
}

/// Total length of a polyline in meters
pub fn polyline_length(polyline: &LineString) -> f64 {
    cumulative_distances(polyline).last().copied().unwrap_or(0.0)
}

/// The point at `fraction` of the polyline's length, measured along the line.
///
/// Walks the cumulative-distance table to the segment straddling
/// `fraction * length` and interpolates linearly inside it. This is not the
/// middle vertex: real street geometry has segments of very different lengths.
///
/// `fraction` is clamped to `[0, 1]` (NaN counts as 0). A single-vertex
/// polyline returns that vertex; an empty one returns `None`.
pub fn distance_weighted_point(polyline: &LineString, fraction: f64) -> Option<Point> {
    let coords = &polyline.0;
    match coords.len() {
        0 => return None,
        1 => return Some(coords[0].into()),
        _ => {}
    }

    let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };

    let table = cumulative_distances(polyline);
    let total = table[table.len() - 1];
    if total <= 0.0 {
        return Some(coords[0].into());
    }

    let target = fraction * total;

    // First vertex whose running distance reaches the target closes the segment
    let end = table.partition_point(|&d| d < target).clamp(1, coords.len() - 1);
    let start = end - 1;

    let segment_length = table[end] - table[start];
    if segment_length <= 0.0 {
        return Some(coords[start].into());
    }

    let t = (target - table[start]) / segment_length;
    Some(interpolate(coords[start], coords[end], t).into())
}

fn interpolate(a: Coord, b: Coord, t: f64) -> Coord {
    if t <= 0.0 {
        return a;
    }
    if t >= 1.0 {
        return b;
    }

    Coord {
        x: a.x + (b.x - a.x) * t,
        y: a.y + (b.y - a.y) * t,
    }
}

/// Convert meters to degrees of latitude (for bounding box queries)
pub fn meters_to_degrees_approx(meters: f64) -> f64 {
    meters / 111_320.0 // meters per degree at equator
}

/// Convert meters to degrees of longitude at the given latitude (for bounding box queries)
pub fn meters_to_longitude_degrees_approx(meters: f64, latitude: f64) -> f64 {
    let scale = latitude.to_radians().cos().abs().max(0.01);
    meters_to_degrees_approx(meters) / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use proptest::prelude::*;

    fn line(points: &[(f64, f64)]) -> LineString {
        LineString::from(points.to_vec())
    }

    #[test]
    fn test_haversine_distance() {
        // Distance from NYC to LA is approximately 3,936 km
        let nyc = Point::new(-74.0060, 40.7128);
        let la = Point::new(-118.2437, 34.0522);

        let dist = distance_meters(nyc, la);
        assert!((dist - 3_936_000.0).abs() < 50_000.0); // Within 50km
    }

    #[test]
    fn test_short_distance_in_santiago() {
        // Plaza de Armas to La Moneda, roughly 600 m
        let plaza = Point::new(-70.6506, -33.4378);
        let moneda = Point::new(-70.6540, -33.4429);

        let dist = distance_meters(plaza, moneda);
        assert!(dist > 550.0 && dist < 700.0, "got {dist}");
    }

    #[test]
    fn test_degenerate_inputs_are_finite() {
        let p = Point::new(-70.67, -33.45);
        assert_eq!(distance_meters(p, p), 0.0);

        let antipode = Point::new(109.33, 33.45);
        let dist = distance_meters(p, antipode);
        assert!(dist.is_finite());
        assert_relative_eq!(dist, std::f64::consts::PI * EARTH_RADIUS_METERS, max_relative = 1e-9);
    }

    #[test]
    fn test_monotonic_for_small_separations() {
        let origin = Point::new(-70.67, -33.45);
        let mut last = 0.0;
        for step in 1..50 {
            let p = Point::new(-70.67, -33.45 + step as f64 * 0.0001);
            let d = distance_meters(origin, p);
            assert!(d > last);
            last = d;
        }
    }

    #[test]
    fn test_cumulative_distances() {
        let poly = line(&[(0.0, 0.0), (0.0, 0.001), (0.0, 0.003)]);
        let table = cumulative_distances(&poly);

        assert_eq!(table.len(), 3);
        assert_eq!(table[0], 0.0);
        assert_relative_eq!(table[2], 2.0 * table[1] + table[1], max_relative = 1e-6);
        assert_relative_eq!(polyline_length(&poly), table[2]);

        assert!(cumulative_distances(&LineString::new(vec![])).is_empty());
        assert_eq!(polyline_length(&LineString::new(vec![])), 0.0);
    }

    #[test]
    fn test_weighted_point_trivial_polylines() {
        assert_eq!(distance_weighted_point(&LineString::new(vec![]), 0.5), None);

        let single = line(&[(-70.6, -33.4)]);
        assert_eq!(
            distance_weighted_point(&single, 0.5),
            Some(Point::new(-70.6, -33.4))
        );

        // All vertices identical: zero length, first vertex wins
        let collapsed = line(&[(-70.6, -33.4), (-70.6, -33.4)]);
        assert_eq!(
            distance_weighted_point(&collapsed, 0.7),
            Some(Point::new(-70.6, -33.4))
        );
    }

    #[test]
    fn test_weighted_point_clamps_fraction() {
        let poly = line(&[(0.0, 0.0), (0.0, 0.01)]);

        assert_eq!(distance_weighted_point(&poly, -3.0), Some(Point::new(0.0, 0.0)));
        assert_eq!(distance_weighted_point(&poly, 7.5), Some(Point::new(0.0, 0.01)));
        assert_eq!(distance_weighted_point(&poly, f64::NAN), Some(Point::new(0.0, 0.0)));
    }

    #[test]
    fn test_midpoint_follows_length_not_index() {
        // Three segments northward: 100 m, 100 m, then a long 800 m one.
        // An index midpoint lands on a vertex 100 m or 200 m in, but half
        // the length (500 m) lies inside the third segment.
        let deg_per_100m = 100.0 / 111_195.0;
        let poly = line(&[
            (-70.67, -33.45),
            (-70.67, -33.45 + deg_per_100m),
            (-70.67, -33.45 + 2.0 * deg_per_100m),
            (-70.67, -33.45 + 10.0 * deg_per_100m),
        ]);

        let table = cumulative_distances(&poly);
        let half = table[3] / 2.0;
        assert!(table[2] < half && half < table[3]);

        let mid = distance_weighted_point(&poly, 0.5).unwrap();
        assert_abs_diff_eq!(mid.x(), -70.67, epsilon = 1e-12);
        assert!(mid.y() > poly.0[2].y && mid.y() < poly.0[3].y);
        assert_abs_diff_eq!(mid.y(), -33.45 + 5.0 * deg_per_100m, epsilon = 1e-7);

        // Half the length lies on each side
        let before = distance_meters(poly.0[0].into(), poly.0[1].into())
            + distance_meters(poly.0[1].into(), poly.0[2].into())
            + distance_meters(poly.0[2].into(), mid);
        assert_relative_eq!(before, half, max_relative = 1e-4);
    }

    #[test]
    fn test_weighted_point_with_bends() {
        // L shape near the equator: 0.002 deg north, then 0.001 deg east
        let poly = line(&[(0.0, 0.0), (0.0, 0.002), (0.001, 0.002)]);
        let mid = distance_weighted_point(&poly, 0.5).unwrap();

        // Half the length falls three quarters of the way up the first leg
        assert_abs_diff_eq!(mid.x(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(mid.y(), 0.0015, epsilon = 1e-6);
    }

    fn coordinate() -> impl Strategy<Value = Point> {
        (-180.0f64..180.0, -89.9f64..89.9).prop_map(|(x, y)| Point::new(x, y))
    }

    proptest! {
        #[test]
        fn prop_distance_symmetric(a in coordinate(), b in coordinate()) {
            let ab = distance_meters(a, b);
            let ba = distance_meters(b, a);
            prop_assert!(ab.is_finite());
            prop_assert!((ab - ba).abs() <= 1e-9 * ab.max(1.0));
        }

        #[test]
        fn prop_distance_to_self_is_zero(a in coordinate()) {
            prop_assert_eq!(distance_meters(a, a), 0.0);
        }

        #[test]
        fn prop_weighted_point_endpoints(
            points in prop::collection::vec((-70.8f64..-70.5, -33.6f64..-33.3), 2..12)
        ) {
            let poly = LineString::from(points.clone());
            prop_assume!(polyline_length(&poly) > 1.0);

            let first = distance_weighted_point(&poly, 0.0).unwrap();
            let last = distance_weighted_point(&poly, 1.0).unwrap();
            let (fx, fy) = points[0];
            let (lx, ly) = points[points.len() - 1];

            prop_assert!((first.x() - fx).abs() < 1e-9 && (first.y() - fy).abs() < 1e-9);
            prop_assert!((last.x() - lx).abs() < 1e-9 && (last.y() - ly).abs() < 1e-9);
        }

        #[test]
        fn prop_midpoint_lies_on_a_segment(
            points in prop::collection::vec((-70.8f64..-70.5, -33.6f64..-33.3), 2..12)
        ) {
            let poly = LineString::from(points);
            prop_assume!(polyline_length(&poly) > 1.0);

            let mid = distance_weighted_point(&poly, 0.5).unwrap();
            let on_some_segment = poly.lines().any(|segment| {
                let (a, b) = (segment.start, segment.end);
                let cross = (b.x - a.x) * (mid.y() - a.y) - (b.y - a.y) * (mid.x() - a.x);
                let within_x = mid.x() >= a.x.min(b.x) - 1e-9 && mid.x() <= a.x.max(b.x) + 1e-9;
                let within_y = mid.y() >= a.y.min(b.y) - 1e-9 && mid.y() <= a.y.max(b.y) + 1e-9;
                cross.abs() < 1e-9 && within_x && within_y
            });
            prop_assert!(on_some_segment);
        }
    }
}
