//! Walking directions from the Mapbox Directions API.

use std::sync::Arc;

use dondeviene_transit::{Result, RouteResponse, RouteSource, SourceFuture, TransitError};
use geo::{Coord, LineString, Point};
use serde::Deserialize;
use tracing::debug;

use super::{build_client, decode, fetch_text};
use crate::config::MapboxConfig;

#[derive(Clone)]
pub struct MapboxDirections {
    http: reqwest::Client,
    base_url: Arc<str>,
    access_token: Option<Arc<str>>,
}

impl MapboxDirections {
    pub fn new(config: &MapboxConfig) -> Result<Self> {
        Ok(Self {
            http: build_client(config.request_timeout())?,
            base_url: config.base_url.trim_end_matches('/').into(),
            access_token: config.access_token.as_deref().map(Arc::from),
        })
    }
}

impl RouteSource for MapboxDirections {
    fn walking_route(&self, from: Point, to: Point) -> SourceFuture<RouteResponse> {
        let Some(token) = self.access_token.clone() else {
            return Box::pin(async {
                Err(TransitError::UpstreamFetch("No Mapbox access token configured".into()))
            });
        };

        let url = format!(
            "{}/directions/v5/mapbox/walking/{},{};{},{}",
            self.base_url,
            from.x(),
            from.y(),
            to.x(),
            to.y()
        );
        let request = self
            .http
            .get(url)
            .query(&[("geometries", "geojson"), ("access_token", &*token)]);

        Box::pin(async move {
            let body = fetch_text(request).await?;
            let route = parse_directions(&body)?;
            debug!(
                distance_m = route.distance_meters,
                points = route.polyline.0.len(),
                "Fetched walking route"
            );
            Ok(route)
        })
    }
}

#[derive(Deserialize)]
struct Directions {
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
}

#[derive(Deserialize)]
struct DirectionsRoute {
    distance: f64,
    duration: f64,
    geometry: geojson::Geometry,
}

/// Take the first route of a directions response.
pub fn parse_directions(body: &str) -> Result<RouteResponse> {
    let directions: Directions = decode(body, "directions")?;
    let route = directions
        .routes
        .into_iter()
        .next()
        .ok_or(TransitError::NoRouteAvailable)?;

    Ok(RouteResponse {
        polyline: geometry_to_linestring(route.geometry.value)?,
        distance_meters: route.distance,
        duration_seconds: route.duration,
    })
}

fn geometry_to_linestring(value: geojson::Value) -> Result<LineString> {
    match value {
        geojson::Value::LineString(positions) => positions
            .iter()
            .map(|position| match position.as_slice() {
                [lon, lat, ..] => Ok(Coord { x: *lon, y: *lat }),
                _ => Err(TransitError::InvalidData(
                    "Route position has fewer than two ordinates".into(),
                )),
            })
            .collect::<Result<Vec<_>>>()
            .map(LineString::new),
        _ => Err(TransitError::InvalidData(
            "Route geometry is not a LineString".into(),
        )),
    }
}
