//! Walking route geometry between the rider and a stop.
//!
//! Routing is decoration: every failure ends up as "no route to draw" and
//! never as an error the caller has to handle.

use std::sync::Arc;

use dondeviene_transit::{distance_weighted_point, RouteResponse, RouteSource};
use geo::{LineString, Point};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Clone, Debug, PartialEq)]
pub struct RouteGeometry {
    pub polyline: LineString,
    /// As reported by the routing service, not re-measured
    pub total_distance_meters: f64,
    pub duration_seconds: f64,
    /// Point halfway along the path by distance
    pub midpoint: Point,
}

impl RouteGeometry {
    /// `None` when the response has no usable polyline.
    pub fn from_response(response: RouteResponse) -> Option<Self> {
        let midpoint = distance_weighted_point(&response.polyline, 0.5)?;
        Some(Self {
            polyline: response.polyline,
            total_distance_meters: response.distance_meters,
            duration_seconds: response.duration_seconds,
            midpoint,
        })
    }
}

/// Request a walking route and derive its geometry.
pub async fn walking_route(source: &dyn RouteSource, from: Point, to: Point) -> Option<RouteGeometry> {
    match source.walking_route(from, to).await {
        Ok(response) => {
            let geometry = RouteGeometry::from_response(response);
            if geometry.is_none() {
                warn!("Routing service returned an empty path");
            }
            geometry
        }
        Err(error) => {
            warn!(%error, "No walking route available");
            None
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RouteEndpoints {
    pub from: Point,
    pub to: Point,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum RouteState {
    #[default]
    Idle,
    Pending,
    Ready(Arc<RouteGeometry>),
    Unavailable,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RouteView {
    pub endpoints: Option<RouteEndpoints>,
    pub state: RouteState,
}

/// Keeps the route for the current endpoints, refetching on every change.
///
/// A response is applied only if the endpoints it was requested for are
/// still the current ones.
pub struct RouteGeometryEngine {
    source: Arc<dyn RouteSource>,
    view: Arc<watch::Sender<RouteView>>,
    in_flight: Option<JoinHandle<()>>,
}

impl RouteGeometryEngine {
    pub fn new(source: Arc<dyn RouteSource>) -> Self {
        let (view, _) = watch::channel(RouteView::default());
        Self {
            source,
            view: Arc::new(view),
            in_flight: None,
        }
    }

    /// Point the route at new endpoints. Must be called inside a tokio
    /// runtime; unchanged endpoints are a no-op.
    pub fn set_endpoints(&mut self, from: Point, to: Point) {
        let endpoints = RouteEndpoints { from, to };
        if self.view.borrow().endpoints == Some(endpoints) {
            return;
        }

        self.cancel();
        self.view.send_replace(RouteView {
            endpoints: Some(endpoints),
            state: RouteState::Pending,
        });

        let source = self.source.clone();
        let view = self.view.clone();
        self.in_flight = Some(tokio::spawn(async move {
            let state = match walking_route(source.as_ref(), from, to).await {
                Some(geometry) => RouteState::Ready(Arc::new(geometry)),
                None => RouteState::Unavailable,
            };

            view.send_if_modified(|current| {
                if current.endpoints != Some(endpoints) {
                    debug!("Dropping route for superseded endpoints");
                    return false;
                }
                current.state = state;
                true
            });
        }));
    }

    /// Forget the endpoints and any request in flight.
    pub fn clear(&mut self) {
        self.cancel();
        self.view.send_replace(RouteView::default());
    }

    pub fn view(&self) -> RouteView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RouteView> {
        self.view.subscribe()
    }

    fn cancel(&mut self) {
        if let Some(task) = self.in_flight.take() {
            task.abort();
        }
    }
}

impl Drop for RouteGeometryEngine {
    fn drop(&mut self) {
        self.cancel();
    }
}
