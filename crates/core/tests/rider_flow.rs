//! Position → nearest stop → live arrivals → walking route, against
//! in-memory collaborators.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::Utc;
use dondeviene_core::arrivals::LiveArrivalSync;
use dondeviene_core::config::{GeolocationConfig, SyncConfig};
use dondeviene_core::geolocation::{FixedPositionSensor, GeolocationAcquisition, PermissionState};
use dondeviene_core::route::{RouteGeometryEngine, RouteState};
use dondeviene_core::transit::{
    ArrivalSnapshot, ArrivalSource, LineIdentifier, RawStop, RouteResponse, RouteSource,
    SourceFuture, StopCode, StopKind, StopSource, VehicleIdentifier, VehicleReport, nearby,
};
use geo::{LineString, Point};

struct CityStops;

impl StopSource for CityStops {
    fn stops_around(&self, _origin: Point) -> SourceFuture<Vec<RawStop>> {
        Box::pin(async { Ok(city_stops()) })
    }

    fn all_stops(&self) -> SourceFuture<Vec<RawStop>> {
        Box::pin(async { Ok(city_stops()) })
    }
}

fn city_stops() -> Vec<RawStop> {
    let mut kiosk = RawStop::bus_stop("9", "BIP-1", "Punto Bip!", Point::new(-70.6507, -33.4379));
    kiosk.kind = StopKind::FareCardPoint;

    vec![
        RawStop::bus_stop("2", "PA100", "Estacion Central", Point::new(-70.6790, -33.4510)),
        kiosk,
        RawStop::bus_stop("1", "PA433", "Plaza de Armas", Point::new(-70.6506, -33.4378)),
    ]
}

/// One bus approaching a minute per cycle
struct ApproachingBus {
    calls: AtomicU32,
}

impl ArrivalSource for ApproachingBus {
    fn arrivals(&self, stop: &StopCode) -> SourceFuture<ArrivalSnapshot> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let eta = 6u32.saturating_sub(call);
        let stop = stop.clone();
        Box::pin(async move {
            Ok(ArrivalSnapshot {
                stop,
                reports: vec![VehicleReport {
                    line_id: LineIdentifier::new("210"),
                    vehicle_id: VehicleIdentifier::new("FXRT-55"),
                    distance_meters: 400.0 * eta as f64,
                    min_eta: eta,
                    max_eta: eta + 2,
                    arriving: eta == 0,
                    line_valid: true,
                    destination: Some("Estacion Central".into()),
                    color: Some("#00A77E".into()),
                    status: None,
                }],
                fetched_at: Utc::now(),
            })
        })
    }
}

struct StraightWalk;

impl RouteSource for StraightWalk {
    fn walking_route(&self, from: Point, to: Point) -> SourceFuture<RouteResponse> {
        Box::pin(async move {
            Ok(RouteResponse {
                polyline: LineString::from(vec![from.0, to.0]),
                distance_meters: 61.0,
                duration_seconds: 44.0,
            })
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_rider_flow() {
    let me = Point::new(-70.6510, -33.4380);

    let geolocation = GeolocationAcquisition::spawn(
        Some(Arc::new(FixedPositionSensor::new(me))),
        GeolocationConfig::default(),
    );
    let fix = geolocation.request_permission().await.unwrap();
    assert_eq!(fix.coordinate, me);
    assert_eq!(geolocation.state().permission, PermissionState::Granted);

    let stops = CityStops.stops_around(fix.coordinate).await.unwrap();
    let ranked = nearby(fix.coordinate, &stops);
    assert_eq!(ranked.len(), 2);
    let chosen = &ranked[0];
    assert_eq!(chosen.code.as_str(), "PA433");

    let mut route = RouteGeometryEngine::new(Arc::new(StraightWalk));
    let mut route_updates = route.subscribe();
    route.set_endpoints(fix.coordinate, chosen.coordinate);

    let sync = LiveArrivalSync::spawn(
        Arc::new(ApproachingBus {
            calls: AtomicU32::new(0),
        }),
        chosen.code.clone(),
        &SyncConfig::default(),
    );
    let mut boards = sync.subscribe();

    route_updates
        .wait_for(|view| !matches!(view.state, RouteState::Pending))
        .await
        .unwrap();
    let RouteState::Ready(geometry) = route.view().state else {
        panic!("expected a walking route");
    };
    assert_eq!(geometry.total_distance_meters, 61.0);

    boards.changed().await.unwrap();
    let first = boards.borrow_and_update().clone();
    assert_eq!(first.entities[0].min_eta, 6);

    boards.changed().await.unwrap();
    let second = boards.borrow_and_update().clone();
    assert_eq!(second.entities[0].min_eta, 5);
    assert_eq!(second.entities[0].previous_min_eta, Some(6));
    assert_eq!(second.entities[0].previous_distance_meters, Some(2_400.0));

    // Nothing moves while paused
    sync.pause();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(!boards.has_changed().unwrap());
    assert_eq!(sync.board(), second);
}
