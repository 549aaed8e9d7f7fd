//! Transit authority (red.cl) stop listings and arrival predictions.

use std::sync::{Arc, OnceLock};

use chrono::Utc;
use dondeviene_transit::{
    ArrivalSnapshot, ArrivalSource, LineIdentifier, RawStop, Result, SourceFuture, StopCandidate,
    StopCode, StopIdentifier, StopKind, StopSource, TransitError, VehicleIdentifier, VehicleReport,
};
use geo::Point;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{build_client, decode, fetch_text};
use crate::config::RedConfig;

const NEARBY_PATH: &str = "/restservice/rest/getpuntoparada/";
const ALL_STOPS_PATH: &str = "/restservice_v2/rest/getparadas/all";
const PREDICTOR_PATH: &str = "/predictor/prediccion";

/// Response codes for lines with vehicles on the way
const VALID_LINE_CODES: [&str; 2] = ["00", "01"];

#[derive(Clone)]
pub struct RedClient {
    http: reqwest::Client,
    base_url: Arc<str>,
    token: Option<Arc<str>>,
}

impl RedClient {
    pub fn new(config: &RedConfig) -> Result<Self> {
        Ok(Self {
            http: build_client(config.request_timeout())?,
            base_url: config.base_url.trim_end_matches('/').into(),
            token: config.predictor_token.as_deref().map(Arc::from),
        })
    }

    /// Location and name of a stop, from the predictor.
    pub async fn stop_by_code(&self, code: &StopCode) -> Result<StopCandidate> {
        let body = fetch_text(self.prediction_request(code)?).await?;
        parse_stop(code, &body)
    }

    fn prediction_request(&self, code: &StopCode) -> Result<reqwest::RequestBuilder> {
        let token = self
            .token
            .clone()
            .ok_or_else(|| TransitError::UpstreamFetch("No predictor token configured".into()))?;
        Ok(self
            .http
            .get(format!("{}{PREDICTOR_PATH}", self.base_url))
            .query(&[("t", &*token), ("codsimt", code.as_str()), ("codser", "")]))
    }
}

impl StopSource for RedClient {
    fn stops_around(&self, origin: Point) -> SourceFuture<Vec<RawStop>> {
        let request = self
            .http
            .get(format!("{}{NEARBY_PATH}", self.base_url))
            .query(&[
                ("lat", origin.y().to_string()),
                ("lon", origin.x().to_string()),
                ("bip", "1".to_string()),
            ]);

        Box::pin(async move {
            let body = fetch_text(request).await?;
            let stops = parse_stops(&body)?;
            debug!(count = stops.len(), "Fetched nearby stop points");
            Ok(stops)
        })
    }

    fn all_stops(&self) -> SourceFuture<Vec<RawStop>> {
        let request = self.http.get(format!("{}{ALL_STOPS_PATH}", self.base_url));

        Box::pin(async move {
            let body = fetch_text(request).await?;
            let stops = parse_all_stops(&body)?;
            debug!(count = stops.len(), "Fetched full stop listing");
            Ok(stops)
        })
    }
}

impl ArrivalSource for RedClient {
    fn arrivals(&self, stop: &StopCode) -> SourceFuture<ArrivalSnapshot> {
        let stop = stop.clone();
        let request = self.prediction_request(&stop);

        Box::pin(async move {
            let body = fetch_text(request?).await?;
            Ok(parse_prediction(&stop, &body)?.snapshot)
        })
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Deserialize)]
struct StopPoint {
    id: Value,
    cod: String,
    name: String,
    /// `[latitude, longitude]`
    pos: Option<[f64; 2]>,
    comuna: Option<String>,
    #[serde(rename = "type")]
    kind: u8,
}

impl StopPoint {
    fn into_raw(self) -> RawStop {
        RawStop {
            id: StopIdentifier::new(text(&self.id).unwrap_or_default()),
            code: StopCode::new(self.cod.trim()),
            name: self.name.into(),
            coordinate: self.pos.map(|[lat, lon]| Point::new(lon, lat)),
            kind: StopKind::from_authority(self.kind),
            commune: self.comuna.map(Arc::from),
        }
    }
}

/// The full listing is usually bare codes; tolerate full records too
#[derive(Deserialize)]
#[serde(untagged)]
enum ListedStop {
    Code(String),
    Point(StopPoint),
}

#[derive(Deserialize)]
struct Prediction {
    x: Option<Value>,
    y: Option<Value>,
    nomett: Option<String>,
    #[serde(default)]
    servicios: Option<Services>,
}

#[derive(Deserialize)]
struct Services {
    #[serde(default)]
    item: OneOrMany<ServiceItem>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Many(items) => items,
            Self::One(item) => vec![item],
        }
    }
}

#[derive(Deserialize)]
struct ServiceItem {
    codigorespuesta: String,
    servicio: String,
    #[serde(rename = "respuestaServicio")]
    respuesta_servicio: Option<String>,
    color: Option<String>,
    destino: Option<String>,
    distanciabus1: Option<Value>,
    distanciabus2: Option<Value>,
    horaprediccionbus1: Option<String>,
    horaprediccionbus2: Option<String>,
    ppubus1: Option<String>,
    ppubus2: Option<String>,
}

impl ServiceItem {
    fn into_reports(self) -> Vec<VehicleReport> {
        let line = self.servicio.trim().to_string();
        let line_id = LineIdentifier::new(&line);
        let destination: Option<Arc<str>> = non_empty(self.destino.as_deref()).map(Arc::from);
        let color: Option<Arc<str>> = non_empty(self.color.as_deref()).map(Arc::from);

        if !VALID_LINE_CODES.contains(&self.codigorespuesta.trim()) {
            return vec![VehicleReport {
                line_id,
                vehicle_id: VehicleIdentifier::new(&line),
                distance_meters: 0.0,
                min_eta: 0,
                max_eta: 0,
                arriving: false,
                line_valid: false,
                destination,
                color,
                status: non_empty(self.respuesta_servicio.as_deref()).map(Arc::from),
            }];
        }

        let slots = [
            (1, self.horaprediccionbus1, self.distanciabus1, self.ppubus1),
            (2, self.horaprediccionbus2, self.distanciabus2, self.ppubus2),
        ];

        slots
            .into_iter()
            .filter_map(|(slot, eta, distance, plate)| {
                let eta = parse_eta(eta.as_deref()?)?;
                let vehicle_id = match non_empty(plate.as_deref()) {
                    Some(plate) => VehicleIdentifier::new(plate),
                    None => VehicleIdentifier::new(format!("{line}#{slot}")),
                };
                Some(VehicleReport {
                    line_id: line_id.clone(),
                    vehicle_id,
                    distance_meters: distance.as_ref().and_then(number).unwrap_or(f64::NAN),
                    min_eta: eta.min,
                    max_eta: eta.max,
                    arriving: eta.arriving,
                    line_valid: true,
                    destination: destination.clone(),
                    color: color.clone(),
                    status: None,
                })
            })
            .collect()
    }
}

/// Parsed arrival text, in whole minutes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Eta {
    pub min: u32,
    pub max: u32,
    pub arriving: bool,
}

impl Eta {
    fn window(a: u32, b: u32) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
            arriving: false,
        }
    }
}

/// Parse the authority's arrival text ("Llegando.", "Menos de 5 min.",
/// "Entre 04 Y 08 min.", "Mas de 20 min.").
pub fn parse_eta(text: &str) -> Option<Eta> {
    let text = text.trim().to_lowercase();
    if text.starts_with("llegando") {
        return Some(Eta {
            min: 0,
            max: 0,
            arriving: true,
        });
    }

    let numbers: Vec<u32> = text
        .split(|c: char| !c.is_ascii_digit())
        .filter_map(|part| part.parse().ok())
        .collect();
    let first = *numbers.first()?;

    if text.starts_with("menos de") {
        return Some(Eta::window(0, first));
    }
    if text.starts_with("mas de") || text.starts_with("más de") {
        return Some(Eta::window(first, first));
    }

    match numbers.get(1) {
        Some(&second) => Some(Eta::window(first, second)),
        None => Some(Eta::window(first, first)),
    }
}

pub struct ParsedPrediction {
    pub stop: Option<StopCandidate>,
    pub snapshot: ArrivalSnapshot,
}

pub fn parse_prediction(code: &StopCode, body: &str) -> Result<ParsedPrediction> {
    let prediction: Prediction = decode(body, "prediction")?;

    let coordinate = match (
        prediction.x.as_ref().and_then(number),
        prediction.y.as_ref().and_then(number),
    ) {
        (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some(Point::new(lon, lat)),
        _ => None,
    };
    let stop = coordinate.map(|coordinate| StopCandidate {
        id: StopIdentifier::new(code.as_str()),
        code: code.clone(),
        name: match non_empty(prediction.nomett.as_deref()) {
            Some(name) => name.into(),
            None => format!("Paradero {code}").into(),
        },
        coordinate,
        distance_meters: 0.0,
    });

    let reports = prediction
        .servicios
        .map(|services| services.item.into_vec())
        .unwrap_or_default()
        .into_iter()
        .flat_map(ServiceItem::into_reports)
        .collect();

    Ok(ParsedPrediction {
        stop,
        snapshot: ArrivalSnapshot {
            stop: code.clone(),
            reports,
            fetched_at: Utc::now(),
        },
    })
}

/// Stop details from a predictor answer.
///
/// The predictor sometimes answers with the stop's HTML page instead of
/// JSON; the position then comes from its `data-lat`/`data-lng` attributes
/// and the name from the page heading.
pub fn parse_stop(code: &StopCode, body: &str) -> Result<StopCandidate> {
    let stop = match parse_prediction(code, body) {
        Ok(parsed) => parsed.stop,
        Err(error) => {
            debug!(%code, %error, "Predictor answer is not JSON, reading stop page");
            parse_stop_page(code, body)
        }
    };
    stop.ok_or_else(|| TransitError::StopNotFound(code.clone()))
}

struct StopPagePatterns {
    lat: Regex,
    lng: Regex,
    heading: Regex,
}

fn stop_page_patterns() -> Option<&'static StopPagePatterns> {
    static PATTERNS: OnceLock<Option<StopPagePatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(StopPagePatterns {
                lat: Regex::new(r#"data-lat="([^"]+)""#).ok()?,
                lng: Regex::new(r#"data-lng="([^"]+)""#).ok()?,
                heading: Regex::new(r#"<h1 class="[^"]*">([^<]+)</h1>"#).ok()?,
            })
        })
        .as_ref()
}

fn parse_stop_page(code: &StopCode, html: &str) -> Option<StopCandidate> {
    let patterns = stop_page_patterns()?;
    let capture = |pattern: &Regex| {
        pattern
            .captures(html)
            .and_then(|found| found.get(1))
            .map(|group| group.as_str())
    };

    let lat: f64 = capture(&patterns.lat)?.trim().parse().ok()?;
    let lng: f64 = capture(&patterns.lng)?.trim().parse().ok()?;
    if !lat.is_finite() || !lng.is_finite() {
        return None;
    }

    let name = match non_empty(capture(&patterns.heading)) {
        Some(name) => name.into(),
        None => format!("Paradero {code}").into(),
    };

    Some(StopCandidate {
        id: StopIdentifier::new(code.as_str()),
        code: code.clone(),
        name,
        coordinate: Point::new(lng, lat),
        distance_meters: 0.0,
    })
}

pub fn parse_stops(body: &str) -> Result<Vec<RawStop>> {
    let points: Vec<StopPoint> = decode(body, "stop points")?;
    Ok(points.into_iter().map(StopPoint::into_raw).collect())
}

pub fn parse_all_stops(body: &str) -> Result<Vec<RawStop>> {
    let listed: Vec<ListedStop> = decode(body, "stop listing")?;
    Ok(listed
        .into_iter()
        .map(|stop| match stop {
            ListedStop::Code(code) => {
                let code = code.trim();
                RawStop {
                    id: StopIdentifier::new(code),
                    code: StopCode::new(code),
                    name: code.into(),
                    coordinate: None,
                    kind: StopKind::BusStop,
                    commune: None,
                }
            }
            ListedStop::Point(point) => point.into_raw(),
        })
        .collect())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Numbers arrive both as JSON numbers and as strings
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NEARBY: &str = r#"[
        {"id": 1, "cod": "PA433", "pos": [-33.4378, -70.6506], "name": "Parada 3 / Plaza de Armas", "comuna": "Santiago", "type": 0, "distancia": 0.12},
        {"id": 2, "cod": "BIP-881", "pos": [-33.4381, -70.6510], "name": "Punto Bip! Metro", "comuna": "Santiago", "type": 1, "distancia": 0.05},
        {"id": 3, "cod": "PA434", "pos": null, "name": "Parada 4", "comuna": "Santiago", "type": 0, "distancia": 0.3}
    ]"#;

    const PREDICTION: &str = r##"{
        "x": "-33.4378", "y": "-70.6506", "nomett": "PA433-Parada 3 / Plaza de Armas",
        "servicios": {"item": [
            {"codigorespuesta": "00", "servicio": "210", "destino": "Estacion Central",
             "color": "#00A77E", "respuestaServicio": "",
             "horaprediccionbus1": "Menos de 5 min.", "distanciabus1": "1243", "ppubus1": "FXRT-55",
             "horaprediccionbus2": "Entre 11 Y 15 min.", "distanciabus2": "4102", "ppubus2": ""},
            {"codigorespuesta": "01", "servicio": "506", "destino": "Maipu", "color": "#E3001B",
             "horaprediccionbus1": "Llegando.", "distanciabus1": 80, "ppubus1": "BJFH-28"},
            {"codigorespuesta": "10", "servicio": "D18", "destino": "Vitacura",
             "respuestaServicio": "Fuera de horario de operacion para ese paradero"}
        ]}
    }"##;

    #[test]
    fn test_parse_eta_formats() {
        let eta = |text| parse_eta(text).unwrap();

        assert_eq!(eta("Llegando."), Eta { min: 0, max: 0, arriving: true });
        assert_eq!(eta("Menos de 5 min."), Eta::window(0, 5));
        assert_eq!(eta("Entre 04 Y 08 min. "), Eta::window(4, 8));
        assert_eq!(eta("Mas de 20 min."), Eta::window(20, 20));
        assert_eq!(eta("Más de 25 min."), Eta::window(25, 25));
        assert_eq!(eta("12 min"), Eta::window(12, 12));
        assert!(parse_eta("Sin informacion").is_none());
        assert!(parse_eta("").is_none());
    }

    #[test]
    fn test_parse_nearby_stops() {
        let stops = parse_stops(NEARBY).unwrap();
        assert_eq!(stops.len(), 3);

        let plaza = &stops[0];
        assert_eq!(plaza.code.as_str(), "PA433");
        assert_eq!(plaza.id.as_str(), "1");
        assert_eq!(plaza.coordinate, Some(Point::new(-70.6506, -33.4378)));
        assert_eq!(plaza.commune.as_deref(), Some("Santiago"));
        assert!(plaza.kind.is_bus_stop());

        assert_eq!(stops[1].kind, StopKind::FareCardPoint);
        assert!(stops[2].coordinate.is_none());

        // Only the located bus stop survives ranking
        let ranked = dondeviene_transit::nearby(Point::new(-70.6510, -33.4380), &stops);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].code.as_str(), "PA433");
    }

    #[test]
    fn test_parse_all_stops() {
        let stops = parse_all_stops(r#"["PA433", " PA434 ", "PJ1"]"#).unwrap();
        let codes: Vec<&str> = stops.iter().map(|s| s.code.as_str()).collect();
        assert_eq!(codes, vec!["PA433", "PA434", "PJ1"]);
        assert!(stops.iter().all(|s| s.coordinate.is_none()));

        assert!(parse_all_stops("{}").is_err());
    }

    #[test]
    fn test_parse_prediction() {
        let code = StopCode::new("PA433");
        let parsed = parse_prediction(&code, PREDICTION).unwrap();

        let stop = parsed.stop.unwrap();
        assert_eq!(stop.coordinate, Point::new(-70.6506, -33.4378));
        assert_eq!(&*stop.name, "PA433-Parada 3 / Plaza de Armas");

        let reports = parsed.snapshot.reports;
        assert_eq!(reports.len(), 4);

        let first = &reports[0];
        assert_eq!(first.line_id.as_str(), "210");
        assert_eq!(first.vehicle_id.as_str(), "FXRT-55");
        assert_eq!((first.min_eta, first.max_eta), (0, 5));
        assert_eq!(first.distance_meters, 1243.0);
        assert_eq!(first.destination.as_deref(), Some("Estacion Central"));

        // Missing plate falls back to a slot id
        assert_eq!(reports[1].vehicle_id.as_str(), "210#2");
        assert_eq!((reports[1].min_eta, reports[1].max_eta), (11, 15));

        let arriving = &reports[2];
        assert!(arriving.arriving);
        assert_eq!(arriving.distance_meters, 80.0);

        let closed = &reports[3];
        assert!(!closed.line_valid);
        assert_eq!(closed.vehicle_id.as_str(), "D18");
        assert_eq!(
            closed.status.as_deref(),
            Some("Fuera de horario de operacion para ese paradero")
        );
    }

    #[test]
    fn test_single_service_item_object() {
        let body = r#"{"x": -33.45, "y": -70.67, "servicios": {"item":
            {"codigorespuesta": "00", "servicio": "401", "horaprediccionbus1": "Entre 02 Y 04 min.", "distanciabus1": "650"}}}"#;
        let parsed = parse_prediction(&StopCode::new("PC1"), body).unwrap();

        assert_eq!(parsed.snapshot.reports.len(), 1);
        assert_eq!(parsed.snapshot.reports[0].vehicle_id.as_str(), "401#1");
        assert_eq!(&*parsed.stop.unwrap().name, "Paradero PC1");
    }

    #[test]
    fn test_prediction_without_services_or_position() {
        let parsed = parse_prediction(&StopCode::new("PX9"), r#"{"nomett": "Sin datos"}"#).unwrap();
        assert!(parsed.stop.is_none());
        assert!(parsed.snapshot.reports.is_empty());

        assert!(matches!(
            parse_prediction(&StopCode::new("PX9"), "<html>"),
            Err(TransitError::UpstreamFetch(_))
        ));
    }

    #[test]
    fn test_stop_details() {
        let code = StopCode::new("PA433");

        let stop = parse_stop(&code, PREDICTION).unwrap();
        assert_eq!(stop.coordinate, Point::new(-70.6506, -33.4378));

        let page = r#"<html><body>
            <div id="mapa" data-lat="-33.4378" data-lng="-70.6506"></div>
            <h1 class="titulo-paradero">PA433 - Plaza de Armas</h1>
        </body></html>"#;
        let stop = parse_stop(&code, page).unwrap();
        assert_eq!(stop.coordinate, Point::new(-70.6506, -33.4378));
        assert_eq!(&*stop.name, "PA433 - Plaza de Armas");
        assert_eq!(stop.distance_meters, 0.0);

        let untitled = r#"<div data-lat="-33.45" data-lng="-70.67"></div>"#;
        assert_eq!(&*parse_stop(&code, untitled).unwrap().name, "Paradero PA433");

        assert!(matches!(
            parse_stop(&code, "<html>Servicio no disponible</html>"),
            Err(TransitError::StopNotFound(_))
        ));
        assert!(matches!(
            parse_stop(&code, r#"{"nomett": "Sin datos"}"#),
            Err(TransitError::StopNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_arrivals_need_a_token() {
        let client = RedClient::new(&RedConfig::default()).unwrap();
        let result = client.arrivals(&StopCode::new("PA433")).await;
        assert!(matches!(result, Err(TransitError::UpstreamFetch(_))));
    }
}
