use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use geo::Point;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod output;

use dondeviene_core::arrivals::LiveArrivalSync;
use dondeviene_core::geolocation::{
    FixedPositionSensor, GeolocationAcquisition, PositionError, PositionSensor,
};
use dondeviene_core::route::{RouteGeometryEngine, RouteState};
use dondeviene_core::sources::{MapboxDirections, RedClient};
use dondeviene_core::Config;
use dondeviene_transit::{nearby, StaticStopProvider, StopCode, StopProvider, StopSource};

#[derive(Parser, Debug)]
#[command(
    name = "dondeviene",
    author,
    version,
    about = "Find the nearest bus stop, watch live arrivals and get a walking route",
    long_about = "Terminal front end for Santiago's transit authority data.\n\n\
                  Tokens are read from the config file or from the \
                  RED_PREDICTOR_TOKEN and MAPBOX_ACCESS_TOKEN environment variables."
)]
struct Args {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output (show debug messages)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List bus stops nearest to a position
    Nearby {
        /// Latitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,

        /// Longitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: Option<f64>,

        /// Only stops within this many meters
        #[arg(long)]
        radius: Option<f64>,

        /// Maximum number of stops to print
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Follow live arrivals at a stop
    Arrivals {
        /// Stop code, e.g. PA433
        #[arg(long)]
        stop: String,

        /// Number of refresh cycles to print before exiting
        #[arg(long, default_value_t = 3)]
        cycles: u64,
    },

    /// Walking route between two points
    Route {
        /// Start as LAT,LON
        #[arg(long, value_parser = parse_lat_lon, allow_hyphen_values = true)]
        from: Point,

        /// Destination as LAT,LON
        #[arg(long, value_parser = parse_lat_lon, allow_hyphen_values = true)]
        to: Point,
    },
}

fn parse_lat_lon(value: &str) -> Result<Point, String> {
    let (lat, lon) = value
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LON, got '{value}'"))?;
    let lat: f64 = lat.trim().parse().map_err(|e| format!("bad latitude: {e}"))?;
    let lon: f64 = lon.trim().parse().map_err(|e| format!("bad longitude: {e}"))?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(format!("coordinate out of range: {lat},{lon}"));
    }
    Ok(Point::new(lon, lat))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => Config::default(),
    }
    .apply_env();

    match args.command {
        Command::Nearby {
            lat,
            lon,
            radius,
            limit,
        } => run_nearby(&config, lat, lon, radius, limit).await,
        Command::Arrivals { stop, cycles } => run_arrivals(&config, &stop, cycles).await,
        Command::Route { from, to } => run_route(&config, from, to).await,
    }
}

async fn run_nearby(
    config: &Config,
    lat: Option<f64>,
    lon: Option<f64>,
    radius: Option<f64>,
    limit: usize,
) -> Result<()> {
    let sensor: Option<Arc<dyn PositionSensor>> = match (lat, lon) {
        (Some(lat), Some(lon)) => Some(Arc::new(FixedPositionSensor::new(Point::new(lon, lat)))),
        (None, None) => None,
        _ => bail!("--lat and --lon must be given together"),
    };

    let geolocation = GeolocationAcquisition::spawn(sensor, config.geolocation.clone());
    let origin = match geolocation.request_permission().await {
        Ok(fix) => fix.coordinate,
        Err(PositionError::CapabilityUnavailable) => {
            bail!("No position available. Pass --lat and --lon, or use `arrivals --stop CODE`")
        }
        Err(e) => return Err(e).context("Failed to acquire position"),
    };
    geolocation.stop().await;

    let red = RedClient::new(&config.red)?;
    let raw = red
        .stops_around(origin)
        .await
        .context("Failed to fetch nearby stops")?;
    info!(records = raw.len(), "Fetched stop records");

    let mut ranked = match radius {
        Some(radius) => StaticStopProvider::from_raw(raw).stops_near(origin, radius),
        None => nearby(origin, &raw),
    };
    ranked.truncate(limit);

    if ranked.is_empty() {
        println!("No bus stops found near {:.5},{:.5}", origin.y(), origin.x());
        return Ok(());
    }
    output::print_stops(&ranked);
    Ok(())
}

async fn run_arrivals(config: &Config, stop: &str, cycles: u64) -> Result<()> {
    let red = Arc::new(RedClient::new(&config.red)?);
    let code = StopCode::new(stop.trim());

    match red.stop_by_code(&code).await {
        Ok(stop) => output::print_stop_header(&stop),
        Err(e) => warn!(error = %e, "Stop details unavailable"),
    }

    let sync = LiveArrivalSync::spawn(red.clone(), code, &config.sync);
    let mut updates = sync.subscribe();

    for _ in 0..cycles {
        let changed = tokio::select! {
            _ = tokio::signal::ctrl_c() => None,
            changed = updates.changed() => Some(changed),
        };
        let Some(changed) = changed else {
            info!("Interrupted");
            break;
        };

        changed.context("Arrival sync stopped unexpectedly")?;
        let board = updates.borrow_and_update().clone();
        output::print_board(&board);
    }
    Ok(())
}

async fn run_route(config: &Config, from: Point, to: Point) -> Result<()> {
    let directions = Arc::new(MapboxDirections::new(&config.mapbox)?);
    let mut engine = RouteGeometryEngine::new(directions);
    let mut updates = engine.subscribe();
    engine.set_endpoints(from, to);

    loop {
        updates
            .changed()
            .await
            .context("Route engine stopped unexpectedly")?;
        let state = updates.borrow_and_update().state.clone();
        match state {
            RouteState::Ready(route) => {
                output::print_route(&route);
                return Ok(());
            }
            RouteState::Unavailable => {
                println!("No walking route available");
                return Ok(());
            }
            RouteState::Idle | RouteState::Pending => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lat_lon() {
        assert_eq!(
            parse_lat_lon("-33.4378,-70.6506").unwrap(),
            Point::new(-70.6506, -33.4378)
        );
        assert_eq!(
            parse_lat_lon(" -33.45 , -70.67 ").unwrap(),
            Point::new(-70.67, -33.45)
        );
        assert!(parse_lat_lon("-33.45").is_err());
        assert!(parse_lat_lon("north,west").is_err());
        assert!(parse_lat_lon("-95.0,10.0").is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn test_negative_coordinates_parse() {
        let args = Args::try_parse_from([
            "dondeviene", "nearby", "--lat", "-33.45", "--lon", "-70.67", "--limit", "3",
        ])
        .unwrap();
        match args.command {
            Command::Nearby { lat, lon, limit, .. } => {
                assert_eq!(lat, Some(-33.45));
                assert_eq!(lon, Some(-70.67));
                assert_eq!(limit, 3);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
