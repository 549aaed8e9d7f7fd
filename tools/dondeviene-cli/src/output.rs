use dondeviene_core::arrivals::{ArrivalBoard, ArrivalEntity};
use dondeviene_core::route::RouteGeometry;
use dondeviene_transit::StopCandidate;

/// Print ranked stops as a table
pub fn print_stops(stops: &[StopCandidate]) {
    println!("{:<4} {:<10} {:>9}  NAME", "#", "CODE", "DISTANCE");
    for (rank, stop) in stops.iter().enumerate() {
        println!(
            "{:<4} {:<10} {:>9}  {}",
            rank + 1,
            stop.code.as_str(),
            format_distance(stop.distance_meters),
            stop.name
        );
    }
}

pub fn print_stop_header(stop: &StopCandidate) {
    println!(
        "{} {} ({:.5},{:.5})",
        stop.code,
        stop.name,
        stop.coordinate.y(),
        stop.coordinate.x()
    );
}

pub fn print_board(board: &ArrivalBoard) {
    let stamp = board
        .updated_at
        .map(|at| at.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string());
    let note = if board.fetch_failed { "  (update failed, showing last data)" } else { "" };
    println!("\n[{}] cycle {} at {stamp}{note}", board.stop, board.cycle);

    if board.entities.is_empty() {
        println!("  no buses reported");
        return;
    }

    for entity in board.entities.iter() {
        println!("  {}", format_entity(entity));
    }
}

pub fn print_route(route: &RouteGeometry) {
    println!(
        "Walking route: {} in about {} min",
        format_distance(route.total_distance_meters),
        (route.duration_seconds / 60.0).round() as u64
    );
    println!(
        "Midpoint: {:.6},{:.6} ({} points)",
        route.midpoint.y(),
        route.midpoint.x(),
        route.polyline.0.len()
    );
}

fn format_entity(entity: &ArrivalEntity) -> String {
    if !entity.valid {
        return format!(
            "{:<6} {}",
            entity.line_id.as_str(),
            entity.status.as_deref().unwrap_or("not in service")
        );
    }

    let eta = if entity.arriving {
        "arriving".to_string()
    } else if entity.min_eta == entity.max_eta {
        format!("{} min", entity.min_eta)
    } else {
        format!("{}-{} min", entity.min_eta, entity.max_eta)
    };
    let trend = match entity.previous_min_eta {
        Some(previous) if previous != entity.min_eta => format!(" (was {previous} min)"),
        _ => String::new(),
    };

    format!(
        "{:<6} {:<10} {:>10} {:>9}  {}{trend}",
        entity.line_id.as_str(),
        entity.vehicle_id.as_str(),
        eta,
        format_distance(entity.distance_meters),
        entity.destination.as_deref().unwrap_or("")
    )
}

fn format_distance(meters: f64) -> String {
    if meters >= 1_000.0 {
        format!("{:.1} km", meters / 1_000.0)
    } else {
        format!("{:.0} m", meters)
    }
}
