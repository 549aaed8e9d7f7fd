//! Turning vehicle reports into the ranked, animation-ready board.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dondeviene_transit::{
    ArrivalSnapshot, LineIdentifier, StopCode, VehicleIdentifier, VehicleReport,
};

/// One tracked vehicle on one line.
///
/// `previous_*` hold the values this vehicle had on the prior applied
/// cycle so a renderer can animate from old to new.
#[derive(Clone, Debug, PartialEq)]
pub struct ArrivalEntity {
    pub vehicle_id: VehicleIdentifier,
    pub line_id: LineIdentifier,
    pub distance_meters: f64,
    pub min_eta: u32,
    pub max_eta: u32,
    pub valid: bool,
    pub arriving: bool,
    pub previous_distance_meters: Option<f64>,
    pub previous_min_eta: Option<u32>,
    pub destination: Option<Arc<str>>,
    pub color: Option<Arc<str>>,
    pub status: Option<Arc<str>>,
}

impl ArrivalEntity {
    fn from_report(report: &VehicleReport, previous: Option<&ArrivalEntity>) -> Self {
        Self {
            vehicle_id: report.vehicle_id.clone(),
            line_id: report.line_id.clone(),
            distance_meters: report.distance_meters,
            min_eta: report.min_eta,
            max_eta: report.max_eta,
            valid: report.line_valid,
            arriving: report.arriving,
            previous_distance_meters: previous.map(|p| p.distance_meters),
            previous_min_eta: previous.map(|p| p.min_eta),
            destination: report.destination.clone(),
            color: report.color.clone(),
            status: report.status.clone(),
        }
    }
}

/// The published arrival list for one stop.
///
/// Entities are shared behind an `Arc` and never mutated once published.
#[derive(Clone, Debug, PartialEq)]
pub struct ArrivalBoard {
    pub stop: StopCode,
    pub entities: Arc<[ArrivalEntity]>,
    /// Set when the last cycle ended without a fresh snapshot
    pub fetch_failed: bool,
    /// Applied cycles so far
    pub cycle: u64,
    /// When the shown entities were fetched
    pub updated_at: Option<DateTime<Utc>>,
}

impl ArrivalBoard {
    pub fn empty(stop: StopCode) -> Self {
        Self {
            stop,
            entities: Arc::from(Vec::new()),
            fetch_failed: false,
            cycle: 0,
            updated_at: None,
        }
    }

    /// The board that follows this one once a cycle completes.
    ///
    /// `None` keeps the current entities and raises `fetch_failed`.
    pub fn next(&self, snapshot: Option<&ArrivalSnapshot>) -> Self {
        match snapshot {
            Some(snapshot) => Self {
                stop: self.stop.clone(),
                entities: build_entities(&self.entities, &snapshot.reports).into(),
                fetch_failed: false,
                cycle: self.cycle + 1,
                updated_at: Some(snapshot.fetched_at),
            },
            None => Self {
                stop: self.stop.clone(),
                entities: self.entities.clone(),
                fetch_failed: true,
                cycle: self.cycle + 1,
                updated_at: self.updated_at,
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Build the next entity list, carrying previous values by `(line, vehicle)`.
pub fn build_entities(previous: &[ArrivalEntity], reports: &[VehicleReport]) -> Vec<ArrivalEntity> {
    let by_key: HashMap<(&LineIdentifier, &VehicleIdentifier), &ArrivalEntity> = previous
        .iter()
        .map(|entity| ((&entity.line_id, &entity.vehicle_id), entity))
        .collect();

    let mut entities: Vec<ArrivalEntity> = reports
        .iter()
        .filter(|report| report.is_well_formed())
        .map(|report| {
            let prior = by_key.get(&(&report.line_id, &report.vehicle_id)).copied();
            ArrivalEntity::from_report(report, prior)
        })
        .collect();

    rank_arrivals(&mut entities);
    entities
}

/// Arriving vehicles first, then soonest first; invalid lines last.
///
/// Stable, so equal keys keep report order.
pub fn rank_arrivals(entities: &mut [ArrivalEntity]) {
    entities.sort_by_key(|entity| (!entity.valid, !entity.arriving, entity.min_eta));
}
