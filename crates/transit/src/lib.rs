//! # dondeviene-transit
//!
//! Stop data, live-arrival data shapes and geographic math for the
//! "where is my bus" rider flow.
//!
//! ## Features
//!
//! - **Geo math**: haversine distance and distance-weighted polyline interpolation
//! - **Nearest stops**: deterministic nearest-first ranking of raw stop records
//! - **Spatial queries**: R-tree backed radius / k-nearest lookups over a full stop list
//! - **Pluggable networking**: implement the source traits to feed stops, arrivals and routes
//!
//! ## Example
//!
//! ```
//! use dondeviene_transit::prelude::*;
//! use geo::Point;
//!
//! let stops = vec![
//!     RawStop::bus_stop("1", "PA433", "Parada 3 / Plaza de Armas", Point::new(-70.6506, -33.4378)),
//!     RawStop::bus_stop("2", "PA100", "Parada 1 / Estación Central", Point::new(-70.6790, -33.4510)),
//! ];
//!
//! let origin = Point::new(-70.6510, -33.4380);
//! let ranked = nearby(origin, &stops);
//! assert_eq!(ranked[0].code.as_str(), "PA433");
//! ```

pub mod identifiers;
pub mod models;
pub mod network;
pub mod provider;
pub mod resolver;
pub mod spatial;

// Re-exports for convenience
pub mod prelude {
    pub use crate::identifiers::*;
    pub use crate::models::{traits::*, types::*};
    pub use crate::network::traits::*;
    pub use crate::provider::static_provider::StaticStopProvider;
    pub use crate::resolver::{by_code, nearby, rank_candidates};
    pub use crate::spatial::queries::{distance_meters, distance_weighted_point};
}

pub use prelude::*;
