//! Stop and arrival data models, types, and traits.

pub mod traits;
pub mod types;

// Re-exports for convenience
pub use traits::StopProvider;
pub use types::{
    ArrivalSnapshot, RawStop, Result, RouteResponse, StopCandidate, StopKind, TransitError,
    VehicleReport,
};
