//! Live vehicle arrivals for a chosen stop.
//!
//! A fetch starts partway through each cycle, but its result is held back
//! and applied only when the cycle completes. The visible board therefore
//! changes exactly when the countdown resets, however long the network
//! took, and a failed or slow fetch leaves the last good board in place.

pub mod board;
pub mod cycle;
pub mod engine;

pub use board::{build_entities, rank_arrivals, ArrivalBoard, ArrivalEntity};
pub use cycle::{SyncCycle, TickOutcome};
pub use engine::LiveArrivalSync;
