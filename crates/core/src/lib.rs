//! Rider-side behaviour for dondeviene: where am I, which stop is nearest,
//! when does my bus arrive and how do I walk there.

pub mod arrivals;
pub mod config;
pub mod error;
pub mod geolocation;
pub mod route;
pub mod sources;

pub use config::Config;
pub use error::{Error, Result};

// Re-export transit from the transit crate
pub use dondeviene_transit as transit;
