use dondeviene_transit::TransitError;

use crate::geolocation::PositionError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Position(#[from] PositionError),

    #[error(transparent)]
    Transit(#[from] TransitError),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
