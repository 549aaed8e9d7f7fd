//! The device position sensor seam.

use std::future::{self, Future};
use std::pin::Pin;

use futures_core::Stream;
use futures_util::stream::{self, StreamExt};
use geo::Point;

use super::{PositionError, PositionFix, PositionOptions, SensorPermission};

pub type FixFuture = Pin<Box<dyn Future<Output = Result<PositionFix, PositionError>> + Send + 'static>>;
pub type FixStream = Pin<Box<dyn Stream<Item = Result<PositionFix, PositionError>> + Send + 'static>>;
pub type PermissionFuture = Pin<Box<dyn Future<Output = SensorPermission> + Send + 'static>>;

/// Platform position API.
///
/// Only [`GeolocationAcquisition`](super::GeolocationAcquisition) talks to
/// a sensor; a device without one is modelled as no sensor at all.
pub trait PositionSensor: Send + Sync {
    /// One position fix. The caller bounds the wait with `options.timeout`
    /// as well, so implementations may ignore it.
    fn request_once(&self, options: &PositionOptions) -> FixFuture;

    /// Continuous updates. Dropping the stream cancels the watch.
    fn watch(&self, options: &PositionOptions) -> FixStream;

    /// Current permission, without prompting. A platform that cannot
    /// answer the query should report `Denied`.
    fn permission_status(&self) -> PermissionFuture {
        Box::pin(future::ready(SensorPermission::Prompt))
    }
}

/// A sensor that always reports the same coordinate.
///
/// Used when the position is known up front (typed in, or passed on the
/// command line).
#[derive(Clone, Debug)]
pub struct FixedPositionSensor {
    coordinate: Point,
}

impl FixedPositionSensor {
    pub fn new(coordinate: Point) -> Self {
        Self { coordinate }
    }
}

impl PositionSensor for FixedPositionSensor {
    fn request_once(&self, _options: &PositionOptions) -> FixFuture {
        let fix = PositionFix::new(self.coordinate);
        Box::pin(future::ready(Ok(fix)))
    }

    fn watch(&self, _options: &PositionOptions) -> FixStream {
        let fix = PositionFix::new(self.coordinate);
        stream::once(future::ready(Ok(fix)))
            .chain(stream::pending())
            .boxed()
    }

    /// The coordinate was handed over explicitly
    fn permission_status(&self) -> PermissionFuture {
        Box::pin(future::ready(SensorPermission::Granted))
    }
}
