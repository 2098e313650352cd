use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Coordinate;

#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum GeoError {
    #[error("Permission to access location was denied")]
    PermissionDenied,

    #[error("Could not get your location: {0}")]
    Unavailable(String),

    #[error("Platform reported an invalid position ({lat}, {lon})")]
    InvalidPosition { lat: f64, lon: f64 },
}

/// Foreground position query. The shell asks for permission first.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum GeolocationOperation {
    CurrentPosition,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum PositionFix {
    Located { latitude: f64, longitude: f64 },
    PermissionDenied,
    Unavailable { reason: String },
}

impl Operation for GeolocationOperation {
    type Output = PositionFix;
}

impl PositionFix {
    /// Range-checks the platform's answer.
    pub fn into_coordinate(self) -> Result<Coordinate, GeoError> {
        match self {
            PositionFix::Located {
                latitude,
                longitude,
            } => Coordinate::new(latitude, longitude).map_err(|_| GeoError::InvalidPosition {
                lat: latitude,
                lon: longitude,
            }),
            PositionFix::PermissionDenied => Err(GeoError::PermissionDenied),
            PositionFix::Unavailable { reason } => Err(GeoError::Unavailable(reason)),
        }
    }
}

pub struct Geolocation<Ev> {
    context: CapabilityContext<GeolocationOperation, Ev>,
}

impl<Ev> Capability<Ev> for Geolocation<Ev> {
    type Operation = GeolocationOperation;
    type MappedSelf<MappedEv> = Geolocation<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        Geolocation::new(self.context.map_event(f))
    }
}

impl<Ev> Geolocation<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<GeolocationOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn current_position<F>(&self, make_event: F)
    where
        F: FnOnce(Result<Coordinate, GeoError>) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let fix = ctx
                .request_from_shell(GeolocationOperation::CurrentPosition)
                .await;
            ctx.update_app(make_event(fix.into_coordinate()));
        });
    }
}
