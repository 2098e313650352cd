use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::capabilities::GeoError;
use crate::config::MapConfig;
use crate::model::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapViewport {
    pub center: Coordinate,
    pub zoom: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GeoStatus {
    NotRequested,
    Requesting,
    Located(Coordinate),
    Failed(GeoError),
}

/// Asks the platform for the user's position at most once per session.
/// A failure is remembered until [`GeoPosition::retry`].
#[derive(Debug, Clone)]
pub struct GeoPosition {
    config: MapConfig,
    status: GeoStatus,
    viewport: MapViewport,
}

impl GeoPosition {
    pub fn new(config: MapConfig) -> Self {
        let viewport = MapViewport {
            center: config.default_center,
            zoom: config.default_zoom,
        };
        Self {
            config,
            status: GeoStatus::NotRequested,
            viewport,
        }
    }

    /// Whether a position query should go out now. True only the first
    /// time; later calls reuse the cached fix or failure.
    pub fn request(&mut self) -> bool {
        if self.status != GeoStatus::NotRequested {
            debug!(status = ?self.status, "position already requested");
            return false;
        }
        self.status = GeoStatus::Requesting;
        true
    }

    /// Forgets a previous result so a new query can go out. False while
    /// one is still outstanding.
    pub fn retry(&mut self) -> bool {
        if self.status == GeoStatus::Requesting {
            return false;
        }
        self.status = GeoStatus::Requesting;
        true
    }

    pub fn apply(&mut self, result: Result<Coordinate, GeoError>) -> Result<Coordinate, GeoError> {
        match result {
            Ok(coordinate) => {
                info!(%coordinate, "user located");
                self.status = GeoStatus::Located(coordinate);
                self.viewport = MapViewport {
                    center: coordinate,
                    zoom: self.config.user_location_zoom,
                };
                Ok(coordinate)
            }
            Err(e) => {
                warn!(error = %e, "could not locate user");
                self.status = GeoStatus::Failed(e.clone());
                Err(e)
            }
        }
    }

    pub fn status(&self) -> &GeoStatus {
        &self.status
    }

    pub fn position(&self) -> Option<Coordinate> {
        match self.status {
            GeoStatus::Located(c) => Some(c),
            _ => None,
        }
    }

    pub fn viewport(&self) -> MapViewport {
        self.viewport
    }

    pub fn error_message(&self) -> Option<String> {
        match &self.status {
            GeoStatus::Failed(e) => Some(e.to_string()),
            _ => None,
        }
    }
}

impl Default for GeoPosition {
    fn default() -> Self {
        Self::new(MapConfig::default())
    }
}
