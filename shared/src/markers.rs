use geojson::{feature::Id, Feature, FeatureCollection, Geometry, JsonObject, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

use crate::model::{Coordinate, Location, UnixTimeMs};

pub const USER_MARKER_ID: &str = "user-location";
pub const USER_MARKER_LABEL: &str = "You are here";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct MarkerId(String);

impl MarkerId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn user() -> Self {
        Self(USER_MARKER_ID.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MarkerKind {
    User,
    Custom,
    Remote,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Marker {
    pub id: MarkerId,
    pub coordinate: Coordinate,
    pub label: String,
    pub kind: MarkerKind,
}

impl Marker {
    pub fn remote(location: &Location) -> Self {
        Self {
            id: MarkerId::new(format!("location-{}", location.id)),
            coordinate: location.coordinate,
            label: location.name.clone(),
            kind: MarkerKind::Remote,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MarkerError {
    #[error("no pending marker to confirm")]
    NothingPending,
    #[error("marker label cannot be empty")]
    EmptyLabel,
    #[error("marker id '{0}' is reserved for the user position")]
    ReservedId(String),
}

/// Ordered marker collection. The user marker is held apart so it always
/// lists first; the rest keep insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerStore {
    user: Option<Marker>,
    markers: Vec<Marker>,
    pending: Option<Coordinate>,
}

impl MarkerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `marker`, replacing any marker with the same id in place.
    pub fn add_marker(&mut self, marker: Marker) -> Result<(), MarkerError> {
        if marker.kind == MarkerKind::User {
            self.user = Some(Marker {
                id: MarkerId::user(),
                ..marker
            });
            return Ok(());
        }
        if marker.id.as_str() == USER_MARKER_ID {
            return Err(MarkerError::ReservedId(marker.id.0));
        }

        match self.markers.iter_mut().find(|m| m.id == marker.id) {
            Some(existing) => *existing = marker,
            None => self.markers.push(marker),
        }
        Ok(())
    }

    /// Returns whether a marker was removed.
    pub fn remove_marker(&mut self, id: &MarkerId) -> bool {
        if id.as_str() == USER_MARKER_ID {
            return self.user.take().is_some();
        }
        let before = self.markers.len();
        self.markers.retain(|m| &m.id != id);
        self.markers.len() != before
    }

    pub fn list_markers(&self) -> Vec<&Marker> {
        self.user.iter().chain(self.markers.iter()).collect()
    }

    pub fn get(&self, id: &MarkerId) -> Option<&Marker> {
        self.list_markers().into_iter().find(|m| &m.id == id)
    }

    pub fn len(&self) -> usize {
        self.markers.len() + usize::from(self.user.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_user_position(&mut self, coordinate: Coordinate) {
        self.user = Some(Marker {
            id: MarkerId::user(),
            coordinate,
            label: USER_MARKER_LABEL.to_string(),
            kind: MarkerKind::User,
        });
    }

    // --- Pending drop (long-press awaiting the form) ---

    /// Replaces any earlier pending coordinate.
    pub fn stage_pending(&mut self, coordinate: Coordinate) {
        debug!(%coordinate, "pending marker staged");
        self.pending = Some(coordinate);
    }

    pub fn pending(&self) -> Option<Coordinate> {
        self.pending
    }

    pub fn discard_pending(&mut self) -> Option<Coordinate> {
        self.pending.take()
    }

    /// Turns the pending coordinate into a custom marker with a
    /// timestamp id, suffixed `-n` when that id is taken.
    pub fn confirm_pending(
        &mut self,
        label: &str,
        now: UnixTimeMs,
    ) -> Result<MarkerId, MarkerError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(MarkerError::EmptyLabel);
        }
        let coordinate = self.pending.take().ok_or(MarkerError::NothingPending)?;

        let base = format!("custom-{}", now.0);
        let mut id = MarkerId::new(base.clone());
        let mut n = 1;
        while self.markers.iter().any(|m| m.id == id) {
            id = MarkerId::new(format!("{base}-{n}"));
            n += 1;
        }

        self.markers.push(Marker {
            id: id.clone(),
            coordinate,
            label: label.to_string(),
            kind: MarkerKind::Custom,
        });
        info!(%id, "custom marker added");
        Ok(id)
    }

    /// Replaces every remote marker with one per location, in the given order.
    pub fn sync_remote(&mut self, locations: &[Location]) {
        self.markers.retain(|m| m.kind != MarkerKind::Remote);
        for location in locations {
            let marker = Marker::remote(location);
            match self.markers.iter_mut().find(|m| m.id == marker.id) {
                Some(existing) => *existing = marker,
                None => self.markers.push(marker),
            }
        }
        debug!(count = locations.len(), "remote markers synced");
    }

    /// Point features for the map renderer, in listing order.
    pub fn to_geojson(&self) -> FeatureCollection {
        let features = self
            .list_markers()
            .into_iter()
            .map(|marker| {
                let mut properties = JsonObject::new();
                properties.insert("label".to_string(), marker.label.clone().into());
                properties.insert(
                    "kind".to_string(),
                    serde_json::to_value(marker.kind).unwrap_or_default(),
                );
                Feature {
                    bbox: None,
                    geometry: Some(Geometry::new(Value::Point(vec![
                        marker.coordinate.longitude(),
                        marker.coordinate.latitude(),
                    ]))),
                    id: Some(Id::String(marker.id.to_string())),
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();

        FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }
    }
}
