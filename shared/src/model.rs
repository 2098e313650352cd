use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinateError {
    #[error("Latitude {0} is out of valid range [-90, 90]")]
    LatitudeOutOfRange(f64),
    #[error("Longitude {0} is out of valid range [-180, 180]")]
    LongitudeOutOfRange(f64),
    #[error("Coordinates must be finite numbers")]
    NonFinite,
}

/// Validated WGS84 position.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate", into = "RawCoordinate")]
pub struct Coordinate {
    lat: f64,
    lon: f64,
}

#[derive(Copy, Clone, Serialize, Deserialize)]
struct RawCoordinate {
    latitude: f64,
    longitude: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Result<Self, CoordinateError> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(CoordinateError::NonFinite);
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(CoordinateError::LatitudeOutOfRange(lat));
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Err(CoordinateError::LongitudeOutOfRange(lon));
        }
        Ok(Self { lat, lon })
    }

    /// For constants known to be in range.
    pub(crate) const fn new_unchecked(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    #[must_use]
    pub const fn latitude(&self) -> f64 {
        self.lat
    }

    #[must_use]
    pub const fn longitude(&self) -> f64 {
        self.lon
    }
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = CoordinateError;

    fn try_from(raw: RawCoordinate) -> Result<Self, Self::Error> {
        Self::new(raw.latitude, raw.longitude)
    }
}

impl From<Coordinate> for RawCoordinate {
    fn from(c: Coordinate) -> Self {
        Self {
            latitude: c.lat,
            longitude: c.lon,
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.lat, self.lon)
    }
}

/// Explicit timestamp unit.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnixTimeMs(pub u64);

impl UnixTimeMs {
    pub fn now() -> Self {
        let ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Self(ms)
    }

    pub fn elapsed_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    pub fn add_millis(self, ms: u64) -> Self {
        Self(self.0.saturating_add(ms))
    }
}

/// Resource reference as handed out by the backend: either a bare id
/// (`"42"`) or a path-style IRI (`"/api/locations/42"`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Iri(String);

impl Iri {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Trailing path segment. Falls back to the whole reference when it
    /// has no non-empty segment.
    pub fn id(&self) -> &str {
        reference_id(&self.0)
    }
}

impl fmt::Display for Iri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn reference_id(reference: &str) -> &str {
    let path = reference
        .split(['?', '#'])
        .next()
        .unwrap_or(reference);
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or(reference)
}

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Accepts a bare id or a full reference and keeps the trailing segment.
            pub fn from_reference(reference: &str) -> Self {
                Self(reference_id(reference).to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

typed_id!(LocationId);
typed_id!(SavedLocationId);
typed_id!(UserId);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl Visibility {
    /// Form toggle: on means public.
    pub fn from_toggle(is_public: bool) -> Self {
        if is_public {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

fn default_true() -> bool {
    true
}

/// Location as the backend serves it. Serializes back to the same
/// JSON-LD shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LocationResource", into = "LocationResource")]
pub struct Location {
    pub iri: Iri,
    pub id: LocationId,
    pub name: String,
    pub description: String,
    pub coordinate: Coordinate,
    pub visibility: Visibility,
    pub active: bool,
}

#[derive(Serialize, Deserialize)]
struct LocationResource {
    #[serde(rename = "@id")]
    iri: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    visibility: Visibility,
    #[serde(rename = "isActif", default = "default_true")]
    active: bool,
}

impl TryFrom<LocationResource> for Location {
    type Error = CoordinateError;

    fn try_from(raw: LocationResource) -> Result<Self, Self::Error> {
        Ok(Self {
            id: LocationId::from_reference(&raw.iri),
            iri: Iri::new(raw.iri),
            name: raw.name,
            description: raw.description,
            coordinate: Coordinate::new(raw.latitude, raw.longitude)?,
            visibility: raw.visibility,
            active: raw.active,
        })
    }
}

impl From<Location> for LocationResource {
    fn from(location: Location) -> Self {
        Self {
            iri: location.iri.0,
            name: location.name,
            description: location.description,
            latitude: location.coordinate.latitude(),
            longitude: location.coordinate.longitude(),
            visibility: location.visibility,
            active: location.active,
        }
    }
}

/// Favorite link between a user and a location.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SavedLocationResource", into = "SavedLocationResource")]
pub struct SavedLocation {
    pub iri: Iri,
    pub id: SavedLocationId,
    pub location: Iri,
    pub user: Iri,
    pub active: bool,
}

#[derive(Serialize, Deserialize)]
struct SavedLocationResource {
    #[serde(rename = "@id")]
    iri: String,
    location: String,
    user: String,
    #[serde(rename = "isActif", default = "default_true")]
    active: bool,
}

impl From<SavedLocationResource> for SavedLocation {
    fn from(raw: SavedLocationResource) -> Self {
        Self {
            id: SavedLocationId::from_reference(&raw.iri),
            iri: Iri::new(raw.iri),
            location: Iri::new(raw.location),
            user: Iri::new(raw.user),
            active: raw.active,
        }
    }
}

impl From<SavedLocation> for SavedLocationResource {
    fn from(saved: SavedLocation) -> Self {
        Self {
            iri: saved.iri.0,
            location: saved.location.0,
            user: saved.user.0,
            active: saved.active,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "@id")]
    pub iri: Iri,
    pub username: String,
    pub email: String,
    #[serde(rename = "isActif", default = "default_true")]
    pub active: bool,
}

impl User {
    pub fn id(&self) -> UserId {
        UserId::from_reference(self.iri.as_str())
    }
}

/// Body of `POST /locations`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewLocation {
    pub name: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub visibility: Visibility,
}

/// Body of `PATCH /locations/{id}`. Absent fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LocationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    #[serde(rename = "isActif", skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

/// Body of `POST /saved_locations`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NewSavedLocation {
    pub location: Iri,
    pub user: Iri,
}

/// Body of `POST /users` and `PATCH /users/{id}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UserPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Hydra collection page. Members are decoded one at a time so a
/// malformed entry does not take the rest of the page with it.
#[derive(Clone, Debug, Deserialize)]
#[serde(bound(deserialize = ""))]
pub struct Collection<T> {
    #[serde(default)]
    member: Vec<serde_json::Value>,
    #[serde(rename = "totalItems", default)]
    pub total_items: Option<u64>,
    #[serde(default)]
    pub view: Option<PartialView>,
    #[serde(skip)]
    _member: PhantomData<fn() -> T>,
}

/// A collection member that could not be decoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedMember {
    /// The member's `@id`, when it had one.
    pub iri: Option<Iri>,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Members<T> {
    pub decoded: Vec<T>,
    pub rejected: Vec<RejectedMember>,
}

impl<T> Collection<T> {
    pub fn has_next(&self) -> bool {
        self.view.as_ref().and_then(|v| v.next.as_ref()).is_some()
    }
}

impl<T: DeserializeOwned> Collection<T> {
    /// Decodes every member in order. Null members are dropped silently.
    pub fn into_members(self) -> Members<T> {
        let mut members = Members {
            decoded: Vec::with_capacity(self.member.len()),
            rejected: Vec::new(),
        };
        for value in self.member {
            if value.is_null() {
                continue;
            }
            let iri = value
                .get("@id")
                .and_then(serde_json::Value::as_str)
                .map(Iri::new);
            match serde_json::from_value::<T>(value) {
                Ok(member) => members.decoded.push(member),
                Err(e) => members.rejected.push(RejectedMember {
                    iri,
                    reason: e.to_string(),
                }),
            }
        }
        members
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct PartialView {
    #[serde(rename = "@id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub first: Option<String>,
    #[serde(default)]
    pub last: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    #[serde(default)]
    pub next: Option<String>,
}
