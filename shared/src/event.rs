use serde::{Deserialize, Serialize};

use crate::api::SavedLocationPage;
use crate::capabilities::{GeoError, KvError};
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::forms::{LocationForm, LoginForm, RegistrationForm};
use crate::gesture::TimerRequest;
use crate::model::{Coordinate, Location, SavedLocation, SavedLocationId, UnixTimeMs, User};
use crate::session::{LegacyMigration, StoredSession};

// --- App events: shell input first, capability answers after ---

#[derive(Serialize, Deserialize, Debug)]
pub enum Event {
    /// First event after launch. `None` keeps the built-in configuration.
    Start(Option<AppConfig>),

    // Map
    Map(MapEvent),
    CancelPending,
    RetryLocate,

    // Locations
    SubmitLocation(LocationForm),
    RefreshSaved,
    LoadMoreSaved,
    RetrySaved,
    DeleteSaved(SavedLocationId),
    Search(String),
    DismissErrors,

    // Account
    Login(LoginForm),
    Register(RegistrationForm),
    Logout,

    #[serde(skip)]
    TimerElapsed(TimerRequest),
    #[serde(skip)]
    Located(Result<Coordinate, GeoError>),
    #[serde(skip)]
    LocationCreated(Result<Location, ApiError>),
    #[serde(skip)]
    FavoriteLinked {
        location: Location,
        result: Result<SavedLocation, ApiError>,
    },
    #[serde(skip)]
    SavedPageLoaded {
        ticket: u64,
        result: Result<SavedLocationPage, ApiError>,
    },
    #[serde(skip)]
    SavedItemResolved {
        ticket: u64,
        index: usize,
        result: Result<Location, ApiError>,
    },
    #[serde(skip)]
    SavedDeleted {
        id: SavedLocationId,
        result: Result<(), ApiError>,
    },
    #[serde(skip)]
    UsersFetched {
        username: String,
        result: Result<Vec<User>, ApiError>,
    },
    #[serde(skip)]
    UserCreated(Result<User, ApiError>),
    #[serde(skip)]
    SessionRead(Result<Option<StoredSession>, KvError>),
    #[serde(skip)]
    LegacyUserRead(Result<Option<Vec<u8>>, KvError>),
    #[serde(skip)]
    LegacyRead(Result<LegacyMigration, KvError>),
    #[serde(skip)]
    LegacyRecordWritten(Result<(), KvError>),
    #[serde(skip)]
    SessionWritten(Result<(), KvError>),
    #[serde(skip)]
    SessionCleared(Result<(), KvError>),
    #[serde(skip)]
    StorageSettled {
        key: String,
        result: Result<(), KvError>,
    },
}

// --- Raw map input, as reported by the shell's map widget ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum MapEvent {
    /// Generic "map clicked" message.
    Clicked {
        at: UnixTimeMs,
        coordinate: Coordinate,
    },
    PressIn {
        at: UnixTimeMs,
        coordinate: Coordinate,
    },
    PressOut {
        at: UnixTimeMs,
    },
    /// Pan or zoom. Always counts as a drag.
    RegionChanged {
        at: UnixTimeMs,
    },
    /// The widget's own long-press callback.
    NativeLongPress {
        at: UnixTimeMs,
        coordinate: Coordinate,
    },
}

impl MapEvent {
    pub fn at(&self) -> UnixTimeMs {
        match self {
            MapEvent::Clicked { at, .. }
            | MapEvent::PressIn { at, .. }
            | MapEvent::PressOut { at }
            | MapEvent::RegionChanged { at }
            | MapEvent::NativeLongPress { at, .. } => *at,
        }
    }

    pub fn coordinate(&self) -> Option<Coordinate> {
        match self {
            MapEvent::Clicked { coordinate, .. }
            | MapEvent::PressIn { coordinate, .. }
            | MapEvent::NativeLongPress { coordinate, .. } => Some(*coordinate),
            MapEvent::PressOut { .. } | MapEvent::RegionChanged { .. } => None,
        }
    }
}

// --- Classified output ---

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub enum Gesture {
    LongPress(Coordinate),
    Tap(Coordinate),
    Drag,
}

impl Gesture {
    pub fn long_press_coordinate(&self) -> Option<Coordinate> {
        match self {
            Gesture::LongPress(c) => Some(*c),
            _ => None,
        }
    }
}
