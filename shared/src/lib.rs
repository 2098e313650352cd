// lib.rs - shared core for the map app: gestures, markers, sync, session

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod api;
pub mod app;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod event;
pub mod forms;
pub mod geo;
pub mod gesture;
pub mod markers;
pub mod model;
pub mod pagination;
pub mod search;
pub mod session;

pub use api::{Api, SavedLocationPage};
pub use app::{App, FavoriteStatus, Model, SubmitOutcome, ViewModel};
pub use capabilities::{Capabilities, Effect};
pub use config::AppConfig;
pub use error::{ApiError, ErrorKind, ValidationError};
pub use event::{Event, Gesture, MapEvent};
pub use gesture::{GestureClassifier, GestureStrategy};
pub use markers::{Marker, MarkerKind, MarkerStore};
pub use model::{Coordinate, Location, SavedLocation, User};
pub use pagination::{LoadOutcome, PartialPage, SavedLocationList};
pub use session::{AuthState, AuthView};
