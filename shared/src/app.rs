//! The map screen core.
//!
//! `update` is the only place that touches the model. Capability answers
//! come back as internal events, so every step of a flow (gesture, submit,
//! favorite link, paged list, session restore) is a plain state change the
//! shell can replay in tests.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::{self, Api};
use crate::capabilities::{Capabilities, KvError, KvKey};
use crate::config::AppConfig;
use crate::error::{ApiError, FieldError};
use crate::event::{Event, Gesture, MapEvent};
use crate::forms::{LocationForm, LoginForm, RegistrationForm};
use crate::geo::{GeoPosition, MapViewport};
use crate::gesture::GestureClassifier;
use crate::markers::{Marker, MarkerStore};
use crate::model::{Coordinate, Location, SavedLocation, UnixTimeMs, User};
use crate::pagination::{
    LoadOutcome, LoadPhase, LocationLookup, PageRequest, PageStep, PaginationState,
    ResolvedSavedLocation, SavedLocationList, SkipReason, SkippedItem,
};
use crate::search::filter_saved;
use crate::session::{
    self, AuthState, AuthView, LegacyMigration, StoredSession, LOGOUT_FAILED, RESTORE_FAILED,
};

/// Whether a freshly created location made it into the user's favorites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FavoriteStatus {
    Linked(SavedLocation),
    NotAuthenticated,
    /// The location exists; only the link failed.
    LinkFailed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub location: Location,
    pub favorite: FavoriteStatus,
}

impl SubmitOutcome {
    pub fn warning(&self) -> Option<String> {
        match &self.favorite {
            FavoriteStatus::LinkFailed(reason) => Some(format!(
                "Location created, but it could not be added to your favorites: {reason}"
            )),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct SubmitState {
    pub in_flight: bool,
    pub outcome: Option<SubmitOutcome>,
    pub error: Option<ApiError>,
}

#[derive(Debug, Default)]
pub struct Model {
    pub config: AppConfig,
    pub config_error: Option<String>,
    pub api: Api,
    pub started: bool,

    pub classifier: GestureClassifier,
    pub markers: MarkerStore,
    /// Event time of the long-press behind the pending marker.
    pub pending_at: Option<UnixTimeMs>,
    pub form: Option<LocationForm>,
    pub geo: GeoPosition,

    pub auth: AuthState,
    pub saved: SavedLocationList,
    /// Items left out of the most recent page.
    pub skipped: Vec<SkippedItem>,
    pub search: String,
    pub submit: SubmitState,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ViewModel {
    // Map
    pub markers: Vec<Marker>,
    /// Same markers as a GeoJSON `FeatureCollection`.
    pub markers_geojson: String,
    pub pending_marker: Option<Coordinate>,
    pub form: Option<LocationForm>,
    pub viewport: MapViewport,
    pub location_error: Option<String>,

    // Account
    pub auth: AuthView,

    // Favorites
    pub saved: Vec<ResolvedSavedLocation>,
    pub search_query: String,
    pub pagination: PaginationState,
    pub list_phase: LoadPhase,
    pub list_error: Option<String>,
    pub skipped: Vec<SkippedItem>,

    // Submit
    pub submitting: bool,
    pub submit_outcome: Option<SubmitOutcome>,
    pub submit_warning: Option<String>,
    pub submit_error: Option<String>,
    pub field_errors: Vec<FieldError>,

    pub config_error: Option<String>,
}

#[derive(Default)]
pub struct App;

impl App {
    fn apply_config(config: AppConfig, model: &mut Model) {
        match config.validate() {
            Ok(()) => {
                model.api = Api::new(config.api.clone());
                model.classifier = GestureClassifier::new(config.gestures.clone());
                model.geo = GeoPosition::new(config.map.clone());
                model.config = config;
                model.config_error = None;
            }
            Err(e) => {
                warn!(error = %e, "configuration rejected, keeping defaults");
                model.config_error = Some(e.to_string());
            }
        }
    }

    fn locate(model: &Model, caps: &Capabilities) {
        caps.geolocation.current_position(Event::Located);
        debug!(status = ?model.geo.status(), "position requested");
    }

    // --- Gestures ---

    fn handle_map_event(event: &MapEvent, model: &mut Model, caps: &Capabilities) {
        let step = model.classifier.handle(event);
        if let Some(timer) = step.timer {
            caps.timer.start(timer, Event::TimerElapsed);
        }
        if let Some(gesture) = step.gesture {
            Self::on_gesture(gesture, event.at(), model);
        }
    }

    fn on_gesture(gesture: Gesture, at: UnixTimeMs, model: &mut Model) {
        match gesture {
            Gesture::LongPress(coordinate) => {
                model.markers.stage_pending(coordinate);
                model.pending_at = Some(at);
                model.form = Some(LocationForm::at(coordinate));
            }
            Gesture::Tap(_) | Gesture::Drag => debug!(?gesture, "gesture ignored"),
        }
    }

    // --- Submit ---

    fn submit(form: &LocationForm, model: &mut Model, caps: &Capabilities) {
        if model.submit.in_flight {
            debug!("submit already in flight");
            return;
        }
        model.submit.error = None;
        model.submit.outcome = None;

        match model.api.create_location(form) {
            Ok(request) => {
                model.submit.in_flight = true;
                request.send(&caps.http, |outcome| {
                    Event::LocationCreated(api::decode(outcome))
                });
            }
            Err(e) => {
                warn!(error = %e, "location not submitted");
                model.submit.error = Some(e);
            }
        }
    }

    fn location_created(location: Location, model: &mut Model, caps: &Capabilities) {
        info!(id = %location.id, "location created");
        let Some(user) = model.auth.user_reference() else {
            Self::finish_submit(location, FavoriteStatus::NotAuthenticated, model);
            return;
        };

        match model.api.save_location_for_user(&location.iri, &user) {
            Ok(request) => request.send(&caps.http, move |outcome| Event::FavoriteLinked {
                location,
                result: api::decode(outcome),
            }),
            Err(e) => Self::finish_submit(location, FavoriteStatus::LinkFailed(e.user_message()), model),
        }
    }

    /// Linked locations show up as remote markers. Anything else keeps the
    /// drop point as a custom marker under the location's name.
    fn finish_submit(location: Location, favorite: FavoriteStatus, model: &mut Model) {
        if matches!(favorite, FavoriteStatus::Linked(_)) {
            model.markers.discard_pending();
            if let Err(e) = model.markers.add_marker(Marker::remote(&location)) {
                warn!(error = %e, "remote marker not added");
            }
        } else {
            let at = model.pending_at.unwrap_or_default();
            match model.markers.confirm_pending(&location.name, at) {
                Ok(id) => debug!(%id, "drop point kept"),
                Err(e) => debug!(error = %e, "no drop point to keep"),
            }
        }

        info!(id = %location.id, favorite = ?favorite, "submit finished");
        model.pending_at = None;
        model.form = None;
        model.submit.in_flight = false;
        model.submit.outcome = Some(SubmitOutcome { location, favorite });
    }

    // --- Favorites list ---

    fn load_saved(
        model: &mut Model,
        caps: &Capabilities,
        claim: fn(&mut SavedLocationList) -> Result<PageRequest, SkipReason>,
    ) {
        let PageRequest { page, ticket, .. } = match claim(&mut model.saved) {
            Ok(request) => request,
            Err(reason) => {
                debug!(?reason, "saved locations load skipped");
                return;
            }
        };

        match model.api.get_saved_locations_page(page) {
            Ok(request) => request.send(&caps.http, move |outcome| Event::SavedPageLoaded {
                ticket,
                result: api::decode_saved_page(outcome),
            }),
            Err(e) => model.saved.page_failed(ticket, e),
        }
    }

    fn resolve_lookups(lookups: Vec<LocationLookup>, model: &mut Model, caps: &Capabilities) {
        for LocationLookup {
            ticket,
            index,
            location,
        } in lookups
        {
            match model.api.get_location_by_id(location.as_str()) {
                Ok(request) => {
                    request.send(&caps.http, move |outcome| Event::SavedItemResolved {
                        ticket,
                        index,
                        result: api::decode(outcome),
                    });
                }
                Err(e) => {
                    if let Some(outcome) = model.saved.item_resolved(ticket, index, Err(e)) {
                        Self::saved_loaded(outcome, model);
                    }
                }
            }
        }
    }

    fn saved_loaded(outcome: LoadOutcome, model: &mut Model) {
        model.markers.sync_remote(&model.saved.locations());
        if let LoadOutcome::Loaded { partial, .. } = outcome {
            model.skipped = partial.skipped;
        }
    }

    // --- Session ---

    fn session_key(model: &mut Model) -> Option<KvKey> {
        match session::session_key() {
            Ok(key) => Some(key),
            Err(e) => {
                model.auth.fail(ApiError::from(e).user_message());
                None
            }
        }
    }

    fn restore_session(model: &mut Model, caps: &Capabilities) {
        let Some(key) = Self::session_key(model) else {
            return;
        };
        model.auth.begin();
        caps.key_value.get(key.raw(), move |result| {
            Event::SessionRead(
                result
                    .map_err(KvError::from)
                    .and_then(|value| StoredSession::read(&key, value)),
            )
        });
    }

    fn read_legacy(model: &mut Model, caps: &Capabilities) {
        match session::legacy_keys() {
            Ok([user_key, _]) => caps.key_value.get(user_key.raw(), |result| {
                Event::LegacyUserRead(result.map_err(KvError::from))
            }),
            Err(e) => {
                warn!(error = %e, "legacy session keys unavailable");
                model.auth.settle_signed_out();
            }
        }
    }

    fn read_legacy_token(user: Option<Vec<u8>>, model: &mut Model, caps: &Capabilities) {
        match session::legacy_keys() {
            Ok([_, token_key]) => caps.key_value.get(token_key.raw(), move |result| {
                Event::LegacyRead(
                    result
                        .map(|token| LegacyMigration::from_pair(user, token))
                        .map_err(KvError::from),
                )
            }),
            Err(e) => {
                warn!(error = %e, "legacy session keys unavailable");
                model.auth.settle_signed_out();
            }
        }
    }

    fn migrate_legacy(migration: LegacyMigration, model: &mut Model, caps: &Capabilities) {
        match migration {
            LegacyMigration::Restore(stored) => {
                let Some(key) = Self::session_key(model) else {
                    return;
                };
                match model.auth.adopt(&key, stored) {
                    Ok(bytes) => {
                        caps.key_value.set(key.raw(), bytes, |result| {
                            Event::LegacyRecordWritten(result.map(drop).map_err(KvError::from))
                        });
                        Self::load_saved(model, caps, SavedLocationList::refresh);
                    }
                    Err(e) => {
                        warn!(error = %e, "legacy session not migrated");
                        model.auth.settle_signed_out();
                    }
                }
            }
            LegacyMigration::Discard => {
                Self::forget_legacy(caps);
                model.auth.settle_signed_out();
            }
            LegacyMigration::Nothing => model.auth.settle_signed_out(),
        }
    }

    fn forget_legacy(caps: &Capabilities) {
        match session::legacy_keys() {
            Ok(keys) => {
                for key in keys {
                    Self::forget(&key, caps);
                }
            }
            Err(e) => warn!(error = %e, "legacy session keys unavailable"),
        }
    }

    fn forget(key: &KvKey, caps: &Capabilities) {
        let name = key.raw();
        caps.key_value.delete(name.clone(), move |result| Event::StorageSettled {
            key: name,
            result: result.map(drop).map_err(KvError::from),
        });
    }

    fn login(form: &LoginForm, model: &Model, caps: &Capabilities) -> Result<(), ApiError> {
        form.validate()?;
        let username = form.username.trim().to_string();
        model
            .api
            .get_all_users()?
            .send(&caps.http, move |outcome| Event::UsersFetched {
                username,
                result: api::decode_members(outcome),
            });
        Ok(())
    }

    fn register(form: &RegistrationForm, model: &Model, caps: &Capabilities) -> Result<(), ApiError> {
        let payload = form.validate()?;
        model
            .api
            .create_user(&payload)?
            .send(&caps.http, |outcome| Event::UserCreated(api::decode(outcome)));
        Ok(())
    }

    /// The session only counts once the record is on disk.
    fn persist_session(user: User, model: &mut Model, caps: &Capabilities) -> Result<(), ApiError> {
        let key = session::session_key()?;
        let bytes = model.auth.stage(&key, user)?;
        caps.key_value.set(key.raw(), bytes, |result| {
            Event::SessionWritten(result.map(drop).map_err(KvError::from))
        });
        Ok(())
    }

    fn signed_in(result: Result<User, ApiError>, model: &mut Model, caps: &Capabilities) {
        if let Err(e) = result.and_then(|user| Self::persist_session(user, model, caps)) {
            warn!(error = %e, "sign in failed");
            model.auth.fail(e.user_message());
        }
    }
}

impl crux_core::App for App {
    type Event = Event;
    type Model = Model;
    type ViewModel = ViewModel;
    type Capabilities = Capabilities;

    #[allow(clippy::too_many_lines)]
    fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
        match event {
            Event::Start(config) => {
                if model.started {
                    debug!("already started");
                    return;
                }
                model.started = true;
                if let Some(config) = config {
                    Self::apply_config(config, model);
                }
                Self::restore_session(model, caps);
                if model.geo.request() {
                    Self::locate(model, caps);
                }
            }

            // --- Map ---
            Event::Map(map_event) => Self::handle_map_event(&map_event, model, caps),
            Event::TimerElapsed(timer) => {
                if let Some(gesture) = model.classifier.on_timer(timer.token, timer.fire_at) {
                    Self::on_gesture(gesture, timer.fire_at, model);
                }
            }
            Event::CancelPending => {
                model.markers.discard_pending();
                model.pending_at = None;
                model.form = None;
            }
            Event::RetryLocate => {
                if model.geo.retry() {
                    Self::locate(model, caps);
                }
            }
            Event::Located(result) => {
                if let Ok(coordinate) = model.geo.apply(result) {
                    model.markers.set_user_position(coordinate);
                }
            }

            // --- Submit ---
            Event::SubmitLocation(form) => {
                Self::submit(&form, model, caps);
                model.form = Some(form);
            }
            Event::LocationCreated(Ok(location)) => Self::location_created(location, model, caps),
            Event::LocationCreated(Err(e)) => {
                warn!(error = %e, "location not created");
                model.submit.in_flight = false;
                model.submit.error = Some(e);
            }
            Event::FavoriteLinked {
                location,
                result: Ok(saved),
            } => {
                Self::finish_submit(location, FavoriteStatus::Linked(saved), model);
                Self::load_saved(model, caps, SavedLocationList::refresh);
            }
            Event::FavoriteLinked {
                location,
                result: Err(e),
            } => {
                warn!(error = %e, "location created but not added to favorites");
                Self::finish_submit(location, FavoriteStatus::LinkFailed(e.user_message()), model);
            }

            // --- Favorites list ---
            Event::RefreshSaved => Self::load_saved(model, caps, SavedLocationList::refresh),
            Event::LoadMoreSaved => Self::load_saved(model, caps, SavedLocationList::load_more),
            Event::RetrySaved => Self::load_saved(model, caps, SavedLocationList::retry),
            Event::SavedPageLoaded {
                ticket,
                result: Ok(page),
            } => match model.saved.page_received(ticket, page) {
                PageStep::Resolve(lookups) => Self::resolve_lookups(lookups, model, caps),
                PageStep::Done(outcome) => Self::saved_loaded(outcome, model),
                PageStep::Stale => debug!(ticket, "stale page dropped"),
            },
            Event::SavedPageLoaded {
                ticket,
                result: Err(e),
            } => model.saved.page_failed(ticket, e),
            Event::SavedItemResolved {
                ticket,
                index,
                result,
            } => {
                if let Some(outcome) = model.saved.item_resolved(ticket, index, result) {
                    Self::saved_loaded(outcome, model);
                }
            }
            Event::DeleteSaved(id) => match model.api.delete_saved_location(&id) {
                Ok(request) => request.send(&caps.http, move |outcome| Event::SavedDeleted {
                    id,
                    result: api::expect_success(outcome),
                }),
                Err(e) => model.saved.delete_failed(e),
            },
            Event::SavedDeleted { id, result: Ok(()) } => {
                if model.saved.remove(&id) {
                    model.markers.sync_remote(&model.saved.locations());
                }
            }
            Event::SavedDeleted { result: Err(e), .. } => model.saved.delete_failed(e),
            Event::Search(query) => model.search = query,
            Event::DismissErrors => {
                model.auth.clear_error();
                model.saved.clear_error();
                model.submit.error = None;
                model.config_error = None;
            }

            // --- Account ---
            Event::Login(form) => {
                model.auth.begin();
                if let Err(e) = Self::login(&form, model, caps) {
                    model.auth.fail(e.user_message());
                }
            }
            Event::UsersFetched { username, result } => {
                let user = result
                    .and_then(|users| session::find_user(users, &username).map_err(ApiError::from));
                Self::signed_in(user, model, caps);
            }
            Event::Register(form) => {
                model.auth.begin();
                if let Err(e) = Self::register(&form, model, caps) {
                    model.auth.fail(e.user_message());
                }
            }
            Event::UserCreated(result) => Self::signed_in(result, model, caps),
            Event::SessionWritten(Ok(())) => {
                if let Some(user) = model.auth.commit() {
                    info!(user = %user.username, "signed in");
                    Self::load_saved(model, caps, SavedLocationList::refresh);
                }
            }
            Event::SessionWritten(Err(e)) => {
                warn!(error = %e, "session not stored");
                model.auth.fail(ApiError::from(e).user_message());
            }
            Event::Logout => {
                if let Some(key) = Self::session_key(model) {
                    model.auth.begin();
                    caps.key_value.delete(key.raw(), |result| {
                        Event::SessionCleared(result.map(drop).map_err(KvError::from))
                    });
                }
            }
            Event::SessionCleared(Ok(())) => {
                model.auth.sign_out();
                model.saved.reset();
                model.skipped.clear();
                model.markers.sync_remote(&[]);
                info!("signed out");
            }
            Event::SessionCleared(Err(e)) => {
                warn!(error = %e, "session not cleared");
                model.auth.fail(LOGOUT_FAILED);
            }

            // --- Session restore ---
            Event::SessionRead(Ok(Some(stored))) => {
                info!(user = %stored.user().username, "session restored");
                model.auth.restore(stored);
                Self::load_saved(model, caps, SavedLocationList::refresh);
            }
            Event::SessionRead(Ok(None)) => Self::read_legacy(model, caps),
            Event::SessionRead(Err(e)) => {
                warn!(error = %e, "stored session unreadable");
                model.auth.fail(RESTORE_FAILED);
            }
            Event::LegacyUserRead(Ok(user)) => Self::read_legacy_token(user, model, caps),
            Event::LegacyUserRead(Err(e)) | Event::LegacyRead(Err(e)) => {
                warn!(error = %e, "legacy session unreadable");
                model.auth.settle_signed_out();
            }
            Event::LegacyRead(Ok(migration)) => Self::migrate_legacy(migration, model, caps),
            Event::LegacyRecordWritten(Ok(())) => {
                info!("legacy session migrated");
                Self::forget_legacy(caps);
            }
            Event::LegacyRecordWritten(Err(e)) => {
                warn!(error = %e, "migrated session not stored, legacy entries kept");
            }
            Event::StorageSettled { key, result } => match result {
                Ok(()) => debug!(%key, "storage entry removed"),
                Err(e) => warn!(%key, error = %e, "storage entry not removed"),
            },
        }

        caps.render.render();
    }

    fn view(&self, model: &Model) -> ViewModel {
        let markers: Vec<Marker> = model.markers.list_markers().into_iter().cloned().collect();
        let markers_geojson = serde_json::to_string(&model.markers.to_geojson()).unwrap_or_default();
        let saved = filter_saved(model.saved.items(), &model.search)
            .into_iter()
            .cloned()
            .collect();
        let field_errors = match &model.submit.error {
            Some(ApiError::Validation(errors)) => errors.fields.clone(),
            _ => Vec::new(),
        };

        ViewModel {
            markers,
            markers_geojson,
            pending_marker: model.markers.pending(),
            form: model.form.clone(),
            viewport: model.geo.viewport(),
            location_error: model.geo.error_message(),
            auth: model.auth.view(),
            saved,
            search_query: model.search.clone(),
            pagination: model.saved.state(),
            list_phase: model.saved.phase(),
            list_error: model.saved.error().map(ApiError::user_message),
            skipped: model.skipped.clone(),
            submitting: model.submit.in_flight,
            submit_warning: model.submit.outcome.as_ref().and_then(SubmitOutcome::warning),
            submit_outcome: model.submit.outcome.clone(),
            submit_error: model.submit.error.as_ref().map(ApiError::user_message),
            field_errors,
            config_error: model.config_error.clone(),
        }
    }
}
