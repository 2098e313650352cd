//! Requests and response decoding for the locations backend (JSON-LD
//! resources, Hydra collections).
//!
//! Builders return a checked [`ApiRequest`] that `update` hands to the
//! shell. Decoders turn the shell's answer into `Result<_, ApiError>`:
//! transport failures become `Network`, non-2xx responses become `Http`
//! with the problem payload's message, and bodies that do not parse
//! become `Decode`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::capabilities::{ApiRequest, ContentType, HttpOutcome};
use crate::config::ApiConfig;
use crate::error::{response_body, ApiError};
use crate::forms::LocationForm;
use crate::model::{
    Collection, Iri, LocationId, LocationPatch, Members, NewSavedLocation, RejectedMember,
    SavedLocation, SavedLocationId, UserId, UserPayload,
};

/// One server page of saved locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedLocationPage {
    pub items: Vec<SavedLocation>,
    /// Members the page carried but that could not be decoded.
    pub rejected: Vec<RejectedMember>,
    pub total_items: u64,
    pub has_next: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Api {
    config: ApiConfig,
}

impl Api {
    pub fn new(config: ApiConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    // --- Locations ---

    pub fn get_all_locations(&self, page: u32, active: Option<bool>) -> Result<ApiRequest, ApiError> {
        let mut path = format!("/locations?page={}", page.max(1));
        if let Some(active) = active {
            path.push_str(&format!("&isActif={active}"));
        }
        self.get(&path)
    }

    /// Accepts a bare id or a full reference such as `/api/locations/42`.
    pub fn get_location_by_id(&self, reference: &str) -> Result<ApiRequest, ApiError> {
        let id = LocationId::from_reference(reference);
        self.get(&format!("/locations/{id}"))
    }

    /// Validates the form locally before anything is built.
    pub fn create_location(&self, form: &LocationForm) -> Result<ApiRequest, ApiError> {
        let body = form.validate()?;
        Ok(ApiRequest::post(self.config.endpoint("/locations"))?
            .with_json_as(&body, ContentType::JsonLd)?)
    }

    pub fn update_location(
        &self,
        id: &LocationId,
        patch: &LocationPatch,
    ) -> Result<ApiRequest, ApiError> {
        Ok(
            ApiRequest::patch(self.config.endpoint(&format!("/locations/{id}")))?
                .with_json_as(patch, ContentType::MergePatch)?,
        )
    }

    // --- Saved locations ---

    /// Links a location to a user as a favorite.
    pub fn save_location_for_user(&self, location: &Iri, user: &Iri) -> Result<ApiRequest, ApiError> {
        let body = NewSavedLocation {
            location: location.clone(),
            user: user.clone(),
        };
        Ok(ApiRequest::post(self.config.endpoint("/saved_locations"))?
            .with_json_as(&body, ContentType::JsonLd)?)
    }

    /// The whole collection; narrow it with [`saved_for_user`].
    pub fn get_saved_locations(&self) -> Result<ApiRequest, ApiError> {
        self.get("/saved_locations")
    }

    /// `page` is 1-indexed.
    pub fn get_saved_locations_page(&self, page: u32) -> Result<ApiRequest, ApiError> {
        self.get(&format!("/saved_locations?page={}", page.max(1)))
    }

    pub fn delete_saved_location(&self, id: &SavedLocationId) -> Result<ApiRequest, ApiError> {
        Ok(ApiRequest::delete(
            self.config.endpoint(&format!("/saved_locations/{id}")),
        )?)
    }

    // --- Users ---

    pub fn get_all_users(&self) -> Result<ApiRequest, ApiError> {
        self.get("/users")
    }

    pub fn get_user(&self, reference: &str) -> Result<ApiRequest, ApiError> {
        let id = UserId::from_reference(reference);
        self.get(&format!("/users/{id}"))
    }

    pub fn create_user(&self, payload: &UserPayload) -> Result<ApiRequest, ApiError> {
        Ok(ApiRequest::post(self.config.endpoint("/users"))?
            .with_json_as(payload, ContentType::JsonLd)?)
    }

    pub fn update_user(&self, id: &UserId, payload: &UserPayload) -> Result<ApiRequest, ApiError> {
        Ok(
            ApiRequest::patch(self.config.endpoint(&format!("/users/{id}")))?
                .with_json_as(payload, ContentType::MergePatch)?,
        )
    }

    fn get(&self, path: &str) -> Result<ApiRequest, ApiError> {
        Ok(ApiRequest::get(self.config.endpoint(path))?)
    }
}

/// Decodes a single resource from a 2xx response.
pub fn decode<T: DeserializeOwned>(outcome: HttpOutcome) -> Result<T, ApiError> {
    parse(&response_body(outcome)?)
}

/// Accepts any 2xx, including an empty `204`.
pub fn expect_success(outcome: HttpOutcome) -> Result<(), ApiError> {
    response_body(outcome).map(drop)
}

/// Decoded members of a collection response.
pub fn decode_members<T: DeserializeOwned>(outcome: HttpOutcome) -> Result<Vec<T>, ApiError> {
    parse_members(&response_body(outcome)?)
}

pub fn decode_saved_page(outcome: HttpOutcome) -> Result<SavedLocationPage, ApiError> {
    parse_saved_page(&response_body(outcome)?)
}

pub fn parse<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::decode(&e))
}

/// Members that fail to decode are logged and left out.
pub fn parse_members<T: DeserializeOwned>(body: &[u8]) -> Result<Vec<T>, ApiError> {
    let collection: Collection<T> = parse(body)?;
    let Members { decoded, rejected } = collection.into_members();
    for member in &rejected {
        warn!(iri = ?member.iri, reason = %member.reason, "skipping malformed member");
    }
    Ok(decoded)
}

pub fn parse_saved_page(body: &[u8]) -> Result<SavedLocationPage, ApiError> {
    let collection: Collection<SavedLocation> = parse(body)?;
    let has_next = collection.has_next();
    let reported_total = collection.total_items;
    let Members { decoded, rejected } = collection.into_members();
    let total_items = reported_total.unwrap_or((decoded.len() + rejected.len()) as u64);
    Ok(SavedLocationPage {
        items: decoded,
        rejected,
        total_items,
        has_next,
    })
}

/// Keeps the user's entries. References are compared by trailing id.
pub fn saved_for_user(all: Vec<SavedLocation>, user: &Iri) -> Vec<SavedLocation> {
    let total = all.len();
    let mine: Vec<_> = all
        .into_iter()
        .filter(|saved| saved.user.id() == user.id())
        .collect();
    debug!(total, kept = mine.len(), "filtered saved locations by user");
    mine
}
