//! Incremental loading of the saved-location list.
//!
//! The list only tracks state; `update` issues the requests it asks for.
//! At most one page load is in flight at a time. The page number only
//! advances after a successful response, and a failed load never touches
//! the items already shown.
//!
//! A page arrives as saved-location records whose targets still have to
//! be fetched. Every target lookup is issued at once and carries the
//! page's ticket plus the record's index, so answers can land in any
//! order and the page is applied in server order once the last one is in.
//! Answers tagged with an older ticket are dropped.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::SavedLocationPage;
use crate::error::ApiError;
use crate::model::{Iri, Location, SavedLocation, SavedLocationId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSavedLocation {
    pub saved: SavedLocation,
    pub location: Location,
}

/// A saved location left out of a page, either because the record itself
/// could not be decoded or because its location could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedItem {
    /// Missing when the record was too broken to carry an id.
    pub saved_id: Option<SavedLocationId>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialPage {
    pub items: Vec<ResolvedSavedLocation>,
    pub skipped: Vec<SkippedItem>,
}

impl PartialPage {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationState {
    /// Last page successfully loaded; 1 before the first load.
    pub page: u32,
    pub has_more: bool,
    pub total_items: u64,
    pub in_flight: bool,
}

impl Default for PaginationState {
    fn default() -> Self {
        Self {
            page: 1,
            has_more: true,
            total_items: 0,
            in_flight: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadPhase {
    Idle,
    Loading,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    InFlight,
    Exhausted,
    NothingToRetry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LoadOutcome {
    Loaded { page: u32, partial: PartialPage },
    Skipped(SkipReason),
}

impl LoadOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadOutcome::Loaded { .. })
    }
}

/// A page load the caller should issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub reset: bool,
    pub ticket: u64,
}

/// One location fetch needed to finish a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationLookup {
    pub ticket: u64,
    pub index: usize,
    pub location: Iri,
}

/// What to do after a page arrived.
#[derive(Debug, Clone, PartialEq)]
pub enum PageStep {
    /// Fetch these, then report each through [`SavedLocationList::item_resolved`].
    Resolve(Vec<LocationLookup>),
    /// Nothing left to fetch; the page is applied.
    Done(LoadOutcome),
    /// The answer belongs to a load that is no longer current.
    Stale,
}

#[derive(Debug)]
struct PendingPage {
    request: PageRequest,
    total_items: u64,
    has_next: bool,
    saved: Vec<SavedLocation>,
    resolved: Vec<Option<Result<Location, String>>>,
    skipped: Vec<SkippedItem>,
}

impl PendingPage {
    fn is_complete(&self) -> bool {
        self.resolved.iter().all(Option::is_some)
    }

    fn into_partial(self) -> PartialPage {
        let mut partial = PartialPage {
            items: Vec::with_capacity(self.saved.len()),
            skipped: self.skipped,
        };
        for (saved, result) in self.saved.into_iter().zip(self.resolved) {
            match result {
                Some(Ok(location)) => partial.items.push(ResolvedSavedLocation { saved, location }),
                Some(Err(reason)) => partial.skipped.push(SkippedItem {
                    saved_id: Some(saved.id),
                    reason,
                }),
                None => {}
            }
        }
        partial
    }
}

#[derive(Debug, Default)]
pub struct SavedLocationList {
    items: Vec<ResolvedSavedLocation>,
    pagination: PaginationState,
    loaded: bool,
    error: Option<ApiError>,
    last_failed: Option<(u32, bool)>,
    tickets: u64,
    current: Option<PageRequest>,
    pending: Option<PendingPage>,
}

impl SavedLocationList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the single load slot for `page`, replacing the list on
    /// success when `reset` and appending otherwise.
    pub fn begin_load(&mut self, page: u32, reset: bool) -> Result<PageRequest, SkipReason> {
        let page = page.max(1);
        if self.pagination.in_flight {
            debug!(page, "load already in flight");
            return Err(SkipReason::InFlight);
        }
        if page > 1 && !self.pagination.has_more {
            debug!(page, "no more pages");
            return Err(SkipReason::Exhausted);
        }

        self.tickets += 1;
        let request = PageRequest {
            page,
            reset,
            ticket: self.tickets,
        };
        self.pagination.in_flight = true;
        self.current = Some(request);
        self.pending = None;
        Ok(request)
    }

    /// Pull-to-refresh: page 1, replacing the list on success only.
    pub fn refresh(&mut self) -> Result<PageRequest, SkipReason> {
        self.begin_load(1, true)
    }

    /// Infinite scroll. Loads the first page when nothing is shown yet.
    pub fn load_more(&mut self) -> Result<PageRequest, SkipReason> {
        if self.loaded {
            self.begin_load(self.pagination.page.saturating_add(1), false)
        } else {
            self.begin_load(1, true)
        }
    }

    /// Re-issues the last failed load with the same arguments.
    pub fn retry(&mut self) -> Result<PageRequest, SkipReason> {
        match self.last_failed {
            Some((page, reset)) => self.begin_load(page, reset),
            None => Err(SkipReason::NothingToRetry),
        }
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.current.is_some_and(|c| c.ticket == ticket)
    }

    pub fn page_failed(&mut self, ticket: u64, error: ApiError) {
        let Some(request) = self.current.filter(|c| c.ticket == ticket) else {
            debug!(ticket, "stale page failure ignored");
            return;
        };
        warn!(page = request.page, reset = request.reset, error = %error, "saved locations load failed");
        self.current = None;
        self.pending = None;
        self.pagination.in_flight = false;
        self.error = Some(error);
        self.last_failed = Some((request.page, request.reset));
    }

    pub fn page_received(&mut self, ticket: u64, page: SavedLocationPage) -> PageStep {
        let Some(request) = self.current.filter(|c| c.ticket == ticket) else {
            debug!(ticket, "stale page ignored");
            return PageStep::Stale;
        };

        let skipped = page
            .rejected
            .into_iter()
            .map(|member| {
                warn!(iri = ?member.iri, reason = %member.reason, "saved location record unreadable, skipping");
                SkippedItem {
                    saved_id: member.iri.map(|iri| SavedLocationId::from_reference(iri.as_str())),
                    reason: member.reason,
                }
            })
            .collect();

        let lookups: Vec<_> = page
            .items
            .iter()
            .enumerate()
            .map(|(index, saved)| LocationLookup {
                ticket,
                index,
                location: saved.location.clone(),
            })
            .collect();

        let pending = PendingPage {
            request,
            total_items: page.total_items,
            has_next: page.has_next,
            resolved: vec![None; page.items.len()],
            saved: page.items,
            skipped,
        };

        if lookups.is_empty() {
            return PageStep::Done(self.apply(pending));
        }
        self.pending = Some(pending);
        PageStep::Resolve(lookups)
    }

    /// Records one target lookup. Returns the outcome once the page is
    /// complete and applied.
    pub fn item_resolved(
        &mut self,
        ticket: u64,
        index: usize,
        result: Result<Location, ApiError>,
    ) -> Option<LoadOutcome> {
        if !self.is_current(ticket) {
            debug!(ticket, index, "stale lookup ignored");
            return None;
        }
        let pending = self.pending.as_mut()?;
        let saved = pending.saved.get(index)?;
        let slot = pending.resolved.get_mut(index)?;

        *slot = Some(result.map_err(|e| {
            warn!(
                saved_id = %saved.id,
                location = %saved.location,
                error = %e,
                "could not resolve saved location, skipping"
            );
            e.user_message()
        }));

        if !pending.is_complete() {
            return None;
        }
        let pending = self.pending.take()?;
        Some(self.apply(pending))
    }

    fn apply(&mut self, pending: PendingPage) -> LoadOutcome {
        let PageRequest { page, reset, .. } = pending.request;
        let (total_items, has_next) = (pending.total_items, pending.has_next);
        let partial = pending.into_partial();

        if reset {
            self.items = partial.items.clone();
        } else {
            for item in &partial.items {
                if self.items.iter().any(|i| i.saved.id == item.saved.id) {
                    debug!(id = %item.saved.id, "duplicate across pages dropped");
                    continue;
                }
                self.items.push(item.clone());
            }
        }

        self.current = None;
        self.pagination = PaginationState {
            page,
            has_more: has_next,
            total_items,
            in_flight: false,
        };
        self.loaded = true;
        self.error = None;
        self.last_failed = None;
        info!(
            page,
            shown = self.items.len(),
            total_items,
            has_next,
            skipped = partial.skipped_count(),
            "saved locations loaded"
        );
        LoadOutcome::Loaded { page, partial }
    }

    /// A successful delete: drops the entry and decrements the total.
    pub fn remove(&mut self, id: &SavedLocationId) -> bool {
        let before = self.items.len();
        self.items.retain(|i| &i.saved.id != id);
        let removed = self.items.len() != before;
        self.pagination.total_items = self.pagination.total_items.saturating_sub(1);
        self.error = None;
        info!(removed, total_items = self.pagination.total_items, "favorite removed");
        removed
    }

    /// A failed delete leaves the list as it was.
    pub fn delete_failed(&mut self, error: ApiError) {
        warn!(error = %error, "favorite delete failed");
        self.error = Some(error);
    }

    /// Forgets everything, e.g. on sign-out. Answers to loads started
    /// before this are ignored.
    pub fn reset(&mut self) {
        let tickets = self.tickets;
        *self = Self {
            tickets,
            ..Self::default()
        };
    }

    pub fn items(&self) -> &[ResolvedSavedLocation] {
        &self.items
    }

    pub fn locations(&self) -> Vec<Location> {
        self.items.iter().map(|i| i.location.clone()).collect()
    }

    pub fn state(&self) -> PaginationState {
        self.pagination
    }

    pub fn error(&self) -> Option<&ApiError> {
        self.error.as_ref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn phase(&self) -> LoadPhase {
        if self.pagination.in_flight {
            LoadPhase::Loading
        } else if self.error.is_some() {
            LoadPhase::Failed
        } else {
            LoadPhase::Idle
        }
    }
}
