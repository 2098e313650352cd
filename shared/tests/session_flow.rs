mod common;

use common::{FakeBackend, Harness};
use shared::capabilities::{KeyValueStore, MemoryStore};
use shared::forms::LoginForm;
use shared::session::{self, StoredSession, LEGACY_TOKEN_KEY, LEGACY_USER_KEY, RESTORE_FAILED};
use shared::Event;
use std::sync::Arc;

fn legacy_user(backend: &FakeBackend, username: &str) -> Vec<u8> {
    let iri = backend.add_user(username);
    serde_json::to_vec(&serde_json::json!({
        "@id": iri,
        "username": username,
        "email": format!("{username}@example.com")
    }))
    .unwrap()
}

fn session_entry(store: &dyn KeyValueStore) -> Option<StoredSession> {
    let key = session::session_key().unwrap();
    StoredSession::read(&key, store.get(&key.raw()).unwrap()).unwrap()
}

#[test]
fn legacy_pair_is_folded_into_one_record() {
    let backend = Arc::new(FakeBackend::new(10));
    let store = Arc::new(MemoryStore::new());
    store.set(LEGACY_USER_KEY, legacy_user(&backend, "ana")).unwrap();
    store.set(LEGACY_TOKEN_KEY, b"old-token".to_vec()).unwrap();

    let mut h = Harness::with_store(backend, store.clone());
    h.start();

    let auth = h.view().auth;
    assert!(auth.is_authenticated);
    assert_eq!(auth.user.unwrap().username, "ana");
    assert_eq!(session_entry(store.as_ref()).unwrap().user().username, "ana");
    assert_eq!(store.get(LEGACY_USER_KEY).unwrap(), None);
    assert_eq!(store.get(LEGACY_TOKEN_KEY).unwrap(), None);
    assert_eq!(store.len(), 1);
}

#[test]
fn half_written_legacy_pair_is_dropped() {
    let backend = Arc::new(FakeBackend::new(10));
    let store = Arc::new(MemoryStore::new());
    store.set(LEGACY_USER_KEY, legacy_user(&backend, "ana")).unwrap();

    let mut h = Harness::with_store(backend, store.clone());
    h.start();

    let auth = h.view().auth;
    assert!(!auth.is_authenticated);
    assert!(!auth.is_loading);
    assert!(auth.error.is_none());
    assert!(store.is_empty());
}

#[test]
fn empty_store_settles_signed_out() {
    let backend = Arc::new(FakeBackend::new(10));
    let mut h = Harness::new(backend.clone());

    h.start();

    let auth = h.view().auth;
    assert!(!auth.is_authenticated);
    assert!(!auth.is_loading);
    assert_eq!(backend.request_count(), 0);
}

#[test]
fn corrupt_record_is_reported() {
    let backend = Arc::new(FakeBackend::new(10));
    let store = Arc::new(MemoryStore::new());
    let key = session::session_key().unwrap();
    store.set(&key.raw(), b"{not json".to_vec()).unwrap();

    let mut h = Harness::with_store(backend, store);
    h.start();

    let auth = h.view().auth;
    assert!(!auth.is_authenticated);
    assert_eq!(auth.error.as_deref(), Some(RESTORE_FAILED));
}

#[test]
fn logout_clears_the_record_and_the_favorites() {
    let backend = Arc::new(FakeBackend::new(10));
    let user = backend.add_user("ana");
    let place = backend.add_location("Falls");
    backend.add_saved(&place, &user);
    let store = Arc::new(MemoryStore::new());
    let mut h = Harness::with_store(backend, store.clone());

    h.send(Event::Login(LoginForm::new("ana", "secret1")));
    assert_eq!(h.view().saved.len(), 1);
    assert_eq!(h.view().markers.len(), 1);

    h.send(Event::Logout);

    let view = h.view();
    assert!(!view.auth.is_authenticated);
    assert!(view.saved.is_empty());
    assert!(view.markers.is_empty());
    assert!(store.is_empty());
}

#[cfg(not(target_arch = "wasm32"))]
#[test]
fn sqlite_backed_session_survives_a_restart() {
    use shared::capabilities::SqliteStore;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.db");
    let backend = Arc::new(FakeBackend::new(10));
    backend.add_user("ana");

    {
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let mut h = Harness::with_store(backend.clone(), store);
        h.send(Event::Login(LoginForm::new("ana", "secret1")));
        assert!(h.view().auth.is_authenticated);
    }

    let store = Arc::new(SqliteStore::open(&path).unwrap());
    let mut h = Harness::with_store(backend, store.clone());
    h.start();

    assert!(h.view().auth.is_authenticated);
    assert_eq!(session_entry(store.as_ref()).unwrap().user().username, "ana");
}
