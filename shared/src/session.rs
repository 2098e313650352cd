//! Authenticated user, persisted as one record.
//!
//! Earlier app versions kept the user and the token under two separate
//! un-prefixed keys. On restore a complete legacy pair is folded into the
//! single record and a half-written one is dropped.
//!
//! Nothing here touches storage: `update` reads and writes the keys
//! through the key-value capability and reports back.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::capabilities::{decode_record, encode_record, KeyNamespace, KvError, KvKey};
use crate::error::ValidationError;
use crate::model::{Iri, User};

pub const SESSION_KEY: &str = "current";
pub const LEGACY_USER_KEY: &str = "@auth_user";
pub const LEGACY_TOKEN_KEY: &str = "@auth_token";

pub const INVALID_CREDENTIALS: &str = "Invalid username or password";
pub const RESTORE_FAILED: &str = "Could not load your saved session";
pub const LOGOUT_FAILED: &str = "Could not sign out";

pub fn session_key() -> Result<KvKey, KvError> {
    KvKey::new(KeyNamespace::Session, SESSION_KEY)
}

pub fn legacy_keys() -> Result<[KvKey; 2], KvError> {
    Ok([
        KvKey::new(KeyNamespace::Legacy, LEGACY_USER_KEY)?,
        KvKey::new(KeyNamespace::Legacy, LEGACY_TOKEN_KEY)?,
    ])
}

/// The persisted record.
#[derive(Clone, Serialize, Deserialize)]
pub struct StoredSession {
    user: User,
    token: String,
}

impl StoredSession {
    /// A fresh session with a locally minted token; the backend issues none.
    pub fn mint(user: User) -> Self {
        Self {
            user,
            token: format!("local-{}", Uuid::new_v4()),
        }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn encode(&self, key: &KvKey) -> Result<Vec<u8>, KvError> {
        encode_record(key, self)
    }

    pub fn decode(key: &KvKey, bytes: &[u8]) -> Result<Self, KvError> {
        decode_record(key, bytes)
    }

    /// Reads the value found under the session key, if any.
    pub fn read(key: &KvKey, value: Option<Vec<u8>>) -> Result<Option<Self>, KvError> {
        value.map(|bytes| Self::decode(key, &bytes)).transpose()
    }
}

impl fmt::Debug for StoredSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredSession")
            .field("user", &self.user.username)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// What to do with the two legacy entries.
#[derive(Debug)]
pub enum LegacyMigration {
    /// Both entries were readable: write them as one record.
    Restore(StoredSession),
    /// Something was there but not a usable pair.
    Discard,
    Nothing,
}

impl LegacyMigration {
    pub fn from_pair(user: Option<Vec<u8>>, token: Option<Vec<u8>>) -> Self {
        match (user, token) {
            (None, None) => LegacyMigration::Nothing,
            (Some(user), Some(token)) => {
                let user = serde_json::from_slice::<User>(&user);
                let token = String::from_utf8(token);
                match (user, token) {
                    (Ok(user), Ok(token)) if !token.is_empty() => {
                        LegacyMigration::Restore(StoredSession { user, token })
                    }
                    _ => {
                        warn!("legacy session unreadable, discarding");
                        LegacyMigration::Discard
                    }
                }
            }
            _ => {
                warn!("half-written legacy session, discarding");
                LegacyMigration::Discard
            }
        }
    }
}

/// The backend has no login endpoint: the username is looked up in the
/// user collection and the password is not checked remotely.
pub fn find_user(users: Vec<User>, username: &str) -> Result<User, ValidationError> {
    let username = username.trim();
    users
        .into_iter()
        .find(|u| u.username == username)
        .ok_or_else(|| ValidationError::single("username", INVALID_CREDENTIALS))
}

#[derive(Debug, Default)]
pub struct AuthState {
    user: Option<User>,
    token: Option<SecretString>,
    is_loading: bool,
    error: Option<String>,
    /// Minted but not yet written.
    staged: Option<StoredSession>,
}

/// What the shell renders. Never carries the token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthView {
    pub user: Option<User>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() && self.token.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn token(&self) -> Option<&SecretString> {
        self.token.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// IRI of the signed-in user, used when linking favorites.
    pub fn user_reference(&self) -> Option<Iri> {
        if self.is_authenticated() {
            self.user.as_ref().map(|u| u.iri.clone())
        } else {
            None
        }
    }

    pub fn view(&self) -> AuthView {
        AuthView {
            user: self.user.clone(),
            is_authenticated: self.is_authenticated(),
            is_loading: self.is_loading,
            error: self.error.clone(),
        }
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn begin(&mut self) {
        self.is_loading = true;
        self.error = None;
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(error = %message, "authentication failed");
        self.is_loading = false;
        self.staged = None;
        self.error = Some(message);
    }

    /// Startup found nothing to restore.
    pub fn settle_signed_out(&mut self) {
        self.is_loading = false;
    }

    /// Applies a record read back from storage.
    pub fn restore(&mut self, stored: StoredSession) {
        info!(user = %stored.user.username, "session restored");
        self.authenticate(stored);
    }

    /// Becomes authenticated with a migrated legacy record and returns its
    /// encoding for the single-record layout.
    pub fn adopt(&mut self, key: &KvKey, stored: StoredSession) -> Result<Vec<u8>, KvError> {
        let bytes = stored.encode(key)?;
        info!(user = %stored.user.username, "legacy session migrated");
        self.authenticate(stored);
        Ok(bytes)
    }

    /// Mints a session for `user` and returns the record to write. The
    /// state switches only once [`AuthState::commit`] confirms the write.
    pub fn stage(&mut self, key: &KvKey, user: User) -> Result<Vec<u8>, KvError> {
        let stored = StoredSession::mint(user);
        let bytes = stored.encode(key)?;
        self.staged = Some(stored);
        Ok(bytes)
    }

    pub fn commit(&mut self) -> Option<&User> {
        let stored = self.staged.take()?;
        info!(user = %stored.user.username, "session stored");
        self.authenticate(stored);
        self.user.as_ref()
    }

    /// The stored record was cleared.
    pub fn sign_out(&mut self) {
        *self = AuthState::default();
        info!("signed out");
    }

    fn authenticate(&mut self, stored: StoredSession) {
        self.user = Some(stored.user);
        self.token = Some(SecretString::new(stored.token));
        self.is_loading = false;
        self.error = None;
    }
}
