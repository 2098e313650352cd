//! Keys and record encoding for the `crux_kv` capability, plus the stores a
//! Rust shell uses to resolve its operations.

use crux_kv::error::KeyValueError;
use crux_kv::value::Value;
use crux_kv::{KeyValueOperation, KeyValueResponse, KeyValueResult};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

pub const MAX_KEY_LENGTH: usize = 512;
pub const MAX_VALUE_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KvKey {
    namespace: KeyNamespace,
    key: String,
}

impl KvKey {
    pub fn new(namespace: KeyNamespace, key: impl Into<String>) -> Result<Self, KvError> {
        let key = key.into();
        Self::validate_key(&key)?;
        Ok(Self { namespace, key })
    }

    /// Storage-level key. Legacy keys are stored without a namespace prefix.
    pub fn raw(&self) -> String {
        match self.namespace {
            KeyNamespace::Legacy => self.key.clone(),
            KeyNamespace::Session => format!("{}:{}", self.namespace.prefix(), self.key),
        }
    }

    pub fn namespace(&self) -> &KeyNamespace {
        &self.namespace
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn validate_key(key: &str) -> Result<(), KvError> {
        if key.trim().is_empty() {
            return Err(KvError::InvalidKey {
                key: key.to_string(),
                reason: "key cannot be empty".to_string(),
            });
        }

        if key.len() > MAX_KEY_LENGTH {
            return Err(KvError::InvalidKey {
                key: key.chars().take(50).collect::<String>() + "...",
                reason: format!("key exceeds maximum length of {} bytes", MAX_KEY_LENGTH),
            });
        }

        if key.contains("..") || key.starts_with('/') || key.starts_with('\\') {
            return Err(KvError::InvalidKey {
                key: key.to_string(),
                reason: "key cannot contain path traversal sequences".to_string(),
            });
        }

        if key.chars().any(|c| c.is_control()) {
            return Err(KvError::InvalidKey {
                key: key.escape_default().to_string(),
                reason: "key contains invalid control characters".to_string(),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyNamespace {
    Session,
    /// Un-prefixed keys written by earlier app versions.
    Legacy,
}

impl KeyNamespace {
    pub fn prefix(&self) -> &str {
        match self {
            KeyNamespace::Session => "session",
            KeyNamespace::Legacy => "",
        }
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum KvError {
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("value too large: {size} bytes exceeds maximum of {max} bytes")]
    ValueTooLarge { size: usize, max: usize },

    #[error("storage error: {message} (code: {code:?})")]
    Storage {
        code: StorageErrorCode,
        message: String,
    },

    #[error("serialization error: {message}")]
    Serialization { message: String, key: Option<String> },
}

impl KvError {
    pub fn storage(code: StorageErrorCode, message: impl Into<String>) -> Self {
        Self::Storage {
            code,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, KvError::Storage { code, .. } if code.is_retryable())
    }
}

impl From<KeyValueError> for KvError {
    fn from(e: KeyValueError) -> Self {
        let code = match e {
            KeyValueError::Timeout => StorageErrorCode::Busy,
            _ => StorageErrorCode::IoError,
        };
        KvError::storage(code, e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageErrorCode {
    Unknown,
    ConnectionFailed,
    Corrupted,
    Busy,
    Locked,
    IoError,
}

impl StorageErrorCode {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageErrorCode::Busy | StorageErrorCode::Locked)
    }
}

/// JSON-encodes a record stored under `key`.
pub fn encode_record<T: Serialize>(key: &KvKey, value: &T) -> Result<Vec<u8>, KvError> {
    let data = serde_json::to_vec(value).map_err(|e| KvError::Serialization {
        message: e.to_string(),
        key: Some(key.raw()),
    })?;
    check_value_size(&data)?;
    Ok(data)
}

pub fn decode_record<T: DeserializeOwned>(key: &KvKey, bytes: &[u8]) -> Result<T, KvError> {
    serde_json::from_slice(bytes).map_err(|e| KvError::Serialization {
        message: e.to_string(),
        key: Some(key.raw()),
    })
}

fn check_value_size(value: &[u8]) -> Result<(), KvError> {
    if value.len() > MAX_VALUE_SIZE {
        return Err(KvError::ValueTooLarge {
            size: value.len(),
            max: MAX_VALUE_SIZE,
        });
    }
    Ok(())
}

/// Shell-side storage that resolves the core's `KeyValue` effects.
///
/// Calls block on the backing store; shells run them on their storage
/// thread and resolve the effect with the result.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;
    /// Returns the value it replaced.
    fn set(&self, key: &str, value: Vec<u8>) -> Result<Option<Vec<u8>>, KvError>;
    /// Returns the value it removed.
    fn delete(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;

    fn resolve(&self, operation: &KeyValueOperation) -> KeyValueResult {
        let outcome = match operation {
            KeyValueOperation::Get { key } => self.get(key).map(|value| KeyValueResponse::Get {
                value: to_value(value),
            }),
            KeyValueOperation::Set { key, value } => {
                self.set(key, value.clone())
                    .map(|previous| KeyValueResponse::Set {
                        previous: to_value(previous),
                    })
            }
            KeyValueOperation::Delete { key } => {
                self.delete(key).map(|previous| KeyValueResponse::Delete {
                    previous: to_value(previous),
                })
            }
            KeyValueOperation::Exists { key } => self.get(key).map(|value| {
                KeyValueResponse::Exists {
                    is_present: value.is_some(),
                }
            }),
            _ => {
                return KeyValueResult::Err {
                    error: KeyValueError::Other {
                        message: "operation not supported".to_string(),
                    },
                }
            }
        };

        match outcome {
            Ok(response) => KeyValueResult::Ok { response },
            Err(e) => KeyValueResult::Err {
                error: KeyValueError::Io {
                    message: e.to_string(),
                },
            },
        }
    }
}

fn to_value(bytes: Option<Vec<u8>>) -> Value {
    bytes.map_or(Value::None, Value::Bytes)
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: Vec<u8>) -> Result<Option<Vec<u8>>, KvError> {
        check_value_size(&value)?;
        Ok(self.entries().insert(key.to_string(), value))
    }

    fn delete(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.entries().remove(key))
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use self::sqlite::SqliteStore;

#[cfg(not(target_arch = "wasm32"))]
mod sqlite {
    use super::{check_value_size, KeyValueStore, KvError, StorageErrorCode};
    use crate::model::UnixTimeMs;
    use rusqlite::{params, Connection, OptionalExtension};
    use std::path::Path;
    use std::sync::Mutex;

    /// SQLite-backed store; one row per key.
    pub struct SqliteStore {
        conn: Mutex<Connection>,
    }

    impl SqliteStore {
        pub fn open(path: impl AsRef<Path>) -> Result<Self, KvError> {
            let conn = Connection::open(path)
                .map_err(|e| KvError::storage(StorageErrorCode::ConnectionFailed, e.to_string()))?;
            Self::init(conn)
        }

        pub fn open_in_memory() -> Result<Self, KvError> {
            let conn = Connection::open_in_memory()
                .map_err(|e| KvError::storage(StorageErrorCode::ConnectionFailed, e.to_string()))?;
            Self::init(conn)
        }

        fn init(conn: Connection) -> Result<Self, KvError> {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS kv_entries (
                    key TEXT PRIMARY KEY,
                    value BLOB NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                "#,
            )
            .map_err(map_sqlite_error)?;

            Ok(Self {
                conn: Mutex::new(conn),
            })
        }

        fn with_conn<T>(
            &self,
            f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
        ) -> Result<T, KvError> {
            let conn = self
                .conn
                .lock()
                .map_err(|_| KvError::storage(StorageErrorCode::Locked, "connection lock poisoned"))?;
            f(&conn).map_err(map_sqlite_error)
        }
    }

    fn map_sqlite_error(e: rusqlite::Error) -> KvError {
        let code = match e.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseBusy) => StorageErrorCode::Busy,
            Some(rusqlite::ErrorCode::DatabaseLocked) => StorageErrorCode::Locked,
            Some(rusqlite::ErrorCode::DatabaseCorrupt) => StorageErrorCode::Corrupted,
            Some(rusqlite::ErrorCode::SystemIoFailure) => StorageErrorCode::IoError,
            _ => StorageErrorCode::Unknown,
        };
        KvError::storage(code, e.to_string())
    }

    fn select(conn: &Connection, key: &str) -> rusqlite::Result<Option<Vec<u8>>> {
        conn.query_row(
            "SELECT value FROM kv_entries WHERE key = ?1",
            params![key],
            |row| row.get::<_, Vec<u8>>(0),
        )
        .optional()
    }

    impl KeyValueStore for SqliteStore {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
            self.with_conn(|conn| select(conn, key))
        }

        fn set(&self, key: &str, value: Vec<u8>) -> Result<Option<Vec<u8>>, KvError> {
            check_value_size(&value)?;
            let now = i64::try_from(UnixTimeMs::now().0).unwrap_or(i64::MAX);
            self.with_conn(|conn| {
                let previous = select(conn, key)?;
                conn.execute(
                    r#"
                    INSERT INTO kv_entries (key, value, updated_at)
                    VALUES (?1, ?2, ?3)
                    ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        updated_at = excluded.updated_at
                    "#,
                    params![key, value, now],
                )?;
                Ok(previous)
            })
        }

        fn delete(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
            self.with_conn(|conn| {
                let previous = select(conn, key)?;
                conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])?;
                Ok(previous)
            })
        }
    }
}
