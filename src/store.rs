//! Durable session store: the small key-value medium that survives restarts.
//!
//! DESIGN
//! ======
//! The store is deliberately dumb: string keys, string values, synchronous.
//! Reads never fail; writes report I/O errors so callers can refuse to mark
//! a session authenticated that never reached disk. There is no transaction
//! across keys, so a crash between two writes can leave `token` without
//! `user` (or the reverse). `StoredSession::load` treats every missing or
//! unparseable value as absent instead of failing.
//!
//! `FileStore` re-reads the file on every access so that several processes
//! sharing one session file observe each other's logins and logouts. Each
//! write replaces the whole file; between processes the last writer wins.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::types::{Provider, User};

pub const TOKEN_KEY: &str = "token";
pub const USER_KEY: &str = "user";
pub const PROVIDER_KEY: &str = "auth_provider";
/// Set right before sending the user to an OAuth provider. Display only.
pub const INTENDED_PROVIDER_KEY: &str = "intended_provider";

// =============================================================================
// TRAIT
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session encode failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("session write failed: {0}")]
    Io(#[from] io::Error),
}

/// Persistent key-value storage for session data. Shared by the gateway
/// (reads the token per request) and the auth machine (writes on transitions).
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// # Errors
    ///
    /// Returns the I/O error if the value could not be made durable.
    fn set(&self, key: &str, value: &str) -> io::Result<()>;

    /// # Errors
    ///
    /// Returns the I/O error if the removal could not be made durable.
    fn remove(&self, key: &str) -> io::Result<()>;
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// Process-local store. Contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

// =============================================================================
// FILE STORE
// =============================================================================

/// Store backed by a single JSON object on disk.
///
/// Writes go to a uniquely named sibling temp file that is renamed into
/// place, so readers never observe a half-written file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> BTreeMap<String, String> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "session file unreadable; treating as empty");
                return BTreeMap::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), error = %e, "session file corrupt; treating as empty");
            BTreeMap::new()
        })
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> io::Result<()> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        let json = serde_json::to_vec_pretty(entries).map_err(io::Error::other)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(&json)?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    fn modify(&self, key: &str, f: impl FnOnce(&mut BTreeMap<String, String>)) -> io::Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_entries();
        f(&mut entries);
        self.write_entries(&entries).inspect_err(|e| {
            tracing::warn!(path = %self.path.display(), key, error = %e, "session file write failed");
        })
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.read_entries().remove(key)
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        self.modify(key, |entries| {
            entries.insert(key.to_owned(), value.to_owned());
        })
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        self.modify(key, |entries| {
            entries.remove(key);
        })
    }
}

// =============================================================================
// SESSION HELPERS
// =============================================================================

/// Session fields as last persisted. Each field is independently optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredSession {
    pub token: Option<String>,
    pub user: Option<User>,
    pub provider: Option<Provider>,
}

impl StoredSession {
    #[must_use]
    pub fn load(store: &dyn SessionStore) -> Self {
        let token = store.get(TOKEN_KEY).filter(|t| !t.trim().is_empty());
        let user = store.get(USER_KEY).and_then(|raw| match serde_json::from_str::<User>(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::warn!(error = %e, "stored user record unparseable; ignoring");
                None
            }
        });
        let provider = store
            .get(PROVIDER_KEY)
            .filter(|p| !p.trim().is_empty())
            .map(|p| Provider::from(p.as_str()));
        Self { token, user, provider }
    }
}

/// Write token, user and provider tag. The user is serialized before any
/// key is touched, so an encode failure leaves the store as it was. A write
/// failure part way through may leave some keys written; callers clear the
/// session in that case.
///
/// # Errors
///
/// Returns [`StoreError::Encode`] if `user` cannot be encoded, or
/// [`StoreError::Io`] if a write fails.
pub fn persist_session(
    store: &dyn SessionStore,
    token: &str,
    user: &User,
    provider: Provider,
) -> Result<(), StoreError> {
    let user_json = serde_json::to_string(user)?;
    store.set(TOKEN_KEY, token)?;
    store.set(USER_KEY, &user_json)?;
    store.set(PROVIDER_KEY, provider.as_str())?;
    Ok(())
}

/// Drop the identity keys. `intended_provider` is left for the UI.
///
/// Every key is attempted even if an earlier removal fails.
///
/// # Errors
///
/// Returns the first I/O error encountered.
pub fn clear_session(store: &dyn SessionStore) -> io::Result<()> {
    let results = [store.remove(TOKEN_KEY), store.remove(USER_KEY), store.remove(PROVIDER_KEY)];
    results.into_iter().collect()
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
