//! Persisted session state
//!
//! The console keeps two keys between runs: `token` (opaque credential sent
//! as the `Authorization` header) and `user_info` (JSON-encoded
//! [`UserIdentity`]). [`SessionStore`] abstracts the key-value storage;
//! [`InMemorySessionStore`] backs tests and embedded use, [`FileSessionStore`]
//! persists to a JSON file for the CLI.

use crate::error::{AccessError, Result};
use crate::types::UserIdentity;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Session key holding the auth token
pub const TOKEN_KEY: &str = "token";

/// Session key holding the JSON-encoded user identity
pub const USER_INFO_KEY: &str = "user_info";

/// Key-value session storage
pub trait SessionStore: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value; removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<()>;
}

/// Read the stored token, treating an empty string as absent
pub fn read_token(store: &dyn SessionStore) -> Option<String> {
    store.get(TOKEN_KEY).filter(|token| !token.is_empty())
}

/// Read the stored identity
///
/// Missing, unparsable, or ID-less identities all yield `None`.
pub fn read_identity(store: &dyn SessionStore) -> Option<UserIdentity> {
    let raw = store.get(USER_INFO_KEY)?;
    match serde_json::from_str::<UserIdentity>(&raw) {
        Ok(identity) if identity.has_user_id() => Some(identity),
        Ok(_) => None,
        Err(e) => {
            warn!("Ignoring malformed {} in session: {}", USER_INFO_KEY, e);
            None
        }
    }
}

/// Persist a token and identity
pub fn write_session(store: &dyn SessionStore, token: &str, identity: &UserIdentity) -> Result<()> {
    let encoded = serde_json::to_string(identity)?;
    store.set(TOKEN_KEY, token)?;
    store.set(USER_INFO_KEY, &encoded)?;
    Ok(())
}

/// Remove token and identity
pub fn clear_session(store: &dyn SessionStore) -> Result<()> {
    store.remove(TOKEN_KEY)?;
    store.remove(USER_INFO_KEY)?;
    debug!("Session cleared");
    Ok(())
}

/// In-memory session store
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    entries: DashMap<String, String>,
}

impl InMemorySessionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already holding a token and identity
    pub fn with_session(token: &str, identity: &UserIdentity) -> Result<Self> {
        let store = Self::new();
        write_session(&store, token, identity)?;
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.clone())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Session store persisted as a flat JSON object on disk
pub struct FileSessionStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileSessionStore {
    /// Open the store at `path`, loading existing entries if the file exists
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            if contents.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&contents).map_err(|e| {
                    AccessError::Storage(format!("{}: {}", path.display(), e))
                })?
            }
        } else {
            BTreeMap::new()
        };

        debug!("Opened session file {:?} ({} entries)", path, entries.len());

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let encoded = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, encoded)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write();
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write();
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }
}
