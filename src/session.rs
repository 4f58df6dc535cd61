//! Session credential and process-wide session flags.
//!
//! The session token, the cached user profile and the logout marker are kept
//! as plain string key/value pairs in a [`SessionStore`]. [`SessionState`]
//! wraps a store together with the in-memory "redirecting" guard and is
//! injected into the [`ApiClient`](crate::ApiClient); clones share the same
//! store and the same guard.
//!
//! # Example
//!
//! ```
//! use marketplace_client::{MemoryStore, SessionState};
//!
//! let session = SessionState::new(MemoryStore::default());
//! session.set_token("abc123");
//! assert_eq!(session.token().as_deref(), Some("abc123"));
//!
//! session.begin_logout();
//! assert!(session.is_logging_out());
//! session.end_logout();
//! ```

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Storage key of the session credential.
pub const TOKEN_KEY: &str = "token";
/// Storage key of the cached user profile (JSON).
pub const USER_KEY: &str = "user";
/// Storage key of the logout marker. The value `"true"` means a logout is in
/// progress.
pub const LOGGING_OUT_KEY: &str = "isLoggingOut";

/// Synchronous string key/value storage that outlives a single request.
pub trait SessionStore: Send + Sync + fmt::Debug {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// Process-local store. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// Store persisted as a single JSON object file.
///
/// The whole map is rewritten on every mutation. Write failures are logged
/// and the in-memory copy stays authoritative for the rest of the process.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Opens the store at `path`, loading existing entries if the file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or does not
    /// contain a JSON object of strings.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => HashMap::new(),
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e),
        };
        debug!("Opened session store at {} ({} entries)", path.display(), entries.len());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &HashMap<String, String>) {
        if let Err(e) = self.write_atomically(entries) {
            warn!(
                "Failed to persist session store to {}: {}",
                self.path.display(),
                e
            );
        }
    }

    /// Writes a sibling temp file and renames it over the store, so the
    /// file on disk is always a complete snapshot.
    fn write_atomically(&self, entries: &HashMap<String, String>) -> io::Result<()> {
        let bytes = serde_json::to_vec_pretty(entries).map_err(io::Error::other)?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(&bytes)?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries);
    }

    fn remove(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.remove(key).is_some() {
            self.persist(&entries);
        }
    }
}

/// Shared session state injected into the client.
#[derive(Debug, Clone)]
pub struct SessionState {
    store: Arc<dyn SessionStore>,
    redirecting: Arc<AtomicBool>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(MemoryStore::default())
    }
}

impl SessionState {
    #[must_use]
    pub fn new(store: impl SessionStore + 'static) -> Self {
        Self::from_arc(Arc::new(store))
    }

    /// Wraps a store that is also used elsewhere in the application.
    #[must_use]
    pub fn from_arc(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            redirecting: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    /// The stored session token. Empty values count as absent.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.store.get(TOKEN_KEY).filter(|t| !t.is_empty())
    }

    /// Whether the stored token is still `token`. Both absent counts as a
    /// match.
    #[must_use]
    pub fn holds_token(&self, token: Option<&str>) -> bool {
        self.token().as_deref() == token
    }

    /// Stores a new session token.
    ///
    /// A fresh session re-arms the redirect guard so a later expiry can
    /// redirect again.
    pub fn set_token(&self, token: &str) {
        self.store.set(TOKEN_KEY, token);
        self.redirecting.store(false, Ordering::SeqCst);
    }

    /// The cached user profile, if present and decodable as `T`.
    #[must_use]
    pub fn user<T: DeserializeOwned>(&self) -> Option<T> {
        let raw = self.store.get(USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!("Cached user profile is not valid JSON: {}", e);
                None
            }
        }
    }

    /// Caches the user profile as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if `user` cannot be serialized.
    pub fn set_user<T: Serialize>(&self, user: &T) -> Result<(), serde_json::Error> {
        let raw = serde_json::to_string(user)?;
        self.store.set(USER_KEY, &raw);
        Ok(())
    }

    /// Removes the token and the cached user profile.
    pub fn clear(&self) {
        self.store.remove(TOKEN_KEY);
        self.store.remove(USER_KEY);
    }

    #[must_use]
    pub fn is_logging_out(&self) -> bool {
        self.store.get(LOGGING_OUT_KEY).as_deref() == Some("true")
    }

    /// Marks an intentional logout. Error notifications and the expiry
    /// redirect are suppressed until [`end_logout`](Self::end_logout).
    pub fn begin_logout(&self) {
        self.store.set(LOGGING_OUT_KEY, "true");
    }

    pub fn end_logout(&self) {
        self.store.remove(LOGGING_OUT_KEY);
    }

    #[must_use]
    pub fn is_redirecting(&self) -> bool {
        self.redirecting.load(Ordering::SeqCst)
    }

    pub fn set_redirecting(&self, redirecting: bool) {
        self.redirecting.store(redirecting, Ordering::SeqCst);
    }

    /// Claims the redirect. Returns `true` for exactly one caller until the
    /// guard is re-armed.
    pub fn try_begin_redirect(&self) -> bool {
        self.redirecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Profile {
        id: u64,
        name: String,
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::default();
        assert_eq!(store.get("k"), None);
        store.set("k", "v");
        assert_eq!(store.get("k").as_deref(), Some("v"));
        store.remove("k");
        assert_eq!(store.get("k"), None);
    }

    #[test]
    fn test_token_empty_counts_as_absent() {
        let session = SessionState::default();
        session.store().set(TOKEN_KEY, "");
        assert_eq!(session.token(), None);
    }

    #[test]
    fn test_clear_removes_token_and_user() {
        let session = SessionState::default();
        session.set_token("t");
        session
            .set_user(&Profile {
                id: 1,
                name: "Ada".to_string(),
            })
            .unwrap();

        session.clear();

        assert_eq!(session.token(), None);
        assert_eq!(session.user::<Profile>(), None);
    }

    #[test]
    fn test_user_profile_roundtrip() {
        let session = SessionState::default();
        let profile = Profile {
            id: 42,
            name: "Grace".to_string(),
        };
        session.set_user(&profile).unwrap();
        assert_eq!(session.user::<Profile>(), Some(profile));
    }

    #[test]
    fn test_user_profile_garbage_is_none() {
        let session = SessionState::default();
        session.store().set(USER_KEY, "not json");
        assert_eq!(session.user::<Profile>(), None);
    }

    #[test]
    fn test_logout_flag() {
        let session = SessionState::default();
        assert!(!session.is_logging_out());
        session.begin_logout();
        assert!(session.is_logging_out());
        session.end_logout();
        assert!(!session.is_logging_out());
    }

    #[test]
    fn test_logout_flag_requires_literal_true() {
        let session = SessionState::default();
        session.store().set(LOGGING_OUT_KEY, "1");
        assert!(!session.is_logging_out());
    }

    #[test]
    fn test_redirect_claimed_once() {
        let session = SessionState::default();
        assert!(session.try_begin_redirect());
        assert!(!session.try_begin_redirect());
        assert!(session.is_redirecting());
    }

    #[test]
    fn test_set_token_rearms_redirect() {
        let session = SessionState::default();
        assert!(session.try_begin_redirect());
        session.set_token("new-session");
        assert!(!session.is_redirecting());
        assert!(session.try_begin_redirect());
    }

    #[test]
    fn test_holds_token() {
        let session = SessionState::default();
        assert!(session.holds_token(None));
        assert!(!session.holds_token(Some("old")));

        session.set_token("fresh");
        assert!(session.holds_token(Some("fresh")));
        assert!(!session.holds_token(Some("old")));
        assert!(!session.holds_token(None));
    }

    #[test]
    fn test_clones_share_state() {
        let session = SessionState::default();
        let other = session.clone();
        session.set_token("shared");
        assert_eq!(other.token().as_deref(), Some("shared"));
        assert!(other.try_begin_redirect());
        assert!(!session.try_begin_redirect());
    }

    #[test]
    fn test_separate_states_do_not_share_redirect_guard() {
        let first = SessionState::default();
        let second = SessionState::default();
        assert!(first.try_begin_redirect());
        assert!(second.try_begin_redirect());
    }

    #[test]
    fn test_file_store_persists_across_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        {
            let store = FileStore::open(&path).unwrap();
            store.set(TOKEN_KEY, "persisted");
            store.set(USER_KEY, r#"{"id":1}"#);
        }

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get(TOKEN_KEY).as_deref(), Some("persisted"));
        assert_eq!(reopened.get(USER_KEY).as_deref(), Some(r#"{"id":1}"#));
    }

    #[test]
    fn test_file_store_remove_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = FileStore::open(&path).unwrap();
        store.set(TOKEN_KEY, "t");
        store.remove(TOKEN_KEY);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get(TOKEN_KEY), None);
    }

    #[test]
    fn test_file_store_replaces_file_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = FileStore::open(&path).unwrap();
        for token in ["a", "b", "c"] {
            store.set(TOKEN_KEY, token);
        }

        let files: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(files, vec![std::ffi::OsString::from("session.json")]);

        let on_disk: HashMap<String, String> =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk.get(TOKEN_KEY).map(String::as_str), Some("c"));
    }

    #[test]
    fn test_file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("absent.json")).unwrap();
        assert_eq!(store.get(TOKEN_KEY), None);
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "[1, 2, 3]").unwrap();

        let err = FileStore::open(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
