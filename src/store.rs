//! Persisted key-value storage for tokens and the cached user.
//!
//! Mirrors browser local storage: string values under fixed keys, no TTL,
//! no encryption. Presence or absence is the only contract the session
//! layer relies on.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use crate::error::Error;

/// Storage keys shared with the portal front end.
pub mod keys {
    pub const ACCESS_TOKEN: &str = "accessToken";
    pub const REFRESH_TOKEN: &str = "refreshToken";
    pub const USER: &str = "user";
    pub const REMEMBERED_EMAIL: &str = "rememberedEmail";
}

/// Keys cleared on logout, corrupt restore, or session expiry.
pub const AUTH_KEYS: [&str; 3] = [keys::ACCESS_TOKEN, keys::REFRESH_TOKEN, keys::USER];

/// Consumer-provided persistence for auth state.
///
/// Methods are synchronous: implementations back onto memory, a local file,
/// or host storage, never the network.
///
/// # Example
///
/// ```rust,ignore
/// impl TokenStore for BrowserStorage {
///     fn get(&self, key: &str) -> Result<Option<String>, Error> {
///         self.local.get_item(key).map_err(|e| Error::Storage(format!("{e:?}")))
///     }
///     // ...
/// }
/// ```
pub trait TokenStore: Send + Sync + 'static {
    /// Read a value. `Ok(None)` when the key is absent.
    fn get(&self, key: &str) -> Result<Option<String>, Error>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<(), Error>;

    /// Remove a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), Error>;
}

/// Removes the access token, refresh token and cached user.
///
/// `rememberedEmail` is deliberately left in place.
///
/// # Errors
///
/// Returns the first [`Error::Storage`] encountered; remaining keys are still attempted.
pub fn clear_auth_keys(store: &dyn TokenStore) -> Result<(), Error> {
    let mut first_err = None;
    for key in AUTH_KEYS {
        if let Err(e) = store.remove(key) {
            tracing::warn!(key, error = %e, "Failed to remove auth key");
            first_err.get_or_insert(e);
        }
    }
    first_err.map_or(Ok(()), Err)
}

/// In-memory store. State is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let entries = self
            .entries
            .read()
            .map_err(|_| Error::Storage("memory store lock poisoned".into()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.entries
            .write()
            .map_err(|_| Error::Storage("memory store lock poisoned".into()))?
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        self.entries
            .write()
            .map_err(|_| Error::Storage("memory store lock poisoned".into()))?
            .remove(key);
        Ok(())
    }
}

/// JSON-file store that survives process restarts.
///
/// The whole map is rewritten on every mutation, through a sibling
/// `<name>.tmp` file renamed over the original, so readers see either the old
/// or the new contents. A missing file reads as empty. Reading a file that is
/// not a JSON object of strings is a storage error; a mutation replaces it.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Option<Vec<u8>>, Error> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(&e)),
        }
    }

    fn parse(&self, bytes: &[u8]) -> Result<HashMap<String, String>, Error> {
        if bytes.is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_slice(bytes)
            .map_err(|e| Error::Storage(format!("{}: {e}", self.path.display())))
    }

    fn load(&self) -> Result<HashMap<String, String>, Error> {
        match self.read()? {
            Some(bytes) => self.parse(&bytes),
            None => Ok(HashMap::new()),
        }
    }

    fn save(&self, entries: &HashMap<String, String>) -> Result<(), Error> {
        let bytes = serde_json::to_vec_pretty(entries)
            .map_err(|e| Error::Storage(e.to_string()))?;
        let tmp = self.temp_path();
        std::fs::write(&tmp, bytes).map_err(|e| self.io_error(&e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            self.io_error(&e)
        })
    }

    fn update(&self, f: impl FnOnce(&mut HashMap<String, String>)) -> Result<(), Error> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| Error::Storage("file store lock poisoned".into()))?;
        let mut entries = match self.read()? {
            Some(bytes) => self.parse(&bytes).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Replacing unreadable token file");
                HashMap::new()
            }),
            None => HashMap::new(),
        };
        f(&mut entries);
        self.save(&entries)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, e: &std::io::Error) -> Error {
        Error::Storage(format!("{}: {e}", self.path.display()))
    }
}

impl TokenStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| Error::Storage("file store lock poisoned".into()))?;
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.update(|entries| {
            entries.insert(key.to_owned(), value.to_owned());
        })
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populate(store: &dyn TokenStore) {
        store.set(keys::ACCESS_TOKEN, "a").unwrap();
        store.set(keys::REFRESH_TOKEN, "r").unwrap();
        store.set(keys::USER, "{}").unwrap();
        store.set(keys::REMEMBERED_EMAIL, "ada@example.com").unwrap();
    }

    #[test]
    fn memory_store_set_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        store.remove("k").unwrap();
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn clear_auth_keys_keeps_remembered_email() {
        let store = MemoryStore::new();
        populate(&store);
        clear_auth_keys(&store).unwrap();
        for key in AUTH_KEYS {
            assert_eq!(store.get(key).unwrap(), None, "{key} should be cleared");
        }
        assert_eq!(
            store.get(keys::REMEMBERED_EMAIL).unwrap().as_deref(),
            Some("ada@example.com")
        );
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");

        populate(&FileStore::new(&path));

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get(keys::ACCESS_TOKEN).unwrap().as_deref(), Some("a"));
        clear_auth_keys(&reopened).unwrap();

        let again = FileStore::new(&path);
        assert_eq!(again.get(keys::ACCESS_TOKEN).unwrap(), None);
        assert!(again.get(keys::REMEMBERED_EMAIL).unwrap().is_some());
    }

    #[test]
    fn file_store_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("absent.json"));
        assert_eq!(store.get(keys::USER).unwrap(), None);
    }

    #[test]
    fn file_store_corrupt_file_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        std::fs::write(&path, b"not json").unwrap();
        let err = FileStore::new(&path).get(keys::USER).unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn file_store_mutation_replaces_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        std::fs::write(&path, br#"{"accessToken":"a","us"#).unwrap();
        let store = FileStore::new(&path);

        clear_auth_keys(&store).unwrap();
        store.set(keys::ACCESS_TOKEN, "b").unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get(keys::ACCESS_TOKEN).unwrap().as_deref(), Some("b"));
        assert_eq!(reopened.get(keys::USER).unwrap(), None);
    }

    #[test]
    fn file_store_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("auth.json"));
        populate(&store);

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![OsString::from("auth.json")]);
    }
}
