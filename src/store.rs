use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{BoxError, Error};
use crate::types::{Session, UserClaims};

/// Durable key-value persistence backing the session.
///
/// Browser storage, an encrypted disk cache or an OS keychain all fit.
/// The controller is the only writer.
///
/// # Example
///
/// ```rust,ignore
/// impl KeyValueStore for Keychain {
///     async fn get(&self, key: &str) -> Result<Option<String>, BoxError> {
///         self.entry(key)?.get_password().map(Some).or_else(not_found_as_none)
///     }
///     // ...
/// }
/// ```
pub trait KeyValueStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, BoxError>> + Send;

    fn set(&self, key: &str, value: String) -> impl Future<Output = Result<(), BoxError>> + Send;

    /// Remove an entry. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> impl Future<Output = Result<(), BoxError>> + Send;
}

impl<T: KeyValueStore> KeyValueStore for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<String>, BoxError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: String) -> Result<(), BoxError> {
        (**self).set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), BoxError> {
        (**self).remove(key).await
    }
}

/// In-process store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read an entry synchronously.
    #[must_use]
    pub fn entry(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    /// Write an entry synchronously (for seeding fixtures).
    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.lock().insert(key.into(), value.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, BoxError> {
        Ok(self.entry(key))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), BoxError> {
        self.lock().insert(key.to_owned(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), BoxError> {
        self.lock().remove(key);
        Ok(())
    }
}

#[cfg(feature = "file-store")]
pub use file::FileStore;

#[cfg(feature = "file-store")]
mod file {
    use std::io::ErrorKind;
    use std::path::{Path, PathBuf};

    use super::KeyValueStore;
    use crate::error::BoxError;

    /// One JSON file per key under a directory.
    ///
    /// Writes land in a temp file first and are renamed into place, so an
    /// interrupted write leaves the previous value intact.
    #[derive(Debug, Clone)]
    pub struct FileStore {
        dir: PathBuf,
    }

    impl FileStore {
        #[must_use]
        pub fn new(dir: impl Into<PathBuf>) -> Self {
            Self { dir: dir.into() }
        }

        #[must_use]
        pub fn dir(&self) -> &Path {
            &self.dir
        }

        fn path_for(&self, key: &str) -> Result<PathBuf, BoxError> {
            let valid = !key.is_empty()
                && key
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
            if !valid {
                return Err(format!("invalid store key: {key:?}").into());
            }
            Ok(self.dir.join(format!("{key}.json")))
        }
    }

    impl KeyValueStore for FileStore {
        async fn get(&self, key: &str) -> Result<Option<String>, BoxError> {
            let path = self.path_for(key)?;
            match tokio::fs::read_to_string(&path).await {
                Ok(contents) => Ok(Some(contents)),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        }

        async fn set(&self, key: &str, value: String) -> Result<(), BoxError> {
            let path = self.path_for(key)?;
            tokio::fs::create_dir_all(&self.dir).await?;
            let tmp = path.with_extension("json.tmp");
            tokio::fs::write(&tmp, value).await?;
            tokio::fs::rename(&tmp, &path).await?;
            Ok(())
        }

        async fn remove(&self, key: &str) -> Result<(), BoxError> {
            let path = self.path_for(key)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        }
    }
}

/// Names of the persisted entries.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct StoreKeys {
    pub session: String,
    pub claims: String,
    pub pending_state: String,
}

impl Default for StoreKeys {
    fn default() -> Self {
        Self {
            session: "authTokens".into(),
            claims: "user".into(),
            pending_state: "oauthState".into(),
        }
    }
}

impl StoreKeys {
    #[must_use]
    pub fn with_session(mut self, key: impl Into<String>) -> Self {
        self.session = key.into();
        self
    }

    #[must_use]
    pub fn with_claims(mut self, key: impl Into<String>) -> Self {
        self.claims = key.into();
        self
    }

    #[must_use]
    pub fn with_pending_state(mut self, key: impl Into<String>) -> Self {
        self.pending_state = key.into();
        self
    }
}

/// Maps a [`Session`] onto its two persisted entries.
pub struct SessionStore<K> {
    backend: K,
    keys: StoreKeys,
}

impl<K: KeyValueStore> SessionStore<K> {
    #[must_use]
    pub fn new(backend: K) -> Self {
        Self {
            backend,
            keys: StoreKeys::default(),
        }
    }

    #[must_use]
    pub fn with_keys(mut self, keys: StoreKeys) -> Self {
        self.keys = keys;
        self
    }

    pub(crate) fn set_keys(&mut self, keys: StoreKeys) {
        self.keys = keys;
    }

    #[must_use]
    pub fn backend(&self) -> &K {
        &self.backend
    }

    #[must_use]
    pub fn keys(&self) -> &StoreKeys {
        &self.keys
    }

    /// Load the persisted session.
    ///
    /// Both entries must be present; the claims entry wins over the claims
    /// embedded in the session entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptStoredSession`] for partial or unparseable
    /// data, [`Error::Store`] if the backend fails.
    pub async fn load(&self) -> Result<Option<Session>, Error> {
        let raw_session = self.backend.get(&self.keys.session).await.map_err(Error::Store)?;
        let raw_claims = self.backend.get(&self.keys.claims).await.map_err(Error::Store)?;

        let (raw_session, raw_claims) = match (raw_session, raw_claims) {
            (None, None) => return Ok(None),
            (Some(s), Some(c)) => (s, c),
            (Some(_), None) => {
                return Err(Error::CorruptStoredSession("claims entry missing".into()));
            }
            (None, Some(_)) => {
                return Err(Error::CorruptStoredSession("session entry missing".into()));
            }
        };

        let mut session: Session = serde_json::from_str(&raw_session)
            .map_err(|e| Error::CorruptStoredSession(format!("session entry: {e}")))?;
        let claims: UserClaims = serde_json::from_str(&raw_claims)
            .map_err(|e| Error::CorruptStoredSession(format!("claims entry: {e}")))?;

        if !session.is_authenticated() {
            return Err(Error::CorruptStoredSession("empty access token".into()));
        }

        session.claims = claims;
        Ok(Some(session))
    }

    /// Persist a session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the backend fails.
    pub async fn save(&self, session: &Session) -> Result<(), Error> {
        let raw_session = serde_json::to_string(session).map_err(|e| Error::Store(e.into()))?;
        let raw_claims =
            serde_json::to_string(&session.claims).map_err(|e| Error::Store(e.into()))?;

        self.backend
            .set(&self.keys.session, raw_session)
            .await
            .map_err(Error::Store)?;
        self.backend
            .set(&self.keys.claims, raw_claims)
            .await
            .map_err(Error::Store)
    }

    /// Remove both session entries. Attempts both even if the first fails.
    ///
    /// # Errors
    ///
    /// Returns the first [`Error::Store`] encountered.
    pub async fn clear(&self) -> Result<(), Error> {
        let session = self.backend.remove(&self.keys.session).await;
        let claims = self.backend.remove(&self.keys.claims).await;
        session.and(claims).map_err(Error::Store)
    }

    /// Record the CSRF `state` sent with an authorization request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the backend fails.
    pub async fn save_pending_state(&self, state: &str) -> Result<(), Error> {
        self.backend
            .set(&self.keys.pending_state, state.to_owned())
            .await
            .map_err(Error::Store)
    }

    /// Read and remove the recorded CSRF `state`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the backend fails.
    pub async fn take_pending_state(&self) -> Result<Option<String>, Error> {
        let state = self
            .backend
            .get(&self.keys.pending_state)
            .await
            .map_err(Error::Store)?;
        if state.is_some() {
            self.backend
                .remove(&self.keys.pending_state)
                .await
                .map_err(Error::Store)?;
        }
        Ok(state)
    }
}
