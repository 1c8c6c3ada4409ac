//! Credential storage.
//!
//! The access token and the refresh token are kept behind a [`SessionStore`]
//! shared by every component that needs them. The [`crate::keeper`] is the
//! only writer during normal operation; views only read the access token.
//!
//! Two stores are provided:
//!
//! - [`MemorySessionStore`] keeps everything in process memory.
//! - [`FileSessionStore`] persists the pair as JSON so it survives restarts.
//!   The access token carries its declared lifetime ([`ACCESS_TOKEN_TTL`]) and
//!   is no longer returned once that has passed.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::CredentialPair;
use crate::timestamp::UnixTimestamp;

/// Declared lifetime of a stored access token (7 days).
pub const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Shared storage for the credential pair.
///
/// Reads return owned copies; no lock is held by the caller, so a reader may
/// observe a token that is rotated right after the read.
pub trait SessionStore: Send + Sync + fmt::Debug {
    /// Returns the current access token, if any.
    fn access_token(&self) -> Option<String>;

    /// Returns the current refresh token, if any.
    fn refresh_token(&self) -> Option<String>;

    /// Replaces both tokens.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the new pair cannot be persisted.
    fn set(&self, credentials: &CredentialPair) -> Result<(), StoreError>;

    /// Forgets both tokens.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the cleared state cannot be persisted.
    fn clear(&self) -> Result<(), StoreError>;
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct StoredSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_expires_at: Option<UnixTimestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

impl StoredSession {
    fn from_pair(credentials: &CredentialPair, now: UnixTimestamp) -> Self {
        Self {
            access_token: Some(credentials.access_token.clone()),
            access_expires_at: Some(now + ACCESS_TOKEN_TTL),
            refresh_token: Some(credentials.refresh_token.clone()),
        }
    }

    fn live_access_token(&self, now: UnixTimestamp) -> Option<String> {
        match self.access_expires_at {
            Some(expires_at) if !now.is_before(expires_at) => None,
            _ => self.access_token.clone(),
        }
    }
}

/// In-memory session store.
#[derive(Default)]
pub struct MemorySessionStore {
    state: RwLock<StoredSession>,
}

impl MemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding only a refresh token, as right after a
    /// restart when the access token has been dropped.
    #[must_use]
    pub fn with_refresh_token(refresh_token: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(StoredSession {
                refresh_token: Some(refresh_token.into()),
                ..StoredSession::default()
            }),
        }
    }

    /// Creates a store holding a full credential pair.
    #[must_use]
    pub fn with_credentials(credentials: &CredentialPair) -> Self {
        Self {
            state: RwLock::new(StoredSession::from_pair(credentials, UnixTimestamp::now())),
        }
    }
}

impl fmt::Debug for MemorySessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("MemorySessionStore")
            .field("has_access_token", &state.access_token.is_some())
            .field("has_refresh_token", &state.refresh_token.is_some())
            .finish()
    }
}

impl SessionStore for MemorySessionStore {
    fn access_token(&self) -> Option<String> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.live_access_token(UnixTimestamp::now())
    }

    fn refresh_token(&self) -> Option<String> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.refresh_token.clone()
    }

    fn set(&self, credentials: &CredentialPair) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = StoredSession::from_pair(credentials, UnixTimestamp::now());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = StoredSession::default();
        Ok(())
    }
}

/// Session store persisted as a JSON file.
///
/// The file is rewritten on every change. Concurrent writers in other
/// processes are not coordinated with.
pub struct FileSessionStore {
    path: PathBuf,
    state: RwLock<StoredSession>,
}

impl FileSessionStore {
    /// Opens the store at `path`, starting empty if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = match fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => StoredSession::default(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoredSession::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, state: &StoredSession) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(state)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn replace(&self, next: StoredSession) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        self.persist(&next)?;
        *state = next;
        Ok(())
    }
}

impl fmt::Debug for FileSessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSessionStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SessionStore for FileSessionStore {
    fn access_token(&self) -> Option<String> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.live_access_token(UnixTimestamp::now())
    }

    fn refresh_token(&self) -> Option<String> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.refresh_token.clone()
    }

    fn set(&self, credentials: &CredentialPair) -> Result<(), StoreError> {
        self.replace(StoredSession::from_pair(credentials, UnixTimestamp::now()))
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.replace(StoredSession::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("dmp-session-{}-{name}", std::process::id()))
            .join("session.json")
    }

    #[test]
    fn test_memory_store_set_and_clear() {
        let store = MemorySessionStore::with_refresh_token("R1");
        assert_eq!(store.access_token(), None);
        assert_eq!(store.refresh_token().as_deref(), Some("R1"));

        store.set(&CredentialPair::new("A2", "R2")).unwrap();
        assert_eq!(store.access_token().as_deref(), Some("A2"));
        assert_eq!(store.refresh_token().as_deref(), Some("R2"));

        store.clear().unwrap();
        assert_eq!(store.access_token(), None);
        assert_eq!(store.refresh_token(), None);
    }

    #[test]
    fn test_expired_access_token_is_not_returned() {
        let session = StoredSession {
            access_token: Some("A1".into()),
            access_expires_at: Some(UnixTimestamp::from_secs(100)),
            refresh_token: Some("R1".into()),
        };
        assert_eq!(
            session.live_access_token(UnixTimestamp::from_secs(99)).as_deref(),
            Some("A1")
        );
        assert_eq!(session.live_access_token(UnixTimestamp::from_secs(100)), None);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let path = temp_path("reopen");
        let _ = fs::remove_file(&path);

        let store = FileSessionStore::open(&path).unwrap();
        assert_eq!(store.refresh_token(), None);
        store.set(&CredentialPair::new("A1", "R1")).unwrap();

        let reopened = FileSessionStore::open(&path).unwrap();
        assert_eq!(reopened.access_token().as_deref(), Some("A1"));
        assert_eq!(reopened.refresh_token().as_deref(), Some("R1"));

        reopened.clear().unwrap();
        let cleared = FileSessionStore::open(&path).unwrap();
        assert_eq!(cleared.refresh_token(), None);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let path = temp_path("corrupt");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "not json").unwrap();

        assert!(matches!(
            FileSessionStore::open(&path),
            Err(StoreError::Format(_))
        ));

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
