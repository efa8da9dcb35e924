//! Refresh token bookkeeping.
//!
//! Refresh tokens are opaque identifiers mapped to the access token issued
//! alongside them. Entries live as long as the process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use uuid::Uuid;

use crate::error::{Result, ServerError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("refresh token not found")]
    NotFound,
}

/// Storage of refresh token entries.
pub trait RefreshTokenStore: Send + Sync {
    /// Store `access_token` under `id`, replacing any previous value.
    fn insert(&self, id: String, access_token: String);

    /// Access token stored under `id`.
    fn get(&self, id: &str) -> Option<String>;

    /// Delete `id`, returning its access token.
    fn remove(&self, id: &str) -> Option<String>;

    /// Remove `old_id` and insert `new_id` as one step.
    ///
    /// Fails with [`StoreError::NotFound`] and leaves the store untouched
    /// if `old_id` is absent.
    fn replace(
        &self,
        old_id: &str,
        new_id: String,
        access_token: String,
    ) -> std::result::Result<(), StoreError>;

    /// Number of live entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Mutex-guarded in-memory store.
#[derive(Debug, Default)]
pub struct MemoryRefreshTokenStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Entries are plain strings: a panic while holding the lock cannot leave
    // one half-written.
    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RefreshTokenStore for MemoryRefreshTokenStore {
    fn insert(&self, id: String, access_token: String) {
        self.entries().insert(id, access_token);
    }

    fn get(&self, id: &str) -> Option<String> {
        self.entries().get(id).cloned()
    }

    fn remove(&self, id: &str) -> Option<String> {
        self.entries().remove(id)
    }

    fn replace(
        &self,
        old_id: &str,
        new_id: String,
        access_token: String,
    ) -> std::result::Result<(), StoreError> {
        let mut entries = self.entries();
        entries.remove(old_id).ok_or(StoreError::NotFound)?;
        entries.insert(new_id, access_token);
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries().len()
    }
}

/// Issue and exchange refresh tokens.
#[derive(Clone)]
pub struct RefreshTokens {
    store: Arc<dyn RefreshTokenStore>,
}

impl RefreshTokens {
    pub fn new(store: Arc<dyn RefreshTokenStore>) -> Self {
        Self { store }
    }

    /// Service backed by a fresh [`MemoryRefreshTokenStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryRefreshTokenStore::new()))
    }

    pub fn store(&self) -> &dyn RefreshTokenStore {
        self.store.as_ref()
    }

    /// Record `access_token` under a new random refresh token.
    pub fn issue(&self, access_token: String) -> String {
        let id = Uuid::new_v4().to_string();
        self.store.insert(id.clone(), access_token);
        id
    }

    /// Trade `refresh_token` for a new access token built by `mint` and a
    /// new refresh token.
    ///
    /// Unknown and already exchanged refresh tokens are both rejected with
    /// [`ServerError::InvalidRefreshToken`].
    pub fn exchange<F>(&self, refresh_token: &str, mint: F) -> Result<(String, String)>
    where
        F: FnOnce() -> Result<String>,
    {
        if self.store.get(refresh_token).is_none() {
            return Err(ServerError::InvalidRefreshToken);
        }

        let token = mint()?;
        let id = Uuid::new_v4().to_string();

        // Another request may have spent `refresh_token` since the lookup.
        self.store.replace(refresh_token, id.clone(), token.clone())?;

        Ok((token, id))
    }
}
