use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use super::{AuthStrategy, IdentityProvider, ScopeSet, TokenEntry, TokenStore};
use crate::error::{AuthFailureReason, SharePointError};

pub const DEFAULT_SAFETY_MARGIN_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub authority: String,
    pub scopes: ScopeSet,
    pub identity: String,
}

impl CacheKey {
    pub fn new(strategy: &AuthStrategy, scopes: &ScopeSet) -> Self {
        Self {
            authority: strategy.authority(),
            scopes: scopes.clone(),
            identity: strategy.cache_identity(),
        }
    }

    fn storage_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.authority,
            self.identity,
            self.scopes.to_form_value()
        )
    }
}

type Slot = Arc<AsyncMutex<Option<TokenEntry>>>;

/// Token cache with one in-flight refresh per key.
///
/// Each key owns an async mutex around its current entry. A caller that finds
/// the entry missing or inside the safety margin refreshes while holding the
/// lock, so concurrent callers for the same key wait and then observe the
/// refreshed entry instead of starting their own flow.
pub struct TokenCache {
    provider: Arc<dyn IdentityProvider>,
    safety_margin: Duration,
    slots: std::sync::Mutex<HashMap<CacheKey, Slot>>,
    store: Option<Arc<dyn TokenStore>>,
}

impl TokenCache {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            provider,
            safety_margin: Duration::seconds(DEFAULT_SAFETY_MARGIN_SECS),
            slots: std::sync::Mutex::new(HashMap::new()),
            store: None,
        }
    }

    pub fn with_safety_margin(mut self, margin: Duration) -> Self {
        self.safety_margin = margin;
        self
    }

    pub fn with_safety_margin_secs(self, secs: i64) -> Self {
        self.with_safety_margin(Duration::seconds(secs.max(0)))
    }

    pub fn with_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn safety_margin(&self) -> Duration {
        self.safety_margin
    }

    fn slot(&self, key: &CacheKey) -> Result<Slot, SharePointError> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|e| SharePointError::Internal(format!("token cache lock poisoned: {}", e)))?;
        Ok(slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(None)))
            .clone())
    }

    /// Return a usable token for `(strategy, scopes)`, refreshing if needed.
    pub async fn get_or_refresh(
        &self,
        strategy: &AuthStrategy,
        scopes: &ScopeSet,
    ) -> Result<TokenEntry, SharePointError> {
        let key = CacheKey::new(strategy, scopes);
        let slot = self.slot(&key)?;
        let mut current = slot.lock().await;

        if let Some(entry) = current.as_ref() {
            if entry.is_usable(self.safety_margin) {
                return Ok(entry.clone());
            }
        } else if let Some(persisted) = self.load_persisted(&key) {
            debug!(target: "sharepoint.auth", identity = %key.identity, "using persisted token");
            *current = Some(persisted.clone());
            return Ok(persisted);
        }

        // Drop the stale entry first so a failed refresh never leaves it behind.
        *current = None;
        info!(
            target: "sharepoint.auth",
            strategy = strategy.kind().as_str(),
            identity = %key.identity,
            "refreshing access token"
        );

        let entry = self.provider.acquire(strategy, scopes).await?;
        if entry.expires_at() <= Utc::now() {
            return Err(SharePointError::authentication(
                AuthFailureReason::Rejected,
                "identity provider issued an already expired token",
            ));
        }

        if let Some(store) = &self.store {
            if let Err(e) = store.save(&key.storage_key(), &entry) {
                warn!(target: "sharepoint.auth", error = %e, "failed to persist token");
            }
        }
        *current = Some(entry.clone());
        Ok(entry)
    }

    /// Drop the cached entry for the key, but only if it is still `stale`.
    /// Returns whether anything was removed.
    pub async fn invalidate(
        &self,
        strategy: &AuthStrategy,
        scopes: &ScopeSet,
        stale: &TokenEntry,
    ) -> Result<bool, SharePointError> {
        let key = CacheKey::new(strategy, scopes);
        let slot = self.slot(&key)?;
        let mut current = slot.lock().await;
        if current.as_ref() != Some(stale) {
            return Ok(false);
        }
        *current = None;
        if let Some(store) = &self.store {
            if let Err(e) = store.remove(&key.storage_key()) {
                warn!(target: "sharepoint.auth", error = %e, "failed to drop persisted token");
            }
        }
        debug!(target: "sharepoint.auth", identity = %key.identity, "token invalidated");
        Ok(true)
    }

    fn load_persisted(&self, key: &CacheKey) -> Option<TokenEntry> {
        let entry = self.store.as_ref()?.load(&key.storage_key())?;
        entry.is_usable(self.safety_margin).then_some(entry)
    }
}
