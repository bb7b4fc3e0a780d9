//! Runtime config: persisted overrides shadowing deployment defaults.
//!
//! Reads go through an in-process cache that is filled on first access.
//! Every write path calls [`ConfigStore::invalidate`] right after persisting,
//! so the next read reloads from storage.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::models::ConfigUpdate;
use crate::store::{ConfigRepository, LedgerError};

/// Allow-listed config keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    GeminiApiKey,
    AlipayAppId,
    AlipayAppPrivateKey,
    AlipayPublicKey,
    AlipaySignType,
    AlipayDebug,
    AlipayNotifyUrl,
    AlipayReturnUrl,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 8] = [
        ConfigKey::GeminiApiKey,
        ConfigKey::AlipayAppId,
        ConfigKey::AlipayAppPrivateKey,
        ConfigKey::AlipayPublicKey,
        ConfigKey::AlipaySignType,
        ConfigKey::AlipayDebug,
        ConfigKey::AlipayNotifyUrl,
        ConfigKey::AlipayReturnUrl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::GeminiApiKey => "gemini_api_key",
            ConfigKey::AlipayAppId => "alipay_app_id",
            ConfigKey::AlipayAppPrivateKey => "alipay_app_private_key",
            ConfigKey::AlipayPublicKey => "alipay_public_key",
            ConfigKey::AlipaySignType => "alipay_sign_type",
            ConfigKey::AlipayDebug => "alipay_debug",
            ConfigKey::AlipayNotifyUrl => "alipay_notify_url",
            ConfigKey::AlipayReturnUrl => "alipay_return_url",
        }
    }

    /// Environment variable carrying the deployment default.
    pub fn env_var(&self) -> &'static str {
        match self {
            ConfigKey::GeminiApiKey => "GEMINI_API_KEY",
            ConfigKey::AlipayAppId => "ALIPAY_APP_ID",
            ConfigKey::AlipayAppPrivateKey => "ALIPAY_APP_PRIVATE_KEY",
            ConfigKey::AlipayPublicKey => "ALIPAY_PUBLIC_KEY",
            ConfigKey::AlipaySignType => "ALIPAY_SIGN_TYPE",
            ConfigKey::AlipayDebug => "ALIPAY_DEBUG",
            ConfigKey::AlipayNotifyUrl => "ALIPAY_NOTIFY_URL",
            ConfigKey::AlipayReturnUrl => "ALIPAY_RETURN_URL",
        }
    }

    /// Default used when neither storage nor the environment sets the key.
    pub fn builtin_default(&self) -> &'static str {
        match self {
            ConfigKey::AlipaySignType => happybeauty_crypto::SIGN_TYPE_RSA2,
            ConfigKey::AlipayDebug => "false",
            _ => "",
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a key outside the allow-list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown config key: {0}")]
pub struct UnknownConfigKey(pub String);

impl FromStr for ConfigKey {
    type Err = UnknownConfigKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| UnknownConfigKey(s.to_string()))
    }
}

/// Errors from config writes.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    UnknownKey(#[from] UnknownConfigKey),

    #[error(transparent)]
    Storage(#[from] LedgerError),
}

/// Snapshot of the payment provider settings, read in one cache pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    pub app_id: String,
    pub app_private_key: String,
    pub public_key: String,
    pub sign_type: String,
    pub debug: bool,
    pub notify_url: String,
    pub return_url: String,
}

/// One row of the admin config listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigItem {
    pub key: String,
    pub value: String,
    pub description: Option<String>,
    /// True when no persisted override exists.
    pub is_default: bool,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: Option<HashMap<String, String>>,
    /// Bumped by every invalidation.
    generation: u64,
}

/// Owned cache of persisted values, keyed by config key.
///
/// A load that started before an invalidation must not repopulate the
/// cache, so fills carry the generation observed before loading.
#[derive(Debug, Default)]
pub struct ConfigCache {
    state: RwLock<CacheState>,
}

impl ConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached entries, or the generation a fresh load must be filed under.
    async fn snapshot(&self) -> Result<HashMap<String, String>, u64> {
        let state = self.state.read().await;
        state.entries.clone().ok_or(state.generation)
    }

    /// Stores `entries` unless the cache was invalidated since
    /// `generation` was read. Returns whether they were stored.
    async fn fill(&self, generation: u64, entries: HashMap<String, String>) -> bool {
        let mut state = self.state.write().await;
        if state.generation != generation {
            return false;
        }
        state.entries = Some(entries);
        true
    }

    /// Drops cached values; the next read reloads from storage.
    pub async fn invalidate(&self) {
        let mut state = self.state.write().await;
        state.entries = None;
        state.generation = state.generation.wrapping_add(1);
    }

    pub async fn is_populated(&self) -> bool {
        self.state.read().await.entries.is_some()
    }
}

/// Config reads and writes over a [`ConfigRepository`].
pub struct ConfigStore {
    repo: Arc<dyn ConfigRepository>,
    defaults: HashMap<ConfigKey, String>,
    cache: Arc<ConfigCache>,
}

impl ConfigStore {
    pub fn new(
        repo: Arc<dyn ConfigRepository>,
        defaults: impl IntoIterator<Item = (ConfigKey, String)>,
        cache: Arc<ConfigCache>,
    ) -> Self {
        let mut resolved: HashMap<ConfigKey, String> = ConfigKey::ALL
            .iter()
            .map(|key| (*key, key.builtin_default().to_string()))
            .collect();
        resolved.extend(defaults);

        Self {
            repo,
            defaults: resolved,
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<ConfigCache> {
        &self.cache
    }

    /// Persisted values, from cache or storage. A storage failure yields an
    /// empty map for this call only and leaves the cache unpopulated.
    async fn persisted(&self) -> HashMap<String, String> {
        let generation = match self.cache.snapshot().await {
            Ok(entries) => return entries,
            Err(generation) => generation,
        };

        match self.repo.list_config().await {
            Ok(rows) => {
                let entries: HashMap<String, String> =
                    rows.into_iter().map(|row| (row.key, row.value)).collect();
                if !self.cache.fill(generation, entries.clone()).await {
                    tracing::debug!("Config changed during load, not caching");
                }
                entries
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load system config, using defaults");
                HashMap::new()
            }
        }
    }

    fn resolve(&self, persisted: &HashMap<String, String>, key: ConfigKey) -> String {
        persisted
            .get(key.as_str())
            .filter(|value| !value.is_empty())
            .cloned()
            .or_else(|| self.defaults.get(&key).cloned())
            .unwrap_or_default()
    }

    /// Persisted value for `key`, else its deployment default.
    pub async fn get(&self, key: ConfigKey) -> String {
        let persisted = self.persisted().await;
        self.resolve(&persisted, key)
    }

    pub async fn invalidate(&self) {
        self.cache.invalidate().await;
    }

    pub async fn provider_settings(&self) -> ProviderSettings {
        let persisted = self.persisted().await;
        let get = |key| self.resolve(&persisted, key);
        let debug = get(ConfigKey::AlipayDebug);

        ProviderSettings {
            app_id: get(ConfigKey::AlipayAppId),
            app_private_key: get(ConfigKey::AlipayAppPrivateKey),
            public_key: get(ConfigKey::AlipayPublicKey),
            sign_type: get(ConfigKey::AlipaySignType),
            debug: matches!(debug.trim().to_ascii_lowercase().as_str(), "true" | "1"),
            notify_url: get(ConfigKey::AlipayNotifyUrl),
            return_url: get(ConfigKey::AlipayReturnUrl),
        }
    }

    /// Every allow-listed key with its effective value, then any other
    /// persisted rows. Reads storage directly.
    pub async fn list_all(&self) -> Result<Vec<ConfigItem>, LedgerError> {
        let mut rows: HashMap<String, _> = self
            .repo
            .list_config()
            .await?
            .into_iter()
            .map(|row| (row.key.clone(), row))
            .collect();

        let mut items: Vec<ConfigItem> = ConfigKey::ALL
            .iter()
            .map(|key| match rows.remove(key.as_str()) {
                Some(row) => ConfigItem {
                    key: row.key,
                    value: row.value,
                    description: row.description,
                    is_default: false,
                },
                None => ConfigItem {
                    key: key.as_str().to_string(),
                    value: self.defaults.get(key).cloned().unwrap_or_default(),
                    description: None,
                    is_default: true,
                },
            })
            .collect();

        let mut extras: Vec<ConfigItem> = rows
            .into_values()
            .map(|row| ConfigItem {
                key: row.key,
                value: row.value,
                description: row.description,
                is_default: false,
            })
            .collect();
        extras.sort_by(|a, b| a.key.cmp(&b.key));
        items.extend(extras);

        Ok(items)
    }

    /// Validates every key, upserts all items, then invalidates the cache.
    pub async fn update(&self, items: &[ConfigUpdate]) -> Result<(), ConfigError> {
        for item in items {
            item.key.parse::<ConfigKey>()?;
        }

        self.repo.upsert_config(items).await?;
        self.invalidate().await;

        tracing::info!(count = items.len(), "System config updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConfigEntry;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    /// Repository whose next listing reads storage, then parks until
    /// released.
    struct GatedRepo {
        inner: MemoryStore,
        loaded: Notify,
        release: Notify,
    }

    #[async_trait]
    impl ConfigRepository for GatedRepo {
        async fn list_config(&self) -> Result<Vec<ConfigEntry>, LedgerError> {
            let rows = self.inner.list_config().await;
            self.loaded.notify_one();
            self.release.notified().await;
            rows
        }

        async fn upsert_config(&self, items: &[ConfigUpdate]) -> Result<(), LedgerError> {
            self.inner.upsert_config(items).await
        }
    }

    fn store_over(repo: MemoryStore) -> ConfigStore {
        ConfigStore::new(
            Arc::new(repo),
            [(ConfigKey::AlipayAppId, "env-app".to_string())],
            Arc::new(ConfigCache::new()),
        )
    }

    fn update(key: &str, value: &str) -> ConfigUpdate {
        ConfigUpdate {
            key: key.to_string(),
            value: value.to_string(),
            description: None,
        }
    }

    #[test]
    fn test_key_round_trip_and_unknown() {
        for key in ConfigKey::ALL {
            assert_eq!(key.as_str().parse::<ConfigKey>().unwrap(), key);
        }
        assert_eq!(
            "stripe_key".parse::<ConfigKey>(),
            Err(UnknownConfigKey("stripe_key".to_string()))
        );
    }

    #[tokio::test]
    async fn test_default_when_not_persisted() {
        let config = store_over(MemoryStore::new());
        assert_eq!(config.get(ConfigKey::AlipayAppId).await, "env-app");
        assert_eq!(config.get(ConfigKey::AlipaySignType).await, "RSA2");
        assert_eq!(config.get(ConfigKey::GeminiApiKey).await, "");
    }

    #[tokio::test]
    async fn test_update_invalidates_cache() {
        let config = store_over(MemoryStore::new());
        assert_eq!(config.get(ConfigKey::AlipayAppId).await, "env-app");
        assert!(config.cache().is_populated().await);

        config.update(&[update("alipay_app_id", "db-app")]).await.unwrap();
        assert!(!config.cache().is_populated().await);
        assert_eq!(config.get(ConfigKey::AlipayAppId).await, "db-app");
    }

    #[tokio::test]
    async fn test_load_overlapping_update_does_not_cache_stale_values() {
        let inner = MemoryStore::new();
        inner
            .upsert_config(&[update("alipay_app_id", "old-app")])
            .await
            .unwrap();
        let repo = Arc::new(GatedRepo {
            inner: inner.clone(),
            loaded: Notify::new(),
            release: Notify::new(),
        });
        let config = Arc::new(ConfigStore::new(
            repo.clone(),
            Vec::new(),
            Arc::new(ConfigCache::new()),
        ));

        // A read loads "old-app" and stalls before filling the cache.
        let reader = tokio::spawn({
            let config = config.clone();
            async move { config.get(ConfigKey::AlipayAppId).await }
        });
        repo.loaded.notified().await;

        // The update lands while that load is in flight.
        inner
            .upsert_config(&[update("alipay_app_id", "new-app")])
            .await
            .unwrap();
        config.invalidate().await;

        repo.release.notify_one();
        assert_eq!(reader.await.unwrap(), "old-app");
        assert!(!config.cache().is_populated().await);

        // Next read goes to storage. Release it up front; the permit is kept.
        repo.release.notify_one();
        assert_eq!(config.get(ConfigKey::AlipayAppId).await, "new-app");
        assert!(config.cache().is_populated().await);
        assert_eq!(config.get(ConfigKey::AlipayAppId).await, "new-app");
    }

    #[tokio::test]
    async fn test_unknown_key_rejected_before_write() {
        let repo = MemoryStore::new();
        let config = store_over(repo.clone());

        let result = config
            .update(&[update("alipay_app_id", "db-app"), update("bogus", "x")])
            .await;
        assert!(matches!(result, Err(ConfigError::UnknownKey(_))));
        assert!(repo.list_config().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_failure_falls_back_and_is_not_cached() {
        let repo = MemoryStore::new();
        repo.upsert_config(&[update("alipay_app_id", "db-app")])
            .await
            .unwrap();
        let config = store_over(repo.clone());

        repo.fail_next_operations(1);
        assert_eq!(config.get(ConfigKey::AlipayAppId).await, "env-app");
        assert!(!config.cache().is_populated().await);

        assert_eq!(config.get(ConfigKey::AlipayAppId).await, "db-app");
    }

    #[tokio::test]
    async fn test_provider_settings_parses_debug() {
        let repo = MemoryStore::new();
        repo.upsert_config(&[update("alipay_debug", "TRUE")])
            .await
            .unwrap();
        let settings = store_over(repo).provider_settings().await;
        assert!(settings.debug);
        assert_eq!(settings.app_id, "env-app");
        assert_eq!(settings.sign_type, "RSA2");
    }

    #[tokio::test]
    async fn test_list_all_includes_defaults_and_extras() {
        let repo = MemoryStore::new();
        repo.upsert_config(&[update("alipay_debug", "true"), update("legacy_flag", "on")])
            .await
            .unwrap();

        let items = store_over(repo).list_all().await.unwrap();
        assert_eq!(items.len(), ConfigKey::ALL.len() + 1);

        let debug = items.iter().find(|i| i.key == "alipay_debug").unwrap();
        assert_eq!(debug.value, "true");
        assert!(!debug.is_default);

        let app_id = items.iter().find(|i| i.key == "alipay_app_id").unwrap();
        assert_eq!(app_id.value, "env-app");
        assert!(app_id.is_default);

        assert_eq!(items.last().unwrap().key, "legacy_flag");
    }
}
