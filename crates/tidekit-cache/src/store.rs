//! Namespace stores and the storage root.

use std::sync::Arc;

use hashbrown::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::{CacheError, CacheKey, CachedResponse};

/// Entries and accounting for one namespace.
#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<CacheKey, CachedResponse>,
    bytes_used: u64,
    quota: Option<u64>,
}

impl CacheState {
    /// Bytes freed if `key` were overwritten.
    fn replaced_len(&self, key: &CacheKey) -> u64 {
        self.entries.get(key).map(|e| e.body_len()).unwrap_or(0)
    }

    fn insert(&mut self, key: CacheKey, response: CachedResponse) {
        self.bytes_used = self.bytes_used - self.replaced_len(&key) + response.body_len();
        self.entries.insert(key, response);
    }
}

/// Clonable handle to one cache namespace.
#[derive(Debug, Clone)]
pub struct CacheHandle {
    name: Arc<str>,
    state: Arc<RwLock<CacheState>>,
}

impl CacheHandle {
    fn new(name: &str, quota: Option<u64>) -> Self {
        Self {
            name: Arc::from(name),
            state: Arc::new(RwLock::new(CacheState {
                quota,
                ..Default::default()
            })),
        }
    }

    /// Namespace name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store a snapshot under a key, overwriting any prior snapshot.
    pub async fn put(&self, key: CacheKey, response: CachedResponse) -> Result<(), CacheError> {
        let mut state = self.state.write().await;

        if let Some(quota) = state.quota {
            let projected =
                state.bytes_used - state.replaced_len(&key) + response.body_len();
            if projected > quota {
                return Err(CacheError::QuotaExceeded {
                    cache: self.name.to_string(),
                    needed: response.body_len(),
                    remaining: quota.saturating_sub(state.bytes_used),
                });
            }
        }

        trace!(cache = %self.name, url = %key.url, "Storing snapshot");
        state.insert(key, response);
        Ok(())
    }

    /// Store a batch of snapshots under a single lock acquisition.
    ///
    /// Either every snapshot is committed or none is; a quota failure
    /// leaves the namespace untouched.
    pub async fn put_all(
        &self,
        entries: Vec<(CacheKey, CachedResponse)>,
    ) -> Result<(), CacheError> {
        let mut state = self.state.write().await;

        if let Some(quota) = state.quota {
            // Later batch entries overwrite earlier ones with the same key,
            // so project sizes key-by-key.
            let mut sizes: HashMap<&CacheKey, u64> = HashMap::new();
            for (key, response) in &entries {
                sizes.insert(key, response.body_len());
            }
            let mut projected = state.bytes_used;
            for (key, len) in &sizes {
                projected = projected - state.replaced_len(key) + *len;
            }
            if projected > quota {
                let needed: u64 = sizes.values().sum();
                return Err(CacheError::QuotaExceeded {
                    cache: self.name.to_string(),
                    needed,
                    remaining: quota.saturating_sub(state.bytes_used),
                });
            }
        }

        debug!(cache = %self.name, count = entries.len(), "Committing snapshot batch");
        for (key, response) in entries {
            state.insert(key, response);
        }
        Ok(())
    }

    /// Exact match: method plus URL.
    pub async fn match_request(&self, key: &CacheKey) -> Option<CachedResponse> {
        self.state.read().await.entries.get(key).cloned()
    }

    /// URL-only match, ignoring the method.
    pub async fn match_url(&self, url: &str) -> Option<CachedResponse> {
        self.state
            .read()
            .await
            .entries
            .values()
            .find(|e| e.url == url)
            .cloned()
    }

    /// Remove a single entry.
    pub async fn delete(&self, key: &CacheKey) -> bool {
        let mut state = self.state.write().await;
        match state.entries.remove(key) {
            Some(removed) => {
                state.bytes_used -= removed.body_len();
                true
            }
            None => false,
        }
    }

    /// All stored keys.
    pub async fn keys(&self) -> Vec<CacheKey> {
        self.state.read().await.entries.keys().cloned().collect()
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    /// Whether the namespace holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Total body bytes stored.
    pub async fn bytes_used(&self) -> u64 {
        self.state.read().await.bytes_used
    }
}

/// The storage root: all cache namespaces by name.
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: RwLock<HashMap<String, CacheHandle>>,
    quota_per_cache: Option<u64>,
}

impl CacheStorage {
    /// Create storage with no per-namespace quota.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create storage with a byte quota applied to each namespace it opens.
    pub fn with_quota(quota: u64) -> Self {
        Self {
            caches: RwLock::new(HashMap::new()),
            quota_per_cache: Some(quota),
        }
    }

    /// Open a namespace, creating it if absent.
    pub async fn open(&self, name: &str) -> CacheHandle {
        let mut caches = self.caches.write().await;
        caches
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(cache = name, "Creating cache namespace");
                CacheHandle::new(name, self.quota_per_cache)
            })
            .clone()
    }

    /// Whether a namespace exists.
    pub async fn has(&self, name: &str) -> bool {
        self.caches.read().await.contains_key(name)
    }

    /// Names of all existing namespaces.
    pub async fn keys(&self) -> Vec<String> {
        self.caches.read().await.keys().cloned().collect()
    }

    /// Delete a namespace in its entirety.
    ///
    /// Returns false if no namespace with that name exists. Handles cloned
    /// from the deleted namespace keep working against the detached store
    /// but it is no longer reachable by name.
    pub async fn delete(&self, name: &str) -> bool {
        let removed = self.caches.write().await.remove(name).is_some();
        if removed {
            debug!(cache = name, "Deleted cache namespace");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(url: &str, body: &[u8]) -> CachedResponse {
        CachedResponse::new(url, 200, HashMap::new(), body.to_vec())
    }

    #[tokio::test]
    async fn test_put_and_match() {
        let storage = CacheStorage::new();
        let cache = storage.open("app-v1").await;

        let key = CacheKey::get("https://example.com/style.css");
        cache
            .put(key.clone(), snapshot("https://example.com/style.css", b"body"))
            .await
            .unwrap();

        assert!(cache.match_request(&key).await.is_some());
        assert!(cache
            .match_request(&CacheKey::get("https://example.com/other.css"))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_match_url_ignores_method() {
        let storage = CacheStorage::new();
        let cache = storage.open("app-v1").await;

        let key = CacheKey::get("https://example.com/index.html");
        cache
            .put(key, snapshot("https://example.com/index.html", b"<html>"))
            .await
            .unwrap();

        let head = CacheKey::new("HEAD", "https://example.com/index.html");
        assert!(cache.match_request(&head).await.is_none());
        assert!(cache.match_url("https://example.com/index.html").await.is_some());
    }

    #[tokio::test]
    async fn test_put_overwrites_same_key() {
        let storage = CacheStorage::new();
        let cache = storage.open("app-v1").await;
        let key = CacheKey::get("https://example.com/");

        cache
            .put(key.clone(), snapshot("https://example.com/", b"first"))
            .await
            .unwrap();
        cache
            .put(key.clone(), snapshot("https://example.com/", b"second!"))
            .await
            .unwrap();

        let entry = cache.match_request(&key).await.unwrap();
        assert_eq!(entry.body, b"second!");
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.bytes_used().await, 7);
    }

    #[tokio::test]
    async fn test_put_all_commits_batch() {
        let storage = CacheStorage::new();
        let cache = storage.open("app-v1").await;

        let batch = vec![
            (
                CacheKey::get("https://example.com/"),
                snapshot("https://example.com/", b"root"),
            ),
            (
                CacheKey::get("https://example.com/index.html"),
                snapshot("https://example.com/index.html", b"index"),
            ),
        ];
        cache.put_all(batch).await.unwrap();

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.bytes_used().await, 9);
    }

    #[tokio::test]
    async fn test_quota_rejects_put() {
        let storage = CacheStorage::with_quota(10);
        let cache = storage.open("app-v1").await;

        cache
            .put(
                CacheKey::get("https://example.com/a"),
                snapshot("https://example.com/a", b"12345678"),
            )
            .await
            .unwrap();

        let err = cache
            .put(
                CacheKey::get("https://example.com/b"),
                snapshot("https://example.com/b", b"12345678"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, CacheError::QuotaExceeded { .. }));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_quota_allows_overwrite_in_place() {
        let storage = CacheStorage::with_quota(10);
        let cache = storage.open("app-v1").await;
        let key = CacheKey::get("https://example.com/a");

        cache
            .put(key.clone(), snapshot("https://example.com/a", b"12345678"))
            .await
            .unwrap();
        // Replacing the same key frees the old body first.
        cache
            .put(key.clone(), snapshot("https://example.com/a", b"abcdefghij"))
            .await
            .unwrap();

        assert_eq!(cache.bytes_used().await, 10);
    }

    #[tokio::test]
    async fn test_quota_rejects_oversized_batch_atomically() {
        let storage = CacheStorage::with_quota(6);
        let cache = storage.open("app-v1").await;

        let batch = vec![
            (
                CacheKey::get("https://example.com/a"),
                snapshot("https://example.com/a", b"1234"),
            ),
            (
                CacheKey::get("https://example.com/b"),
                snapshot("https://example.com/b", b"5678"),
            ),
        ];
        assert!(cache.put_all(batch).await.is_err());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_entry() {
        let storage = CacheStorage::new();
        let cache = storage.open("app-v1").await;
        let key = CacheKey::get("https://example.com/logo.png");

        cache
            .put(key.clone(), snapshot("https://example.com/logo.png", b"png"))
            .await
            .unwrap();
        assert!(cache.delete(&key).await);
        assert!(!cache.delete(&key).await);
        assert_eq!(cache.bytes_used().await, 0);
    }

    #[tokio::test]
    async fn test_storage_open_has_delete() {
        let storage = CacheStorage::new();
        assert!(!storage.has("app-v1").await);

        storage.open("app-v1").await;
        assert!(storage.has("app-v1").await);

        assert!(storage.delete("app-v1").await);
        assert!(!storage.delete("app-v1").await);
        assert!(!storage.has("app-v1").await);
    }

    #[tokio::test]
    async fn test_storage_keys() {
        let storage = CacheStorage::new();
        storage.open("app-v1").await;
        storage.open("app-runtime-v1").await;

        let mut keys = storage.keys().await;
        keys.sort();
        assert_eq!(keys, vec!["app-runtime-v1", "app-v1"]);
    }

    #[tokio::test]
    async fn test_open_returns_same_namespace() {
        let storage = CacheStorage::new();
        let a = storage.open("app-v1").await;
        let b = storage.open("app-v1").await;

        a.put(
            CacheKey::get("https://example.com/"),
            snapshot("https://example.com/", b"x"),
        )
        .await
        .unwrap();
        assert_eq!(b.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_puts_to_different_keys() {
        let storage = CacheStorage::new();
        let cache = storage.open("app-v1").await;

        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let url = format!("https://example.com/asset-{}", i);
                cache
                    .put(CacheKey::get(&url), snapshot(&url, b"data"))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.len().await, 16);
    }
}
