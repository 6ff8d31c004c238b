//! Cache keys and stored response snapshots.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// Request identity a snapshot is stored under.
///
/// Exact matching uses method plus URL; URL-only matching ignores the
/// method (see [`crate::CacheHandle::match_url`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Request method (uppercase).
    pub method: String,
    /// Full request URL.
    pub url: String,
}

impl CacheKey {
    /// Create a key from a method and URL.
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
        }
    }

    /// Create a GET key for a URL.
    pub fn get(url: &str) -> Self {
        Self::new("GET", url)
    }
}

/// An immutable stored copy of a full HTTP response.
///
/// Never mutated after insertion; a re-fetch overwrites the prior snapshot
/// under the same key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// URL the response was fetched from.
    pub url: String,
    /// Response status code.
    pub status: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: Vec<u8>,
    /// Stored-at timestamp (ms since epoch).
    pub stored_at: u64,
}

impl CachedResponse {
    /// Create a snapshot, stamped with the current time.
    pub fn new(url: &str, status: u16, headers: HashMap<String, String>, body: Vec<u8>) -> Self {
        Self {
            url: url.to_string(),
            status,
            headers,
            body,
            stored_at: now_millis(),
        }
    }

    /// Body size in bytes, for quota accounting.
    pub fn body_len(&self) -> u64 {
        self.body.len() as u64
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_method_is_normalized() {
        let key = CacheKey::new("get", "https://example.com/");
        assert_eq!(key.method, "GET");
        assert_eq!(key, CacheKey::get("https://example.com/"));
    }

    #[test]
    fn test_keys_differ_by_method() {
        let get = CacheKey::get("https://example.com/api");
        let head = CacheKey::new("HEAD", "https://example.com/api");
        assert_ne!(get, head);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "text/html".to_string());

        let snapshot = CachedResponse::new(
            "https://example.com/index.html",
            200,
            headers,
            b"<html></html>".to_vec(),
        );

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: CachedResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
        assert_eq!(back.body_len(), 13);
    }
}
