//! Worker configuration.

use http::Method;
use serde::{Deserialize, Serialize};
use tidekit_cache::CacheNames;
use tidekit_common::{Result, TidekitError};
use url::Url;

/// Configuration for one deployed version of the worker.
///
/// In the deployed artifact these are fixed per release: bumping `version`
/// is what invalidates every previously stored entry on the next
/// activation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Application name, the prefix of both cache namespace names.
    pub app_name: String,

    /// Version tag; changes on each deployment.
    pub version: String,

    /// Origin the worker controls.
    pub origin: Url,

    /// Path prefix for deployments under a subdirectory ("" for the root).
    pub base_path: String,

    /// Application-relative paths fetched into the precache at install.
    pub precache_manifest: Vec<String>,

    /// Cross-origin hosts whose requests are still intercepted
    /// (host-name substrings).
    pub allowed_hosts: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            app_name: "tidekit".to_string(),
            version: "v1".to_string(),
            origin: Url::parse("http://localhost").expect("static origin URL"),
            base_path: String::new(),
            precache_manifest: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/style.css".to_string(),
                "/manifest.json".to_string(),
                "/logo.png".to_string(),
                "/404.html".to_string(),
            ],
            allowed_hosts: vec![
                "fonts.googleapis.com".to_string(),
                "fonts.gstatic.com".to_string(),
                "cdnjs.cloudflare.com".to_string(),
            ],
        }
    }
}

impl WorkerConfig {
    /// The cache namespace names owned by this version.
    pub fn cache_names(&self) -> CacheNames {
        CacheNames::derive(&self.app_name, &self.version)
    }

    /// Resolve a manifest path against the origin and base path prefix.
    pub fn manifest_url(&self, path: &str) -> Result<Url> {
        let full = format!("{}{}", self.base_path, path);
        self.origin
            .join(&full)
            .map_err(|e| TidekitError::config(format!("bad manifest path '{}': {}", path, e)))
    }

    /// Filter stage: whether a request is intercepted at all.
    ///
    /// Only GET requests to the controlled origin, or to an allow-listed
    /// cross-origin host, are intercepted; everything else proceeds
    /// natively.
    pub fn should_intercept(&self, method: &Method, url: &Url) -> bool {
        if *method != Method::GET {
            return false;
        }
        self.same_origin(url) || self.host_allowed(url)
    }

    fn same_origin(&self, url: &Url) -> bool {
        url.origin() == self.origin.origin()
    }

    fn host_allowed(&self, url: &Url) -> bool {
        url.host_str()
            .map(|host| {
                self.allowed_hosts
                    .iter()
                    .any(|allowed| host.contains(allowed.as_str()))
            })
            .unwrap_or(false)
    }
}
