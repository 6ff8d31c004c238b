//! The offline worker: install, activate, and fetch interception.

use std::sync::Arc;

use bytes::Bytes;
use hashbrown::HashMap;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use tidekit_cache::{CacheHandle, CacheKey, CacheNames, CacheStorage, CachedResponse};
use tidekit_common::{Result, TidekitError};
use tidekit_net::{CacheMode, FetchBackend, FetchRequest, FetchResponse};
use tracing::{debug, info, warn};

use crate::clients::ClientRegistry;
use crate::config::WorkerConfig;
use crate::tasks::TaskSet;

/// Outcome of fetch interception.
#[derive(Debug)]
pub enum FetchDecision {
    /// Not intercepted; the request proceeds natively.
    Passthrough,
    /// Intercepted; this response goes to the page.
    Respond(FetchResponse),
}

/// One deployed version of the caching worker.
///
/// Holds explicit handles to its version's precache and runtime namespaces;
/// nothing is ambient. Lifecycle methods are one async call per host event,
/// the returned future standing in for the host's completion handle.
pub struct OfflineWorker {
    config: WorkerConfig,
    names: CacheNames,
    storage: Arc<CacheStorage>,
    backend: Arc<dyn FetchBackend>,
    precache: CacheHandle,
    runtime: CacheHandle,
    clients: Arc<ClientRegistry>,
    tasks: TaskSet,
}

impl OfflineWorker {
    /// Build a worker for one deployed version, opening (creating if
    /// absent) the version's two namespaces.
    pub async fn new(
        config: WorkerConfig,
        storage: Arc<CacheStorage>,
        backend: Arc<dyn FetchBackend>,
    ) -> Self {
        let names = config.cache_names();
        let precache = storage.open(&names.precache).await;
        let runtime = storage.open(&names.runtime).await;

        Self {
            config,
            names,
            storage,
            backend,
            precache,
            runtime,
            clients: Arc::new(ClientRegistry::new()),
            tasks: TaskSet::new(),
        }
    }

    /// Worker configuration.
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Version tag.
    pub fn version(&self) -> &str {
        &self.config.version
    }

    /// Cache namespace names owned by this version.
    pub fn names(&self) -> &CacheNames {
        &self.names
    }

    /// Open pages under this worker's origin.
    pub fn clients(&self) -> &Arc<ClientRegistry> {
        &self.clients
    }

    /// Install: fetch the precache manifest and commit it in one step.
    ///
    /// Every manifest fetch bypasses intermediate HTTP caches and must
    /// return status 200. Responses are staged until the last one
    /// succeeds, then committed as a single batch, so a failure part-way
    /// through commits nothing and the version does not activate.
    pub async fn on_install(&self) -> Result<()> {
        info!(version = %self.config.version, "Installing");

        let mut staged = Vec::with_capacity(self.config.precache_manifest.len());
        for path in &self.config.precache_manifest {
            let url = self.config.manifest_url(path)?;
            let request = FetchRequest::get(url.clone()).cache_mode(CacheMode::Reload);

            let response = self.backend.fetch(&request).await.map_err(|e| {
                TidekitError::install(format!("precache fetch for '{}' failed: {}", path, e))
            })?;
            if response.status != StatusCode::OK {
                return Err(TidekitError::install(format!(
                    "precache fetch for '{}' returned {}",
                    path, response.status
                )));
            }

            staged.push((CacheKey::get(url.as_str()), snapshot(&response)));
        }

        let count = staged.len();
        self.precache.put_all(staged).await?;
        info!(version = %self.config.version, count, cache = %self.names.precache, "Precache committed");
        Ok(())
    }

    /// Activate: sweep namespaces of older generations, then claim every
    /// open page so interception starts without a reload.
    pub async fn on_activate(&self) -> Result<()> {
        info!(version = %self.config.version, "Activating");

        for name in self.storage.keys().await {
            if self.names.owns(&name) {
                continue;
            }
            if self.storage.delete(&name).await {
                debug!(cache = %name, "Removed stale cache");
            } else {
                // Leave it for the next activation to retry.
                warn!(cache = %name, "Could not remove stale cache");
            }
        }

        let claimed = self.clients.claim().await;
        debug!(version = %self.config.version, claimed, "Activation complete");
        Ok(())
    }

    /// Fetch interception: network first, cache fallback.
    ///
    /// Requests that fail the filter stage pass through untouched. A live
    /// 200 response is snapshotted into the runtime cache by a detached
    /// task and returned without waiting for the write. When the network
    /// is down, the runtime cache is tried by exact request identity,
    /// then this version's namespaces by URL alone; if nothing matches,
    /// the original network error surfaces.
    pub async fn on_fetch(&self, request: FetchRequest) -> Result<FetchDecision> {
        if !self.config.should_intercept(&request.method, &request.url) {
            return Ok(FetchDecision::Passthrough);
        }

        match self.backend.fetch(&request).await {
            Ok(response) => {
                if response.status == StatusCode::OK {
                    // Snapshot before the body is handed to the page.
                    let entry = snapshot(&response);
                    let key = CacheKey::get(request.url.as_str());
                    let runtime = self.runtime.clone();
                    self.tasks
                        .spawn(async move {
                            if let Err(e) = runtime.put(key, entry).await {
                                warn!(error = %e, "Runtime cache write failed");
                            }
                        })
                        .await;
                }
                Ok(FetchDecision::Respond(response))
            }
            Err(err) => {
                debug!(url = %request.url, error = %err, "Network unavailable, trying cache");

                let key = CacheKey::new(request.method.as_str(), request.url.as_str());
                if let Some(entry) = self.runtime.match_request(&key).await {
                    return Ok(FetchDecision::Respond(revive(entry, &request)));
                }
                if let Some(entry) = self.precache.match_url(request.url.as_str()).await {
                    return Ok(FetchDecision::Respond(revive(entry, &request)));
                }
                if let Some(entry) = self.runtime.match_url(request.url.as_str()).await {
                    return Ok(FetchDecision::Respond(revive(entry, &request)));
                }

                Err(err.into())
            }
        }
    }

    /// Await completion of pending background cache writes.
    ///
    /// Delivery never waits on these; this is the deterministic join
    /// point for tests and shutdown.
    pub async fn wait_idle(&self) {
        self.tasks.wait_idle().await;
    }
}

/// Copy a live response into a stored snapshot.
fn snapshot(response: &FetchResponse) -> CachedResponse {
    let mut headers = HashMap::new();
    for (name, value) in response.headers.iter() {
        if let Ok(v) = value.to_str() {
            headers.insert(name.as_str().to_string(), v.to_string());
        }
    }
    CachedResponse::new(
        response.url.as_str(),
        response.status.as_u16(),
        headers,
        response.body.to_vec(),
    )
}

/// Rebuild a response from a stored snapshot.
fn revive(entry: CachedResponse, request: &FetchRequest) -> FetchResponse {
    let mut headers = HeaderMap::new();
    for (name, value) in &entry.headers {
        if let (Ok(n), Ok(v)) = (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            headers.insert(n, v);
        }
    }

    FetchResponse {
        request_id: request.id,
        url: request.url.clone(),
        status: StatusCode::from_u16(entry.status).unwrap_or(StatusCode::OK),
        headers,
        body: Bytes::from(entry.body),
    }
}
