//! # Tidekit Net
//!
//! Request/response model and fetch backend for the tidekit offline caching
//! engine.
//!
//! ## Design Goals
//!
//! 1. **Async fetch**: non-blocking network requests
//! 2. **Backend seam**: [`FetchBackend`] trait so the worker engine can be
//!    driven against a real HTTP client or a scripted test double
//! 3. **Cache bypass**: a reload directive that skips intermediate HTTP
//!    caches, for install-time precaching

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use thiserror::Error;
use tidekit_common::TidekitError;
use tracing::{debug, trace};
use url::Url;

/// Errors that can occur at the network level.
///
/// HTTP error statuses are not errors here; they come back as a
/// [`FetchResponse`] with the status set. An `Err` from a backend always
/// means the network itself failed.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Request failed: {0}")]
    RequestFailed(String),
}

impl From<NetError> for TidekitError {
    fn from(err: NetError) -> Self {
        TidekitError::Network(err.to_string())
    }
}

/// Unique identifier for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// How the request interacts with intermediate HTTP caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Normal HTTP caching semantics.
    #[default]
    Default,
    /// Bypass intermediate caches and force a true network fetch.
    Reload,
}

/// An outgoing request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub id: RequestId,
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub cache_mode: CacheMode,
}

impl FetchRequest {
    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self {
            id: RequestId::new(),
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            cache_mode: CacheMode::Default,
        }
    }

    /// Create a request with an explicit method.
    pub fn with_method(method: Method, url: Url) -> Self {
        Self {
            method,
            ..Self::get(url)
        }
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the cache mode.
    pub fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }
}

/// A fetched response.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub request_id: RequestId,
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FetchResponse {
    /// Check if the response is a success (2xx).
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Get a header value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Get the body as text.
    pub fn text(&self) -> Result<String, std::string::FromUtf8Error> {
        String::from_utf8(self.body.to_vec())
    }
}

/// The seam between the worker engine and the network.
#[async_trait]
pub trait FetchBackend: Send + Sync {
    /// Issue a request to the network.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, NetError>;
}

/// HTTP backend configuration.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// User agent string.
    pub user_agent: String,
    /// Default request timeout.
    pub timeout: Duration,
    /// Maximum number of redirects to follow.
    pub max_redirects: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            user_agent: "Tidekit/1.0".to_string(),
            timeout: Duration::from_secs(30),
            max_redirects: 10,
        }
    }
}

/// Fetch backend over a real HTTP client.
pub struct HttpBackend {
    client: reqwest::Client,
}

impl HttpBackend {
    /// Create a backend with default configuration.
    pub fn new() -> Result<Self, NetError> {
        Self::with_config(BackendConfig::default())
    }

    /// Create a backend with custom configuration.
    pub fn with_config(config: BackendConfig) -> Result<Self, NetError> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl FetchBackend for HttpBackend {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, NetError> {
        debug!(id = request.id.raw(), method = %request.method, url = %request.url, "Fetching");

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());

        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }

        if request.cache_mode == CacheMode::Reload {
            builder = builder.header("Cache-Control", "no-cache");
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await.map_err(map_reqwest_error)?;

        trace!(
            id = request.id.raw(),
            status = %status,
            body_len = body.len(),
            "Response received"
        );

        Ok(FetchResponse {
            request_id: request.id,
            url,
            status,
            headers,
            body,
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> NetError {
    if err.is_timeout() {
        NetError::Timeout
    } else if err.is_connect() {
        NetError::ConnectionFailed(err.to_string())
    } else {
        NetError::RequestFailed(err.to_string())
    }
}
