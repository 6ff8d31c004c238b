//! # Tidekit Cache
//!
//! Versioned cache namespaces for the tidekit offline caching engine.
//!
//! ## Features
//!
//! - **Cache naming**: version-tagged precache/runtime namespace names
//! - **Response snapshots**: immutable stored copies of HTTP responses
//! - **Namespace stores**: `put`, `match`, `delete`, bulk commit
//! - **Storage root**: open-or-create, enumerate, delete namespaces
//!
//! ## Architecture
//!
//! ```text
//! CacheStorage
//!     │
//!     ├── CacheHandle ("app-v2")          ← precache
//!     │       └── CacheKey → CachedResponse
//!     │
//!     └── CacheHandle ("app-runtime-v2")  ← runtime cache
//!             └── CacheKey → CachedResponse
//! ```
//!
//! A [`CacheHandle`] is a clonable reference to one namespace; individual
//! put/match operations serialize through the namespace lock, so concurrent
//! writers to the same key are last-write-wins and writers to different keys
//! never conflict.

use thiserror::Error;
use tidekit_common::TidekitError;

mod entry;
mod names;
mod store;

pub use entry::{CacheKey, CachedResponse};
pub use names::CacheNames;
pub use store::{CacheHandle, CacheStorage};

/// Cache storage errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// A write would exceed the namespace byte quota.
    #[error("Quota exceeded in cache '{cache}': {needed} bytes needed, {remaining} available")]
    QuotaExceeded {
        cache: String,
        needed: u64,
        remaining: u64,
    },
}

impl From<CacheError> for TidekitError {
    fn from(err: CacheError) -> Self {
        TidekitError::Cache(err.to_string())
    }
}
