//! # Tidekit SW
//!
//! Offline-first caching worker for static sites.
//!
//! The worker intercepts GET traffic for its origin, applies a network-first
//! strategy with cache fallback, and manages versioned cache generations
//! across deployments: a precache filled once at install, a runtime cache
//! filled opportunistically at fetch time, and a sweep that removes every
//! namespace belonging to older versions when a new version activates.
//!
//! ## Architecture
//!
//! ```text
//! Registration
//!     ├── waiting (OfflineWorker)      ── on_install ──→ precache
//!     └── active  (OfflineWorker)
//!             ├── on_activate  ──→ generation sweep + client claim
//!             └── on_fetch     ──→ network first
//!                                      │ 200 → detached runtime-cache write
//!                                      └ down → runtime match, precache match
//! ```
//!
//! Lifecycle events are explicit async methods; the returned future is the
//! completion handle the host awaits. Cache namespaces are explicit handles
//! owned by the worker, never ambient globals.

pub mod clients;
pub mod config;
pub mod registration;
pub mod tasks;
pub mod worker;

pub use clients::{Client, ClientRegistry};
pub use config::WorkerConfig;
pub use registration::{Registration, RegistrationEvent, WorkerState};
pub use tasks::TaskSet;
pub use worker::{FetchDecision, OfflineWorker};
