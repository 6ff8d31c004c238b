//! Registration lifecycle across deployed versions.
//!
//! The host drives one [`Registration`] per origin. A new version installs,
//! then (skip-waiting) activates immediately, retiring whichever version was
//! controlling the pages before. A failed install marks the new version
//! redundant and leaves the previous version in control.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tidekit_common::{retry_with_backoff, Result, RetryConfig};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::worker::{FetchDecision, OfflineWorker};
use tidekit_net::FetchRequest;

/// Lifecycle state of one worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerState {
    /// Initial state.
    Parsed,
    /// Install event in flight.
    Installing,
    /// Installed, not yet activated.
    Installed,
    /// Activate event in flight.
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Replaced, or install failed.
    Redundant,
}

impl Default for WorkerState {
    fn default() -> Self {
        Self::Parsed
    }
}

/// Observable lifecycle events.
#[derive(Debug, Clone)]
pub enum RegistrationEvent {
    /// A new version began installing.
    UpdateFound { version: String },
    /// A version changed state.
    StateChange {
        version: String,
        state: WorkerState,
    },
    /// A different version took control of the pages.
    ControllerChange { version: String },
}

struct VersionSlot {
    worker: Arc<OfflineWorker>,
    state: WorkerState,
}

/// Registration for one origin: at most one waiting and one active version.
pub struct Registration {
    waiting: Option<VersionSlot>,
    active: Option<VersionSlot>,
    retry: RetryConfig,
    event_tx: mpsc::UnboundedSender<RegistrationEvent>,
}

impl Registration {
    /// Create a registration and the receiving end of its event stream.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RegistrationEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                waiting: None,
                active: None,
                retry: RetryConfig::default(),
                event_tx,
            },
            event_rx,
        )
    }

    /// Override the install retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Install a new version.
    ///
    /// The install itself is all-or-nothing inside the worker; here it is
    /// additionally retried per the registration's retry policy, which is
    /// the host-level retry the worker deliberately does not implement. On
    /// success the version activates immediately (skip-waiting). On
    /// failure it becomes redundant and any previously active version
    /// stays in control.
    pub async fn install_version(&mut self, worker: Arc<OfflineWorker>) -> Result<()> {
        let version = worker.version().to_string();
        self.emit(RegistrationEvent::UpdateFound {
            version: version.clone(),
        });

        let mut slot = VersionSlot {
            worker: worker.clone(),
            state: WorkerState::Parsed,
        };
        self.set_state(&mut slot, WorkerState::Installing);

        let installed = retry_with_backoff(&self.retry, || {
            let worker = worker.clone();
            async move { worker.on_install().await }
        })
        .await;

        match installed {
            Ok(()) => {
                self.set_state(&mut slot, WorkerState::Installed);
                self.waiting = Some(slot);
                // The install path always requests immediate activation.
                self.activate_waiting().await
            }
            Err(e) => {
                warn!(version = %version, error = %e, "Install failed, version is redundant");
                self.set_state(&mut slot, WorkerState::Redundant);
                Err(e)
            }
        }
    }

    /// Promote the waiting version: run its activate event and retire the
    /// previously active one.
    pub async fn activate_waiting(&mut self) -> Result<()> {
        let Some(mut slot) = self.waiting.take() else {
            return Ok(());
        };
        let version = slot.worker.version().to_string();

        self.set_state(&mut slot, WorkerState::Activating);
        if let Err(e) = slot.worker.on_activate().await {
            warn!(version = %version, error = %e, "Activation failed");
            self.set_state(&mut slot, WorkerState::Redundant);
            return Err(e);
        }
        self.set_state(&mut slot, WorkerState::Activated);

        if let Some(mut old) = self.active.take() {
            self.set_state(&mut old, WorkerState::Redundant);
        }
        self.active = Some(slot);
        self.emit(RegistrationEvent::ControllerChange {
            version: version.clone(),
        });
        info!(version = %version, "Version is now controlling");
        Ok(())
    }

    /// Version tag of the controlling worker, if any.
    pub fn active_version(&self) -> Option<&str> {
        self.active.as_ref().map(|slot| slot.worker.version())
    }

    /// The controlling worker, if any.
    pub fn active_worker(&self) -> Option<Arc<OfflineWorker>> {
        self.active.as_ref().map(|slot| slot.worker.clone())
    }

    /// State of the controlling worker, if any.
    pub fn active_state(&self) -> Option<WorkerState> {
        self.active.as_ref().map(|slot| slot.state)
    }

    /// Route a fetch through the controlling worker's interceptor.
    ///
    /// With no controlling worker the request passes through natively,
    /// exactly as an uncontrolled page would behave.
    pub async fn handle_fetch(&self, request: FetchRequest) -> Result<FetchDecision> {
        match &self.active {
            Some(slot) => slot.worker.on_fetch(request).await,
            None => Ok(FetchDecision::Passthrough),
        }
    }

    fn set_state(&self, slot: &mut VersionSlot, state: WorkerState) {
        slot.state = state;
        self.emit(RegistrationEvent::StateChange {
            version: slot.worker.version().to_string(),
            state,
        });
    }

    fn emit(&self, event: RegistrationEvent) {
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use crate::testutil::{init_test_logging, MockBackend};
    use std::time::Duration;
    use tidekit_cache::CacheStorage;
    use url::Url;

    fn test_config(version: &str) -> WorkerConfig {
        WorkerConfig {
            app_name: "site".to_string(),
            version: version.to_string(),
            origin: Url::parse("https://site.test").unwrap(),
            precache_manifest: vec!["/index.html".to_string()],
            ..Default::default()
        }
    }

    async fn routed_backend() -> Arc<MockBackend> {
        let backend = Arc::new(MockBackend::new());
        backend
            .route("https://site.test/index.html", 200, b"<html>index</html>")
            .await;
        backend
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_install_promotes_to_active() {
        init_test_logging();
        let storage = Arc::new(CacheStorage::new());
        let backend = routed_backend().await;
        let (mut registration, mut events) = Registration::new();

        let worker = Arc::new(
            OfflineWorker::new(test_config("v1"), storage.clone(), backend.clone()).await,
        );
        registration.install_version(worker).await.unwrap();

        assert_eq!(registration.active_version(), Some("v1"));
        assert_eq!(registration.active_state(), Some(WorkerState::Activated));

        let mut saw_update_found = false;
        let mut saw_controller_change = false;
        while let Ok(event) = events.try_recv() {
            match event {
                RegistrationEvent::UpdateFound { version } => {
                    assert_eq!(version, "v1");
                    saw_update_found = true;
                }
                RegistrationEvent::ControllerChange { version } => {
                    assert_eq!(version, "v1");
                    saw_controller_change = true;
                }
                RegistrationEvent::StateChange { .. } => {}
            }
        }
        assert!(saw_update_found);
        assert!(saw_controller_change);
    }

    #[tokio::test]
    async fn test_failed_install_keeps_previous_version_active() {
        init_test_logging();
        let storage = Arc::new(CacheStorage::new());
        let backend = routed_backend().await;
        let (mut registration, mut events) = Registration::new();
        registration = registration.with_retry(RetryConfig::none());

        let v1 = Arc::new(
            OfflineWorker::new(test_config("v1"), storage.clone(), backend.clone()).await,
        );
        registration.install_version(v1).await.unwrap();

        // v2's manifest points at a path the server does not have.
        let mut v2_config = test_config("v2");
        v2_config.precache_manifest = vec!["/missing.html".to_string()];
        let v2 = Arc::new(
            OfflineWorker::new(v2_config, storage.clone(), backend.clone()).await,
        );

        assert!(registration.install_version(v2).await.is_err());
        assert_eq!(registration.active_version(), Some("v1"));

        let redundant = {
            let mut found = false;
            while let Ok(event) = events.try_recv() {
                if let RegistrationEvent::StateChange { version, state } = event {
                    if version == "v2" && state == WorkerState::Redundant {
                        found = true;
                    }
                }
            }
            found
        };
        assert!(redundant);
    }

    #[tokio::test]
    async fn test_new_version_reaps_old_generation() {
        init_test_logging();
        let storage = Arc::new(CacheStorage::new());
        let backend = routed_backend().await;
        let (mut registration, _events) = Registration::new();

        let v1 = Arc::new(
            OfflineWorker::new(test_config("v1"), storage.clone(), backend.clone()).await,
        );
        registration.install_version(v1).await.unwrap();

        let v2 = Arc::new(
            OfflineWorker::new(test_config("v2"), storage.clone(), backend.clone()).await,
        );
        registration.install_version(v2).await.unwrap();

        assert_eq!(registration.active_version(), Some("v2"));

        let mut keys = storage.keys().await;
        keys.sort();
        assert_eq!(keys, vec!["site-runtime-v2", "site-v2"]);
    }

    #[tokio::test]
    async fn test_install_retries_transient_failures() {
        init_test_logging();
        let storage = Arc::new(CacheStorage::new());
        let backend = routed_backend().await;
        backend.fail_next(2);

        let (mut registration, _events) = Registration::new();
        registration = registration.with_retry(fast_retry());

        let worker = Arc::new(
            OfflineWorker::new(test_config("v1"), storage.clone(), backend.clone()).await,
        );
        registration.install_version(worker).await.unwrap();

        assert_eq!(registration.active_version(), Some("v1"));
    }

    #[tokio::test]
    async fn test_handle_fetch_without_active_version_is_passthrough() {
        let (registration, _events) = Registration::new();
        let request = FetchRequest::get(Url::parse("https://site.test/index.html").unwrap());

        let decision = registration.handle_fetch(request).await.unwrap();
        assert!(matches!(decision, FetchDecision::Passthrough));
    }

    #[tokio::test]
    async fn test_handle_fetch_routes_through_active_worker() {
        init_test_logging();
        let storage = Arc::new(CacheStorage::new());
        let backend = routed_backend().await;
        let (mut registration, _events) = Registration::new();

        let worker = Arc::new(
            OfflineWorker::new(test_config("v1"), storage.clone(), backend.clone()).await,
        );
        registration.install_version(worker).await.unwrap();

        let request = FetchRequest::get(Url::parse("https://site.test/index.html").unwrap());
        let decision = registration.handle_fetch(request).await.unwrap();
        assert!(matches!(decision, FetchDecision::Respond(_)));
    }
}
