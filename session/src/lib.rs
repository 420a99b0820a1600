//! Recognition session: person registry, group bootstrap, and the polling
//! loop that keeps the detected-faces view current.
//!
//! A [`Session`] is created once and cloned into the poller and into every
//! command handler. All clones share one [`SessionState`] behind a mutex that
//! is only held for short synchronous sections, never across an `.await`.
//! After every mutation a fresh [`SessionSnapshot`] is published to
//! subscribers.

mod bootstrap;
mod poller;
mod reconcile;
mod registry;
mod state;

pub use bootstrap::BootstrapOutcome;
pub use poller::{CycleOutcome, PollerHandle};
pub use reconcile::{reconcile, Reconciled, NEEDS_RETRAINING};
pub use state::{ErrorFlags, SessionSnapshot, SessionState, SnapshotPerson};

use api_client::{ApiClientError, RecognitionService};
use capture::{CaptureError, CaptureSource};
use settings::{generate_group_id, is_usable_key, SettingsError, SettingsStore};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No person at index {0}")]
    NoSuchPerson(usize),
    #[error("No person selected")]
    NoneSelected,
    #[error(transparent)]
    ServiceError(#[from] ApiClientError),
    #[error("Capture Error: {0}")]
    CaptureError(#[from] CaptureError),
    #[error("Settings Error: {0}")]
    SettingsError(#[from] SettingsError),
}

#[derive(Clone)]
pub struct Session {
    state: Arc<Mutex<SessionState>>,
    service: Arc<dyn RecognitionService>,
    settings: Arc<dyn SettingsStore>,
    capture: Arc<dyn CaptureSource>,
    snapshots: Arc<watch::Sender<SessionSnapshot>>,
}

impl Session {
    /// Build a session from the persisted settings. A group id that was never
    /// persisted is freshly generated; it is only saved once bootstrap has
    /// confirmed the group exists remotely.
    pub fn new(
        service: Arc<dyn RecognitionService>,
        settings: Arc<dyn SettingsStore>,
        capture: Arc<dyn CaptureSource>,
    ) -> Result<Self, SessionError> {
        let stored = settings.load()?;
        let group_id = stored.group_id.unwrap_or_else(generate_group_id);
        service.set_key(&stored.api_key);

        let state = SessionState::new(stored.api_key, group_id);
        let (tx, _rx) = watch::channel(state.snapshot());
        Ok(Session {
            state: Arc::new(Mutex::new(state)),
            service,
            settings,
            capture,
            snapshots: Arc::new(tx),
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().snapshot()
    }

    pub fn group_id(&self) -> String {
        self.lock().group_id.clone()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` against the shared state and publish the result while still
    /// holding the lock, so observers never see a half-applied change.
    fn with_state<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut state = self.lock();
        let result = f(&mut state);
        self.snapshots.send_replace(state.snapshot());
        result
    }

    /// Raise or clear `no_key` from the current key.
    fn check_key(&self) -> bool {
        self.with_state(|s| {
            let usable = is_usable_key(&s.api_key);
            s.errors.no_key = !usable;
            usable
        })
    }

    fn persist_group_id(&self, group_id: &str) {
        if let Err(e) = self.settings.set_group_id(group_id) {
            tracing::error!(error = %e, group_id, "Failed to persist group id");
        }
    }
}
