//! Per-session correlation hash
//!
//! Spans carry an opaque identifier derived from the current session
//! credential so operators can group requests by session without ever seeing
//! the credential. The hash is computed lazily, at most once per distinct
//! credential, and concurrent callers share one in-flight computation.
//! Changing the credential or logging out drops the memoized value.

use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::{Result, TelemetryError};

/// Number of hex characters kept from the SHA-256 digest
pub const CORRELATION_HASH_LEN: usize = 16;

/// Hash a credential into its correlation identifier
pub fn hash_credential(credential: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(credential.as_bytes());
    let digest = hasher.finalize();
    let mut encoded = hex::encode(digest);
    encoded.truncate(CORRELATION_HASH_LEN);
    encoded
}

#[derive(Default)]
struct SessionState {
    credential: Option<String>,
    hash: Option<Arc<OnceCell<String>>>,
}

/// Lifecycle-scoped session state owned by the telemetry pipeline
#[derive(Default)]
pub struct SessionContext {
    state: Mutex<SessionState>,
    computations: AtomicUsize,
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("has_credential", &self.has_credential())
            .field("hash_ready", &self.cached_hash().is_some())
            .finish()
    }
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, SessionState>> {
        self.state
            .lock()
            .map_err(|_| TelemetryError::Session("session state mutex poisoned".to_string()))
    }

    /// Install the credential for the current session. Setting a different
    /// credential discards the previous hash; setting the same one keeps it.
    pub fn set_credential(&self, credential: impl Into<String>) -> Result<()> {
        let credential = credential.into();
        let mut state = self.lock()?;

        if state.credential.as_deref() != Some(credential.as_str()) {
            state.credential = Some(credential);
            state.hash = None;
        }
        Ok(())
    }

    pub fn has_credential(&self) -> bool {
        self.lock().map(|state| state.credential.is_some()).unwrap_or(false)
    }

    /// Hash for the current credential if it has already been computed
    pub fn cached_hash(&self) -> Option<String> {
        let state = self.lock().ok()?;
        state.hash.as_ref().and_then(|cell| cell.get().cloned())
    }

    /// Number of hash computations started so far
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::Relaxed)
    }

    /// Hash for the current credential, computing it if needed.
    ///
    /// Callers arriving while a computation is in flight wait for that
    /// computation instead of starting another one.
    pub async fn correlation_hash(&self) -> Result<String> {
        let (credential, cell) = {
            let mut state = self.lock()?;
            let credential = state
                .credential
                .clone()
                .ok_or(TelemetryError::MissingCredential)?;
            let cell = Arc::clone(state.hash.get_or_insert_with(|| Arc::new(OnceCell::new())));
            (credential, cell)
        };

        let hash = cell
            .get_or_try_init(|| {
                self.computations.fetch_add(1, Ordering::Relaxed);
                compute_hash(credential)
            })
            .await?;

        Ok(hash.clone())
    }

    /// Start computing the hash in the background if it is not ready yet.
    ///
    /// Does nothing without a credential or outside a tokio runtime. Failures
    /// are logged and dropped.
    pub fn prefetch(self: &Arc<Self>) {
        if self.cached_hash().is_some() || !self.has_credential() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let session = Arc::clone(self);
        handle.spawn(async move {
            if let Err(err) = session.correlation_hash().await {
                debug!(error = %err, "Correlation hash unavailable");
            }
        });
    }

    /// Forget the credential and its hash
    pub fn on_logout(&self) {
        self.reset();
    }

    pub fn reset(&self) {
        if let Ok(mut state) = self.lock() {
            state.credential = None;
            state.hash = None;
        }
    }
}

async fn compute_hash(credential: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_credential(&credential))
        .await
        .map_err(|err| TelemetryError::Session(format!("hash task failed: {err}")))
}
