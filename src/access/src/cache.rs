//! Session-scoped permission cache with single-flight population
//!
//! The cache starts empty and uninitialized. The first caller of
//! [`PermissionCache::ensure_populated`] starts one fetch; every concurrent or
//! later caller awaits that same attempt until [`PermissionCache::clear`]
//! discards it. A successful fetch replaces the whole state at once; a failed
//! one leaves the state untouched.
//!
//! An attempt that is still running when the cache is cleared settles as
//! [`AccessError::Superseded`]. Waiters on it rejoin whatever attempt belongs
//! to the current session instead of treating it as a failure.

use crate::api::ConsoleApi;
use crate::error::{AccessError, Result};
use crate::session::{self, SessionStore};
use crate::types::PermissionSet;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Cached permissions for the current session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionState {
    /// Set once a fetch succeeded; all queries deny while false
    pub initialized: bool,

    pub permissions: PermissionSet,
}

impl PermissionState {
    /// State holding a freshly fetched permission set
    pub fn loaded(permissions: PermissionSet) -> Self {
        Self {
            initialized: true,
            permissions,
        }
    }
}

/// Settled result of a populate attempt, shared by every waiter
pub type PopulateOutcome = std::result::Result<(), Arc<AccessError>>;

type Flight = Shared<BoxFuture<'static, PopulateOutcome>>;

#[derive(Default)]
struct CacheInner {
    state: RwLock<PermissionState>,
    /// Bumped on every clear so a fetch started before it cannot commit
    generation: AtomicU64,
    flight: Mutex<Option<Flight>>,
}

impl CacheInner {
    fn clear(&self) {
        {
            let mut state = self.state.write();
            self.generation.fetch_add(1, Ordering::SeqCst);
            *state = PermissionState::default();
        }
        self.flight.lock().take();
        debug!("Permission cache cleared");
    }
}

/// Cloneable handle that clears a [`PermissionCache`] from elsewhere
///
/// Installed on the API client so a 401 drops cached permissions together
/// with the session.
#[derive(Clone)]
pub struct CacheInvalidator {
    inner: Arc<CacheInner>,
}

impl CacheInvalidator {
    pub fn invalidate(&self) {
        self.inner.clear();
    }
}

/// Permission cache bound to one session store and API
pub struct PermissionCache {
    inner: Arc<CacheInner>,
    session: Arc<dyn SessionStore>,
    api: Arc<dyn ConsoleApi>,
}

impl PermissionCache {
    /// Create an empty, uninitialized cache
    pub fn new(session: Arc<dyn SessionStore>, api: Arc<dyn ConsoleApi>) -> Self {
        Self {
            inner: Arc::new(CacheInner::default()),
            session,
            api,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.state.read().initialized
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> PermissionState {
        self.inner.state.read().clone()
    }

    /// Run `f` against the current state under a read lock
    pub fn read<R>(&self, f: impl FnOnce(&PermissionState) -> R) -> R {
        f(&self.inner.state.read())
    }

    /// Whether a populate attempt has started and not yet settled
    pub fn is_populating(&self) -> bool {
        self.inner
            .flight
            .lock()
            .as_ref()
            .map(|flight| flight.peek().is_none())
            .unwrap_or(false)
    }

    /// Handle for clearing this cache without borrowing it
    pub fn invalidator(&self) -> CacheInvalidator {
        CacheInvalidator {
            inner: self.inner.clone(),
        }
    }

    /// Make one populate attempt, bypassing the single-flight slot
    pub async fn populate(&self) -> Result<()> {
        let generation = self.inner.generation.load(Ordering::SeqCst);
        run_populate(
            self.inner.clone(),
            self.session.clone(),
            self.api.clone(),
            generation,
        )
        .await
    }

    /// Populate unless already initialized, joining any attempt in flight
    ///
    /// A settled failure is returned to every later caller until [`clear`]
    /// is called; it is not retried. An attempt superseded by [`clear`] is
    /// never returned: the caller moves on to the current session's attempt.
    ///
    /// [`clear`]: PermissionCache::clear
    pub async fn ensure_populated(&self) -> PopulateOutcome {
        loop {
            if self.is_initialized() {
                return Ok(());
            }

            let outcome = self.current_flight().await;
            match &outcome {
                Err(e) if matches!(e.as_ref(), AccessError::Superseded) => {
                    debug!("Permission fetch superseded, joining the current session's fetch");
                }
                _ => return outcome,
            }
        }
    }

    /// Replace the whole permission set and mark the cache initialized
    pub fn replace(&self, permissions: PermissionSet) {
        *self.inner.state.write() = PermissionState::loaded(permissions);
    }

    /// Drop cached permissions and any settled or in-flight attempt
    pub fn clear(&self) {
        self.inner.clear();
    }

    fn current_flight(&self) -> Flight {
        let mut slot = self.inner.flight.lock();
        match slot.as_ref() {
            Some(flight) => {
                debug!("Joining permission fetch already in flight");
                flight.clone()
            }
            None => {
                let flight = self.start_flight();
                *slot = Some(flight.clone());
                flight
            }
        }
    }

    fn start_flight(&self) -> Flight {
        let inner = self.inner.clone();
        let session = self.session.clone();
        let api = self.api.clone();
        let generation = inner.generation.load(Ordering::SeqCst);

        async move {
            run_populate(inner, session, api, generation)
                .await
                .map_err(Arc::new)
        }
        .boxed()
        .shared()
    }
}

async fn run_populate(
    inner: Arc<CacheInner>,
    session: Arc<dyn SessionStore>,
    api: Arc<dyn ConsoleApi>,
    generation: u64,
) -> Result<()> {
    let Some(identity) = session::read_identity(session.as_ref()) else {
        error!("No user identity in session, cannot load permissions");
        return Err(AccessError::NoUserIdentity);
    };

    let Some(token) = session::read_token(session.as_ref()) else {
        error!("No session token, cannot load permissions");
        return Err(AccessError::NoSessionToken);
    };

    let fetched = api.fetch_permissions(&token).await;

    // A 401 that emptied the session is this attempt's own, even though the
    // interceptor cleared the cache underneath it
    if matches!(fetched, Err(AccessError::Unauthorized))
        && session::read_token(session.as_ref()).is_none()
    {
        error!("Permission fetch rejected with 401 for {}", identity.user_id);
        return Err(AccessError::Unauthorized);
    }

    let mut state = inner.state.write();
    if inner.generation.load(Ordering::SeqCst) != generation {
        warn!("Session changed while permissions were loading, discarding result");
        return Err(AccessError::Superseded);
    }

    let permissions = match fetched {
        Ok(permissions) => permissions,
        Err(AccessError::Unauthorized) => {
            error!("Permission fetch rejected with 401 for {}", identity.user_id);
            return Err(AccessError::Unauthorized);
        }
        Err(AccessError::PermissionFetchFailed(reason)) => {
            error!("Permission fetch failed for {}: {}", identity.user_id, reason);
            return Err(AccessError::PermissionFetchFailed(reason));
        }
        Err(e) => {
            error!("Permission fetch failed for {}: {}", identity.user_id, e);
            return Err(AccessError::PermissionFetchFailed(e.to_string()));
        }
    };

    info!(
        "Loaded permissions for {}: {} menus, {} modules",
        identity.display_name(),
        permissions.menu.len(),
        permissions.function.len()
    );
    *state = PermissionState::loaded(permissions);

    Ok(())
}
