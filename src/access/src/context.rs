//! Per-session access context
//!
//! Bundles the session store, API client, permission cache, and notifier.
//! The router and every screen receive an `Arc<AccessContext>`; two contexts
//! never share state, so sessions can be simulated side by side.

use crate::api::{ConsoleApi, LoginGrant};
use crate::cache::{PermissionCache, PermissionState, PopulateOutcome};
use crate::error::Result;
use crate::notify::Notifier;
use crate::query::is_sub_menu_path;
use crate::session::{self, SessionStore};
use crate::types::{EntityRef, Permitted, UserIdentity};
use std::sync::Arc;
use tracing::{info, warn};

pub struct AccessContext {
    session: Arc<dyn SessionStore>,
    api: Arc<dyn ConsoleApi>,
    cache: PermissionCache,
    notifier: Arc<dyn Notifier>,
}

impl AccessContext {
    pub fn new(
        session: Arc<dyn SessionStore>,
        api: Arc<dyn ConsoleApi>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let cache = PermissionCache::new(session.clone(), api.clone());

        let invalidator = cache.invalidator();
        api.on_unauthorized(Arc::new(move || invalidator.invalidate()));

        Self {
            session,
            api,
            cache,
            notifier,
        }
    }

    pub fn session(&self) -> &Arc<dyn SessionStore> {
        &self.session
    }

    pub fn api(&self) -> &Arc<dyn ConsoleApi> {
        &self.api
    }

    pub fn cache(&self) -> &PermissionCache {
        &self.cache
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub fn token(&self) -> Option<String> {
        session::read_token(self.session.as_ref())
    }

    pub fn identity(&self) -> Option<UserIdentity> {
        session::read_identity(self.session.as_ref())
    }

    /// Admin flag of the persisted identity; false when there is none
    pub fn is_admin(&self) -> bool {
        self.identity().map(|i| i.is_admin).unwrap_or(false)
    }

    /// Store a fresh login and drop anything cached for a previous session
    pub fn begin_session(&self, grant: &LoginGrant) -> Result<()> {
        session::write_session(self.session.as_ref(), &grant.token, &grant.user)?;
        self.cache.clear();
        info!("Session started for {}", grant.user.display_name());
        Ok(())
    }

    /// Clear token, identity, and cached permissions
    pub fn end_session(&self) {
        if let Err(e) = session::clear_session(self.session.as_ref()) {
            warn!("Failed to clear session store: {}", e);
        }
        self.cache.clear();
    }

    /// See [`PermissionCache::ensure_populated`]
    pub async fn ensure_permissions(&self) -> PopulateOutcome {
        self.cache.ensure_populated().await
    }

    fn with_state<R>(&self, f: impl FnOnce(&PermissionState) -> R) -> R {
        self.cache.read(f)
    }

    pub fn has_menu_permission(&self, path: &str) -> bool {
        let is_admin = self.is_admin();
        self.with_state(|state| state.has_menu_permission(path, is_admin))
    }

    pub fn has_any_sub_menu_permission(&self, parent: &str) -> bool {
        let is_admin = self.is_admin();
        self.with_state(|state| state.has_any_sub_menu_permission(parent, is_admin))
    }

    /// Whether a route requiring `permission` may be entered
    ///
    /// The menu itself is granted, or `permission` names a sub-menu and some
    /// grant lies under it.
    pub fn may_enter(&self, permission: &str) -> bool {
        let is_admin = self.is_admin();
        self.with_state(|state| {
            state.has_menu_permission(permission, is_admin)
                || (is_sub_menu_path(permission)
                    && state.has_any_sub_menu_permission(permission, is_admin))
        })
    }

    pub fn has_function_permission(&self, module: &str, action: &str) -> bool {
        self.with_state(|state| state.has_function_permission(module, action))
    }

    pub fn has_project_permission(&self, project_id: &str) -> bool {
        self.with_state(|state| state.has_project_permission(project_id))
    }

    pub fn has_environment_permission(&self, environment_type: &str) -> bool {
        self.with_state(|state| state.has_environment_permission(environment_type))
    }

    pub fn permitted_project_ids(&self) -> Permitted<String> {
        self.with_state(|state| state.permitted_project_ids())
    }

    pub fn permitted_environment_types(&self) -> Permitted<String> {
        self.with_state(|state| state.permitted_environment_types())
    }

    /// Composite gate used by screens before acting on an entity
    ///
    /// Emits an error notification on denial, nothing on success.
    pub fn check_permission(&self, module: &str, action: &str, entity: Option<EntityRef<'_>>) -> bool {
        match self.with_state(|state| state.evaluate_check(module, action, entity)) {
            Ok(()) => true,
            Err(denial) => {
                warn!("Permission check failed: {}", denial);
                self.notifier.error(&denial.message());
                false
            }
        }
    }
}
