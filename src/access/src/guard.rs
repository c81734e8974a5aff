//! Navigation guard
//!
//! Runs once per navigation attempt:
//!
//! ```text
//! Start → AuthCheck → PermissionCacheCheck → PermissionCheck → Allow
//!             ↓                ↓                     ↓
//!      Redirect(login)  Redirect(login)     Redirect(dashboard)
//! ```
//!
//! The cache check suspends the navigation until the single permission
//! fetch settles; it never starts a second fetch.

use crate::context::AccessContext;
use crate::error::AccessError;
use crate::notify::route_denied_message;
use crate::routes::ResolvedRoute;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Message shown when permissions cannot be loaded
pub const PERMISSION_LOAD_FAILED_MESSAGE: &str =
    "Failed to load your permissions, please sign in again";

/// Guard state for one navigation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardStage {
    Start,
    AuthCheck,
    PermissionCacheCheck,
    PermissionCheck,
}

impl fmt::Display for GuardStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GuardStage::Start => "start",
            GuardStage::AuthCheck => "auth-check",
            GuardStage::PermissionCacheCheck => "permission-cache-check",
            GuardStage::PermissionCheck => "permission-check",
        };
        f.write_str(name)
    }
}

/// Terminal state of a guard run
#[derive(Debug, Clone)]
pub enum GuardDecision {
    Allow,
    Redirect {
        to: String,
        cause: Arc<AccessError>,
    },
}

impl GuardDecision {
    pub fn is_allow(&self) -> bool {
        matches!(self, GuardDecision::Allow)
    }

    fn redirect(to: &str, cause: AccessError) -> Self {
        GuardDecision::Redirect {
            to: to.to_string(),
            cause: Arc::new(cause),
        }
    }
}

/// Route entry guard bound to one access context
pub struct RouteGuard {
    ctx: Arc<AccessContext>,
    login_route: String,
    home_route: String,
}

impl RouteGuard {
    pub fn new(
        ctx: Arc<AccessContext>,
        login_route: impl Into<String>,
        home_route: impl Into<String>,
    ) -> Self {
        Self {
            ctx,
            login_route: login_route.into(),
            home_route: home_route.into(),
        }
    }

    pub fn login_route(&self) -> &str {
        &self.login_route
    }

    pub fn home_route(&self) -> &str {
        &self.home_route
    }

    /// Decide whether `target` may be entered
    pub async fn check(&self, target: &ResolvedRoute) -> GuardDecision {
        let mut stage = GuardStage::Start;

        loop {
            debug!("Guard {} for {}", stage, target.full_path);

            stage = match stage {
                GuardStage::Start => GuardStage::AuthCheck,

                GuardStage::AuthCheck => {
                    if target.full_path == self.login_route {
                        return GuardDecision::Allow;
                    }
                    if self.ctx.token().is_none() {
                        debug!("No session token, redirecting {} to login", target.full_path);
                        return GuardDecision::redirect(&self.login_route, AccessError::NoSessionToken);
                    }
                    GuardStage::PermissionCacheCheck
                }

                GuardStage::PermissionCacheCheck => {
                    if let Err(cause) = self.ctx.ensure_permissions().await {
                        error!("Permission initialization failed ({}), redirecting to login", cause);
                        self.ctx.end_session();
                        self.ctx.notifier().error(PERMISSION_LOAD_FAILED_MESSAGE);
                        return GuardDecision::Redirect {
                            to: self.login_route.clone(),
                            cause,
                        };
                    }
                    GuardStage::PermissionCheck
                }

                GuardStage::PermissionCheck => {
                    let Some(permission) = target.permission.as_deref() else {
                        return GuardDecision::Allow;
                    };

                    if self.ctx.may_enter(permission) {
                        return GuardDecision::Allow;
                    }

                    warn!(
                        "Access to {} denied, requires {}",
                        target.full_path, permission
                    );
                    self.ctx
                        .notifier()
                        .error(&route_denied_message(target.title.as_deref()));
                    return GuardDecision::redirect(
                        &self.home_route,
                        AccessError::PermissionDenied(permission.to_string()),
                    );
                }
            };
        }
    }
}
