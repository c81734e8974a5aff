//! Navigator: route resolution, guard execution, and session transitions

use crate::context::AccessContext;
use crate::error::{AccessError, Result};
use crate::guard::{GuardDecision, RouteGuard};
use crate::routes::{normalize_path, ResolvedRoute, RouteTable};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One guard redirect taken while navigating
#[derive(Debug, Clone)]
pub struct RedirectHop {
    pub from: String,
    pub to: String,
    pub cause: Arc<AccessError>,
}

/// Where a navigation ended
#[derive(Debug, Clone)]
pub enum NavigationOutcome {
    /// The route was entered
    Arrived(ResolvedRoute),
    /// No route matches the path
    NotFound(String),
}

/// Result of one call to [`Navigator::navigate`]
#[derive(Debug, Clone)]
pub struct Navigation {
    pub requested: String,
    pub outcome: NavigationOutcome,
    pub hops: Vec<RedirectHop>,
}

impl Navigation {
    /// Full path of the route entered, if any
    pub fn landed_path(&self) -> Option<&str> {
        match &self.outcome {
            NavigationOutcome::Arrived(route) => Some(&route.full_path),
            NavigationOutcome::NotFound(_) => None,
        }
    }

    pub fn was_redirected(&self) -> bool {
        !self.hops.is_empty()
    }

    /// Cause of the first guard redirect
    pub fn first_cause(&self) -> Option<&AccessError> {
        self.hops.first().map(|hop| hop.cause.as_ref())
    }
}

/// Console navigator bound to one access context
pub struct Navigator {
    ctx: Arc<AccessContext>,
    routes: RouteTable,
    guard: RouteGuard,
    current: RwLock<Option<ResolvedRoute>>,
}

impl Navigator {
    pub fn new(
        ctx: Arc<AccessContext>,
        routes: RouteTable,
        login_route: impl Into<String>,
        home_route: impl Into<String>,
    ) -> Self {
        let guard = RouteGuard::new(ctx.clone(), login_route, home_route);
        Self {
            ctx,
            routes,
            guard,
            current: RwLock::new(None),
        }
    }

    pub fn context(&self) -> &Arc<AccessContext> {
        &self.ctx
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Route most recently entered
    pub fn current(&self) -> Option<ResolvedRoute> {
        self.current.read().clone()
    }

    /// Navigate to `path`
    ///
    /// Each guard redirect starts a new attempt that runs the guard again.
    /// A redirect back to a path already attempted in this navigation lands
    /// on the login route instead.
    pub async fn navigate(&self, path: &str) -> Navigation {
        let requested = normalize_path(path);
        let mut target = requested.clone();
        let mut attempted = HashSet::new();
        let mut hops = Vec::new();

        loop {
            let Some(route) = self.routes.resolve(&target).cloned() else {
                warn!("No route matches {}", target);
                return Navigation {
                    requested,
                    outcome: NavigationOutcome::NotFound(target),
                    hops,
                };
            };

            attempted.insert(route.full_path.clone());

            match self.guard.check(&route).await {
                GuardDecision::Allow => {
                    debug!("Entered {}", route.full_path);
                    *self.current.write() = Some(route.clone());
                    return Navigation {
                        requested,
                        outcome: NavigationOutcome::Arrived(route),
                        hops,
                    };
                }
                GuardDecision::Redirect { to, cause } => {
                    let to = normalize_path(&to);
                    let next = match self.routes.resolve(&to) {
                        Some(next) if attempted.contains(&next.full_path) => {
                            warn!("Redirect loop at {}, falling back to login", next.full_path);
                            self.guard.login_route().to_string()
                        }
                        _ => to,
                    };

                    debug!("Redirect {} -> {} ({})", route.full_path, next, cause);
                    hops.push(RedirectHop {
                        from: route.full_path,
                        to: next.clone(),
                        cause,
                    });
                    target = next;
                }
            }
        }
    }

    /// Sign in, start a fresh session, and open the home route
    pub async fn login(&self, username: &str, password: &str) -> Result<Navigation> {
        let grant = self.ctx.api().login(username, password).await?;
        self.ctx.begin_session(&grant)?;
        self.ctx.notifier().success("Signed in");
        Ok(self.navigate(self.guard.home_route()).await)
    }

    /// Sign out and return to the login route
    ///
    /// The server-side logout is best effort; local state is always cleared.
    pub async fn logout(&self) -> Navigation {
        if let Some(token) = self.ctx.token() {
            if let Err(e) = self.ctx.api().logout(&token).await {
                warn!("Server logout failed: {}", e);
            }
        }

        self.ctx.end_session();
        info!("Signed out");
        self.navigate(self.guard.login_route()).await
    }

    /// React to an API error raised by a screen
    ///
    /// A 401 has already cleared the session store; the cached permissions
    /// are dropped and the user is sent to the login route.
    pub async fn handle_api_error(&self, err: &AccessError) -> Option<Navigation> {
        match err {
            AccessError::Unauthorized => {
                self.ctx.end_session();
                Some(self.navigate(self.guard.login_route()).await)
            }
            _ => None,
        }
    }
}
