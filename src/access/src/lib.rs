//! # Console Access
//!
//! Permission cache and route guard for the CI/CD pipeline console.
//!
//! ## Features
//!
//! - **Session store** holding the `token` and `user_info` entries
//! - **Single-flight permission cache** populated once per session
//! - **Fail-closed predicates** for menus, functions, projects, and environments
//! - **Navigation guard** that redirects to login or to the home route
//! - **401 interception** that tears the session down on any API call
//! - **Stub API server** (feature `stub`) for local development
//!
//! ## Example
//!
//! ```rust,no_run
//! use console_access::{
//!     console_route_table, AccessContext, HttpConsoleApi, InMemorySessionStore, Navigator,
//!     SessionStore, TracingNotifier,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
//!     let api = Arc::new(HttpConsoleApi::new(
//!         "http://127.0.0.1:8000",
//!         Duration::from_secs(10),
//!         session.clone(),
//!     )?);
//!     let ctx = Arc::new(AccessContext::new(session, api, Arc::new(TracingNotifier)));
//!
//!     let navigator = Navigator::new(ctx, console_route_table()?, "/login", "/dashboard");
//!     navigator.login("dev", "dev").await?;
//!
//!     let nav = navigator.navigate("/build/tasks").await;
//!     println!("landed on {:?}", nav.landed_path());
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod guard;
pub mod notify;
pub mod query;
pub mod router;
pub mod routes;
pub mod session;
pub mod types;

#[cfg(feature = "stub")]
pub mod stub;

// Re-export commonly used types
pub use api::{ApiEnvelope, ConsoleApi, HttpConsoleApi, LoginGrant, UnauthorizedHook};
pub use cache::{CacheInvalidator, PermissionCache, PermissionState, PopulateOutcome};
pub use config::ConsoleConfig;
pub use context::AccessContext;
pub use error::{AccessError, Result};
pub use guard::{GuardDecision, GuardStage, RouteGuard};
pub use notify::{Notice, NoticeLevel, Notifier, RecordingNotifier, TracingNotifier};
pub use query::{is_sub_menu_path, CheckDenial};
pub use router::{Navigation, NavigationOutcome, Navigator, RedirectHop};
pub use routes::{console_route_table, ResolvedRoute, RouteDescriptor, RouteTable};
pub use session::{FileSessionStore, InMemorySessionStore, SessionStore};
pub use types::{DataPermissions, EntityRef, PermissionSet, Permitted, ScopeKind, UserIdentity};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
