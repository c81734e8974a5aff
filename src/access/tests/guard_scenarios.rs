//! Navigation guard scenarios
//!
//! Drives the navigator against an in-memory API fake: session checks,
//! single-flight permission loading, menu and sub-menu gating, and the
//! login/logout/401 transitions.

use async_trait::async_trait;
use console_access::{
    console_route_table, guard::PERMISSION_LOAD_FAILED_MESSAGE, AccessContext, AccessError,
    ConsoleApi, DataPermissions, EntityRef, InMemorySessionStore, LoginGrant, NavigationOutcome,
    Navigator, NoticeLevel, PermissionSet, RecordingNotifier, Result, SessionStore, UserIdentity,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What the fake answers on the permission endpoint
#[derive(Clone)]
enum Reply {
    Grant(PermissionSet),
    Code(i64),
    Unauthorized,
}

struct FakeApi {
    reply: Mutex<Reply>,
    fetches: AtomicUsize,
    logouts: AtomicUsize,
    delay: Duration,
}

impl FakeApi {
    fn new(reply: Reply) -> Self {
        Self {
            reply: Mutex::new(reply),
            fetches: AtomicUsize::new(0),
            logouts: AtomicUsize::new(0),
            delay: Duration::from_millis(5),
        }
    }

    fn slow(reply: Reply, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new(reply)
        }
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn set_reply(&self, reply: Reply) {
        *self.reply.lock() = reply;
    }
}

#[async_trait]
impl ConsoleApi for FakeApi {
    async fn login(&self, username: &str, password: &str) -> Result<LoginGrant> {
        if password != "secret" {
            return Err(AccessError::LoginFailed {
                code: 401,
                message: "Wrong password".to_string(),
            });
        }

        Ok(LoginGrant {
            token_id: None,
            token: format!("tok-{}", username),
            user: UserIdentity::new("7").with_username(username),
        })
    }

    async fn logout(&self, _token: &str) -> Result<()> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch_permissions(&self, _token: &str) -> Result<PermissionSet> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        let reply = self.reply.lock().clone();
        match reply {
            Reply::Grant(permissions) => Ok(permissions),
            Reply::Code(code) => Err(AccessError::PermissionFetchFailed(format!("code {}", code))),
            Reply::Unauthorized => Err(AccessError::Unauthorized),
        }
    }
}

struct Harness {
    session: Arc<InMemorySessionStore>,
    api: Arc<FakeApi>,
    notifier: Arc<RecordingNotifier>,
    navigator: Navigator,
}

impl Harness {
    fn build(identity: Option<UserIdentity>, api: FakeApi) -> Self {
        let session = Arc::new(match identity {
            Some(identity) => InMemorySessionStore::with_session("tok", &identity).unwrap(),
            None => InMemorySessionStore::new(),
        });
        let api = Arc::new(api);
        let notifier = Arc::new(RecordingNotifier::new());

        let ctx = Arc::new(AccessContext::new(
            session.clone(),
            api.clone(),
            notifier.clone(),
        ));
        let navigator = Navigator::new(ctx, console_route_table().unwrap(), "/login", "/dashboard");

        Self {
            session,
            api,
            notifier,
            navigator,
        }
    }

    fn signed_in(identity: UserIdentity, reply: Reply) -> Self {
        Self::build(Some(identity), FakeApi::new(reply))
    }

    fn anonymous(reply: Reply) -> Self {
        Self::build(None, FakeApi::new(reply))
    }

    fn ctx(&self) -> &AccessContext {
        self.navigator.context()
    }
}

fn menus(paths: &[&str]) -> Reply {
    let mut permissions = PermissionSet::new();
    for path in paths {
        permissions = permissions.with_menu(*path);
    }
    Reply::Grant(permissions)
}

fn developer() -> UserIdentity {
    UserIdentity::new("7").with_username("dev")
}

fn admin() -> UserIdentity {
    UserIdentity::new("1").with_username("admin").admin()
}

// ============================================================================
// AUTH CHECK
// ============================================================================

#[tokio::test]
async fn test_no_token_redirects_to_login() {
    let h = Harness::anonymous(menus(&["/build/tasks"]));

    let nav = h.navigator.navigate("/build/tasks").await;

    assert_eq!(nav.landed_path(), Some("/login"));
    assert!(matches!(nav.first_cause(), Some(AccessError::NoSessionToken)));
    assert_eq!(h.api.fetches(), 0, "No fetch without a session");
    assert!(h.notifier.errors().is_empty());
}

#[tokio::test]
async fn test_login_route_is_always_open() {
    let h = Harness::anonymous(Reply::Code(500));

    let nav = h.navigator.navigate("/login").await;

    assert_eq!(nav.landed_path(), Some("/login"));
    assert!(!nav.was_redirected());
    assert_eq!(h.api.fetches(), 0);
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let h = Harness::signed_in(developer(), menus(&["/dashboard"]));

    let nav = h.navigator.navigate("/nowhere/at/all").await;

    assert!(matches!(nav.outcome, NavigationOutcome::NotFound(ref p) if p == "/nowhere/at/all"));
    assert_eq!(nav.landed_path(), None);
}

// ============================================================================
// MENU PERMISSIONS
// ============================================================================

#[tokio::test]
async fn test_missing_menu_redirects_home_with_message() {
    let h = Harness::signed_in(developer(), menus(&["/dashboard"]));

    let nav = h.navigator.navigate("/build/tasks").await;

    assert_eq!(nav.landed_path(), Some("/dashboard"));
    assert_eq!(nav.hops.len(), 1);
    assert!(matches!(
        nav.first_cause(),
        Some(AccessError::PermissionDenied(p)) if p == "/build/tasks"
    ));
    assert_eq!(
        h.notifier.errors(),
        vec!["You do not have permission to access Build Tasks".to_string()]
    );
    assert_eq!(h.api.fetches(), 1, "Second guard run reuses the cache");
}

#[tokio::test]
async fn test_admin_passes_menu_checks() {
    let h = Harness::signed_in(admin(), menus(&[]));

    let nav = h.navigator.navigate("/build/tasks").await;

    assert_eq!(nav.landed_path(), Some("/build/tasks"));
    assert!(!nav.was_redirected());
    assert!(h.notifier.errors().is_empty());
}

#[tokio::test]
async fn test_parent_menu_does_not_grant_child_route() {
    let h = Harness::signed_in(developer(), menus(&["/dashboard", "/build"]));

    let nav = h.navigator.navigate("/build/tasks/detail").await;

    assert_eq!(nav.landed_path(), Some("/dashboard"));
    assert!(matches!(
        nav.first_cause(),
        Some(AccessError::PermissionDenied(p)) if p == "/build/tasks"
    ));
    assert_eq!(
        h.notifier.errors(),
        vec!["You do not have permission to access Task Detail".to_string()]
    );
}

#[tokio::test]
async fn test_granted_child_opens_sub_menu_route() {
    let h = Harness::signed_in(developer(), menus(&["/dashboard", "/build/tasks/detail"]));

    let nav = h.navigator.navigate("/build/tasks").await;

    assert_eq!(nav.landed_path(), Some("/build/tasks"));
}

#[tokio::test]
async fn test_parent_path_follows_route_redirect() {
    let h = Harness::signed_in(developer(), menus(&["/dashboard", "/build/tasks"]));

    let nav = h.navigator.navigate("/build").await;

    assert_eq!(nav.requested, "/build");
    assert_eq!(nav.landed_path(), Some("/build/tasks"));
    assert!(!nav.was_redirected(), "Route redirects are not guard hops");
}

#[tokio::test]
async fn test_denied_home_falls_back_to_login() {
    let h = Harness::signed_in(developer(), menus(&["/build"]));

    let nav = h.navigator.navigate("/build/tasks/detail").await;

    assert_eq!(nav.landed_path(), Some("/login"));
    assert_eq!(nav.hops.len(), 2);
    assert_eq!(nav.hops[0].to, "/dashboard");
    assert_eq!(nav.hops[1].to, "/login");
}

// ============================================================================
// PERMISSION LOADING
// ============================================================================

#[tokio::test]
async fn test_server_error_clears_session_and_redirects_to_login() {
    let h = Harness::signed_in(developer(), Reply::Code(500));

    let nav = h.navigator.navigate("/dashboard").await;

    assert_eq!(nav.landed_path(), Some("/login"));
    assert!(matches!(
        nav.first_cause(),
        Some(AccessError::PermissionFetchFailed(_))
    ));
    assert!(h.session.is_empty(), "token and user_info removed");
    assert!(!h.ctx().cache().is_initialized());
    assert_eq!(
        h.notifier.errors(),
        vec![PERMISSION_LOAD_FAILED_MESSAGE.to_string()]
    );
}

#[tokio::test]
async fn test_unauthorized_fetch_redirects_to_login() {
    let h = Harness::signed_in(developer(), Reply::Unauthorized);

    let nav = h.navigator.navigate("/dashboard").await;

    assert_eq!(nav.landed_path(), Some("/login"));
    assert!(matches!(nav.first_cause(), Some(AccessError::Unauthorized)));
    assert!(h.session.is_empty());
}

#[tokio::test]
async fn test_token_without_identity_redirects_to_login() {
    let session = Arc::new(InMemorySessionStore::new());
    session.set("token", "tok").unwrap();

    let api = Arc::new(FakeApi::new(menus(&["/dashboard"])));
    let notifier = Arc::new(RecordingNotifier::new());
    let ctx = Arc::new(AccessContext::new(session.clone(), api.clone(), notifier));
    let navigator = Navigator::new(ctx, console_route_table().unwrap(), "/login", "/dashboard");

    let nav = navigator.navigate("/dashboard").await;

    assert_eq!(nav.landed_path(), Some("/login"));
    assert!(matches!(nav.first_cause(), Some(AccessError::NoUserIdentity)));
    assert_eq!(api.fetches(), 0);
    assert!(session.is_empty());
}

#[tokio::test]
async fn test_concurrent_navigations_share_one_fetch() {
    let h = Harness::build(
        Some(developer()),
        FakeApi::slow(
            menus(&["/dashboard", "/build/tasks", "/build/history"]),
            Duration::from_millis(40),
        ),
    );

    let (a, b, c) = tokio::join!(
        h.navigator.navigate("/dashboard"),
        h.navigator.navigate("/build/tasks"),
        h.navigator.navigate("/build/history"),
    );

    assert_eq!(a.landed_path(), Some("/dashboard"));
    assert_eq!(b.landed_path(), Some("/build/tasks"));
    assert_eq!(c.landed_path(), Some("/build/history"));
    assert_eq!(h.api.fetches(), 1);
}

#[tokio::test]
async fn test_permissions_are_loaded_once_per_session() {
    let h = Harness::signed_in(developer(), menus(&["/dashboard", "/build/tasks"]));

    for path in ["/dashboard", "/build/tasks", "/dashboard", "/"] {
        h.navigator.navigate(path).await;
    }

    assert_eq!(h.api.fetches(), 1);
}

// ============================================================================
// SESSION TRANSITIONS
// ============================================================================

#[tokio::test]
async fn test_login_starts_fresh_session() {
    let h = Harness::anonymous(menus(&["/dashboard"]));

    let nav = h.navigator.login("dev", "secret").await.unwrap();

    assert_eq!(nav.landed_path(), Some("/dashboard"));
    assert_eq!(h.ctx().token().as_deref(), Some("tok-dev"));
    assert_eq!(h.ctx().identity().unwrap().user_id, "7");
    assert!(h
        .notifier
        .notices()
        .iter()
        .any(|n| n.level == NoticeLevel::Success));
}

#[tokio::test]
async fn test_failed_login_leaves_no_session() {
    let h = Harness::anonymous(menus(&["/dashboard"]));

    let err = h.navigator.login("dev", "wrong").await.unwrap_err();

    assert!(matches!(err, AccessError::LoginFailed { code: 401, .. }));
    assert!(h.session.is_empty());
    assert_eq!(h.api.fetches(), 0);
}

#[tokio::test]
async fn test_relogin_refetches_permissions() {
    let h = Harness::anonymous(menus(&["/dashboard"]));

    h.navigator.login("dev", "secret").await.unwrap();
    assert_eq!(h.api.fetches(), 1);

    h.api.set_reply(menus(&["/dashboard", "/build/tasks"]));
    h.navigator.login("dev", "secret").await.unwrap();
    assert_eq!(h.api.fetches(), 2);

    let nav = h.navigator.navigate("/build/tasks").await;
    assert_eq!(nav.landed_path(), Some("/build/tasks"));
}

#[tokio::test]
async fn test_login_during_slow_navigation_keeps_new_session() {
    let h = Harness::build(
        Some(developer()),
        FakeApi::slow(
            menus(&["/dashboard", "/build/tasks"]),
            Duration::from_millis(40),
        ),
    );

    let (stale, fresh) = tokio::join!(h.navigator.navigate("/build/tasks"), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        h.navigator.login("dev", "secret").await.unwrap()
    });

    assert_eq!(fresh.landed_path(), Some("/dashboard"));
    assert_eq!(stale.landed_path(), Some("/build/tasks"));
    assert!(!stale.was_redirected());
    assert_eq!(h.ctx().token().as_deref(), Some("tok-dev"));
    assert!(h.ctx().cache().is_initialized());
    assert!(h.notifier.errors().is_empty());
    assert_eq!(h.api.fetches(), 2);
}

#[tokio::test]
async fn test_logout_clears_everything() {
    let h = Harness::signed_in(developer(), menus(&["/dashboard"]));
    h.navigator.navigate("/dashboard").await;
    assert!(h.ctx().cache().is_initialized());

    let nav = h.navigator.logout().await;

    assert_eq!(nav.landed_path(), Some("/login"));
    assert_eq!(h.api.logouts.load(Ordering::SeqCst), 1);
    assert!(h.session.is_empty());
    assert!(!h.ctx().cache().is_initialized());

    let nav = h.navigator.navigate("/dashboard").await;
    assert_eq!(nav.landed_path(), Some("/login"));
}

#[tokio::test]
async fn test_api_unauthorized_sends_user_to_login() {
    let h = Harness::signed_in(developer(), menus(&["/dashboard"]));
    h.navigator.navigate("/dashboard").await;

    assert!(h
        .navigator
        .handle_api_error(&AccessError::UnexpectedStatus(500))
        .await
        .is_none());

    let nav = h
        .navigator
        .handle_api_error(&AccessError::Unauthorized)
        .await
        .unwrap();

    assert_eq!(nav.landed_path(), Some("/login"));
    assert!(h.session.is_empty());
    assert!(!h.ctx().cache().is_initialized());
}

// ============================================================================
// COMPOSITE CHECKS
// ============================================================================

#[tokio::test]
async fn test_check_permission_requires_function_and_data_scope() {
    let permissions = PermissionSet::new()
        .with_menu("/dashboard")
        .with_function("build_task", "execute")
        .with_data(
            DataPermissions::default()
                .with_projects(["p-1"])
                .with_environments(["dev"]),
        );
    let h = Harness::signed_in(developer(), Reply::Grant(permissions));
    h.navigator.navigate("/dashboard").await;
    let ctx = h.ctx();

    assert!(ctx.check_permission("build_task", "execute", Some(EntityRef::Project("p-1"))));
    assert!(ctx.check_permission("build_task", "execute", Some(EntityRef::Environment("dev"))));
    assert!(h.notifier.errors().is_empty());

    assert!(!ctx.check_permission("build_task", "execute", Some(EntityRef::Project("p-2"))));
    assert!(!ctx.check_permission("build_task", "execute", Some(EntityRef::Environment("prod"))));
    assert!(!ctx.check_permission("build_task", "delete", None));

    assert_eq!(
        h.notifier.errors(),
        vec![
            "You do not have access to this project".to_string(),
            "You do not have access to this environment".to_string(),
            "You do not have permission to delete build tasks".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_predicates_deny_before_permissions_load() {
    let h = Harness::signed_in(admin(), menus(&["/dashboard"]));
    let ctx = h.ctx();

    assert!(!ctx.has_menu_permission("/dashboard"));
    assert!(!ctx.has_project_permission("p-1"));
    assert!(!ctx.check_permission("build_task", "view", None));
}
