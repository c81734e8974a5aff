//! HTTP client against the stub permission API
//!
//! Each test serves the stub on an ephemeral port and talks to it through
//! `HttpConsoleApi`, so envelope parsing and the 401 interceptor run over
//! real requests.

#![cfg(feature = "stub")]

use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use console_access::api::PERMISSIONS_PATH;
use console_access::stub::{stub_router, StubDirectory, StubState, StubUser};
use console_access::{
    console_route_table, AccessContext, AccessError, ConsoleApi, HttpConsoleApi,
    InMemorySessionStore, Navigation, Navigator, Permitted, RecordingNotifier, SessionStore,
    UserIdentity,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

async fn spawn_router(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://{}", addr)
}

async fn spawn_stub(state: StubState) -> String {
    spawn_router(stub_router(state)).await
}

struct Client {
    session: Arc<InMemorySessionStore>,
    api: Arc<HttpConsoleApi>,
    notifier: Arc<RecordingNotifier>,
    navigator: Navigator,
}

fn client(base_url: &str) -> Client {
    client_with(base_url, InMemorySessionStore::new())
}

fn client_with(base_url: &str, session: InMemorySessionStore) -> Client {
    let session = Arc::new(session);
    let api = Arc::new(
        HttpConsoleApi::new(base_url, Duration::from_secs(5), session.clone()).unwrap(),
    );
    let notifier = Arc::new(RecordingNotifier::new());
    let ctx = Arc::new(AccessContext::new(
        session.clone(),
        api.clone(),
        notifier.clone(),
    ));
    let navigator = Navigator::new(ctx, console_route_table().unwrap(), "/login", "/dashboard");

    Client {
        session,
        api,
        notifier,
        navigator,
    }
}

// ============================================================================
// LOGIN / LOGOUT
// ============================================================================

#[tokio::test]
async fn test_login_returns_token_and_identity() {
    let state = StubState::new(StubDirectory::demo());
    let base_url = spawn_stub(state.clone()).await;
    let c = client(&base_url);

    let grant = c.api.login("dev", "dev").await.unwrap();

    assert!(!grant.token.is_empty());
    assert!(grant.token_id.is_some());
    assert_eq!(grant.user.user_id, "u-dev");
    assert!(!grant.user.is_admin);
    assert_eq!(state.active_tokens(), 1);
}

#[tokio::test]
async fn test_login_rejections_carry_envelope_code() {
    let mut locked = StubUser::new("u-locked", "locked", "pw");
    locked.active = false;
    let base_url = spawn_stub(StubState::new(StubDirectory::demo().with_user(locked))).await;
    let c = client(&base_url);

    let err = c.api.login("dev", "nope").await.unwrap_err();
    assert!(matches!(err, AccessError::LoginFailed { code: 401, .. }));

    let err = c.api.login("locked", "pw").await.unwrap_err();
    assert!(matches!(err, AccessError::LoginFailed { code: 423, .. }));

    let err = c.api.login("ghost", "pw").await.unwrap_err();
    assert!(matches!(err, AccessError::LoginFailed { code: 404, .. }));

    assert!(c.session.is_empty(), "Envelope failures are not HTTP 401s");
}

#[tokio::test]
async fn test_navigator_logout_revokes_server_token() {
    let state = StubState::new(StubDirectory::demo());
    let base_url = spawn_stub(state.clone()).await;
    let c = client(&base_url);

    c.navigator.login("dev", "dev").await.unwrap();
    assert_eq!(state.active_tokens(), 1);

    let nav = c.navigator.logout().await;

    assert_eq!(nav.landed_path(), Some("/login"));
    assert_eq!(state.active_tokens(), 0);
    assert!(c.session.is_empty());
}

// ============================================================================
// PERMISSIONS
// ============================================================================

#[tokio::test]
async fn test_developer_session_end_to_end() {
    let base_url = spawn_stub(StubState::new(StubDirectory::demo())).await;
    let c = client(&base_url);

    let nav = c.navigator.login("dev", "dev").await.unwrap();
    assert_eq!(nav.landed_path(), Some("/dashboard"));

    let nav = c.navigator.navigate("/build/tasks").await;
    assert_eq!(nav.landed_path(), Some("/build/tasks"));

    let nav = c.navigator.navigate("/user/list").await;
    assert_eq!(nav.landed_path(), Some("/dashboard"));
    assert_eq!(
        c.notifier.errors(),
        vec!["You do not have permission to access User Management".to_string()]
    );

    let ctx = c.navigator.context();
    assert!(ctx.has_function_permission("build_task", "execute"));
    assert_eq!(
        ctx.permitted_project_ids(),
        Permitted::Only(vec!["demo-project".to_string()])
    );
    assert!(ctx.has_environment_permission("test"));
    assert!(!ctx.has_environment_permission("prod"));
}

#[tokio::test]
async fn test_admin_session_enters_any_route() {
    let base_url = spawn_stub(StubState::new(StubDirectory::demo())).await;
    let c = client(&base_url);

    c.navigator.login("admin", "admin").await.unwrap();

    for path in ["/user/role", "/system/basic", "/logs/login/detail"] {
        assert_eq!(c.navigator.navigate(path).await.landed_path(), Some(path));
    }
    assert!(c.navigator.context().permitted_project_ids().is_unrestricted());
}

#[tokio::test]
async fn test_unknown_user_is_a_fetch_failure() {
    let state = StubState::new(StubDirectory::demo());
    let base_url = spawn_stub(state.clone()).await;
    let c = client(&base_url);

    let token = state.issue_token("u-ghost");
    let err = c.api.fetch_permissions(&token).await.unwrap_err();

    match err {
        AccessError::PermissionFetchFailed(message) => assert!(message.contains("404")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_server_fault_ends_session_at_login() {
    let state = StubState::new(StubDirectory::demo());
    state.set_permission_fault(Some(500));
    let base_url = spawn_stub(state.clone()).await;
    let c = client(&base_url);

    let nav = c.navigator.login("dev", "dev").await.unwrap();

    assert_eq!(nav.landed_path(), Some("/login"));
    assert!(matches!(
        nav.first_cause(),
        Some(AccessError::PermissionFetchFailed(_))
    ));
    assert!(c.session.is_empty());
}

async fn navigate_against(router: Router) -> (Client, Navigation) {
    let base_url = spawn_router(router).await;
    let session = InMemorySessionStore::with_session("tok", &UserIdentity::new("5")).unwrap();
    let c = client_with(&base_url, session);
    let nav = c.navigator.navigate("/dashboard").await;
    (c, nav)
}

#[tokio::test]
async fn test_non_json_permission_body_ends_session() {
    let router = Router::new().route(PERMISSIONS_PATH, get(|| async { (StatusCode::OK, "<html>") }));

    let (c, nav) = navigate_against(router).await;

    assert_eq!(nav.landed_path(), Some("/login"));
    assert!(matches!(
        nav.first_cause(),
        Some(AccessError::PermissionFetchFailed(_))
    ));
    assert!(c.session.is_empty());
    assert!(!c.navigator.context().cache().is_initialized());
}

#[tokio::test]
async fn test_mistyped_permission_payload_ends_session() {
    let router = Router::new().route(
        PERMISSIONS_PATH,
        get(|| async { Json(json!({"code": 200, "data": {"menu": 5}})) }),
    );

    let (c, nav) = navigate_against(router).await;

    assert_eq!(nav.landed_path(), Some("/login"));
    assert!(matches!(
        nav.first_cause(),
        Some(AccessError::PermissionFetchFailed(_))
    ));
    assert!(c.session.is_empty());
    assert!(!c.notifier.errors().is_empty());
}

// ============================================================================
// 401 INTERCEPTOR
// ============================================================================

#[tokio::test]
async fn test_http_401_clears_session() {
    let state = StubState::new(StubDirectory::demo());
    let base_url = spawn_stub(state.clone()).await;
    let c = client(&base_url);

    let grant = c.api.login("dev", "dev").await.unwrap();
    c.navigator.context().begin_session(&grant).unwrap();
    assert!(c.session.get("token").is_some());

    state.revoke_token(&grant.token);
    let err = c.api.fetch_permissions(&grant.token).await.unwrap_err();

    assert!(matches!(err, AccessError::Unauthorized));
    assert!(c.session.get("token").is_none());
    assert!(c.session.get("user_info").is_none());

    let nav = c.navigator.handle_api_error(&err).await.unwrap();
    assert_eq!(nav.landed_path(), Some("/login"));
}

#[tokio::test]
async fn test_http_401_clears_permission_cache() {
    let state = StubState::new(StubDirectory::demo());
    let base_url = spawn_stub(state.clone()).await;
    let c = client(&base_url);

    c.navigator.login("dev", "dev").await.unwrap();
    let ctx = c.navigator.context();
    assert!(ctx.has_menu_permission("/build/tasks"));
    let token = ctx.token().unwrap();

    state.revoke_token(&token);
    let err = c.api.fetch_permissions(&token).await.unwrap_err();

    assert!(matches!(err, AccessError::Unauthorized));
    assert!(ctx.token().is_none());
    assert!(!ctx.cache().is_initialized());
    assert!(!ctx.has_menu_permission("/build/tasks"));
}

#[tokio::test]
async fn test_stale_token_401_keeps_newer_session() {
    let state = StubState::new(StubDirectory::demo());
    let base_url = spawn_stub(state.clone()).await;
    let c = client(&base_url);

    c.navigator.login("dev", "dev").await.unwrap();
    let ctx = c.navigator.context();
    let stale = ctx.token().unwrap();
    state.revoke_token(&stale);

    c.navigator.login("admin", "admin").await.unwrap();
    let err = c.api.fetch_permissions(&stale).await.unwrap_err();

    assert!(matches!(err, AccessError::Unauthorized));
    assert!(ctx.token().is_some_and(|token| token != stale));
    assert!(ctx.cache().is_initialized());
}

#[tokio::test]
async fn test_missing_token_is_rejected_with_401() {
    let base_url = spawn_stub(StubState::new(StubDirectory::demo())).await;

    let response = reqwest::get(format!("{}/api/user/permissions", base_url))
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
}
