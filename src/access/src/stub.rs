//! In-process stub of the console permission API
//!
//! Serves `POST /api/login/`, `POST /api/logout/`, and
//! `GET /api/user/permissions` from a static [`StubDirectory`] of users and
//! roles. A user's permissions are the merge of all their roles' grants.
//!
//! Used by the `console-api-stub` binary for local development and by the
//! HTTP integration tests.

use crate::api::{ApiEnvelope, LoginGrant, LoginRequest, CODE_OK, LOGIN_PATH, LOGOUT_PATH, PERMISSIONS_PATH};
use crate::error::Result;
use crate::types::{DataPermissions, PermissionSet, ScopeKind, UserIdentity};
use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Grants carried by one role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    #[serde(default)]
    pub menu: Vec<String>,

    #[serde(default)]
    pub function: BTreeMap<String, Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<DataPermissions>,
}

/// Merge role grants into one permission set
///
/// Menus and per-module actions are unioned. A data scope becomes custom as
/// soon as one role restricts it, and the custom roles' ID/type lists are
/// unioned; roles with an "all" scope do not widen a custom one. With no
/// custom role the scope stays "all" with empty lists.
pub fn merge_role_grants<'a>(grants: impl IntoIterator<Item = &'a RoleGrant>) -> PermissionSet {
    let mut merged = PermissionSet::new();
    let mut custom_projects = false;
    let mut custom_environments = false;

    for grant in grants {
        merged.menu.extend(grant.menu.iter().cloned());

        for (module, actions) in &grant.function {
            merged
                .function
                .entry(module.clone())
                .or_default()
                .extend(actions.iter().cloned());
        }

        let Some(data) = &grant.data else {
            continue;
        };

        if data.project_scope == ScopeKind::Custom {
            custom_projects = true;
            merged.data.project_ids.extend(data.project_ids.iter().cloned());
        }

        if data.environment_scope == ScopeKind::Custom {
            custom_environments = true;
            merged
                .data
                .environment_types
                .extend(data.environment_types.iter().cloned());
        }
    }

    if custom_projects {
        merged.data.project_scope = ScopeKind::Custom;
    } else {
        merged.data.project_ids.clear();
    }

    if custom_environments {
        merged.data.environment_scope = ScopeKind::Custom;
    } else {
        merged.data.environment_types.clear();
    }

    merged
}

fn default_true() -> bool {
    true
}

/// User known to the stub
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StubUser {
    pub user_id: String,
    pub username: String,
    pub password: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub is_admin: bool,

    #[serde(default)]
    pub roles: Vec<String>,

    /// Inactive users are refused at login
    #[serde(default = "default_true")]
    pub active: bool,
}

impl StubUser {
    pub fn new(user_id: &str, username: &str, password: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            name: None,
            email: None,
            is_admin: false,
            roles: Vec::new(),
            active: true,
        }
    }

    pub fn admin(mut self) -> Self {
        self.is_admin = true;
        self
    }

    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        self.roles = roles.iter().map(|r| r.to_string()).collect();
        self
    }

    fn identity(&self) -> UserIdentity {
        UserIdentity {
            user_id: self.user_id.clone(),
            is_admin: self.is_admin,
            username: Some(self.username.clone()),
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

/// Users and roles served by the stub
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StubDirectory {
    #[serde(default)]
    pub users: Vec<StubUser>,

    #[serde(default)]
    pub roles: BTreeMap<String, RoleGrant>,
}

impl StubDirectory {
    /// Load a directory from a JSON file
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn with_role(mut self, name: &str, grant: RoleGrant) -> Self {
        self.roles.insert(name.to_string(), grant);
        self
    }

    pub fn with_user(mut self, user: StubUser) -> Self {
        self.users.push(user);
        self
    }

    /// Demo directory: an administrator and a developer limited to builds
    pub fn demo() -> Self {
        let developer = RoleGrant {
            menu: vec![
                "/dashboard".to_string(),
                "/build".to_string(),
                "/build/tasks".to_string(),
                "/build/history".to_string(),
            ],
            function: BTreeMap::from([
                (
                    "build_task".to_string(),
                    vec!["view".to_string(), "execute".to_string()],
                ),
                ("build_history".to_string(), vec!["view".to_string(), "view_log".to_string()]),
            ]),
            data: Some(
                DataPermissions::default()
                    .with_projects(["demo-project"])
                    .with_environments(["dev", "test"]),
            ),
        };

        Self::default()
            .with_role("developer", developer)
            .with_user(StubUser::new("u-admin", "admin", "admin").admin())
            .with_user(StubUser::new("u-dev", "dev", "dev").with_roles(&["developer"]))
    }

    fn find_by_username(&self, username: &str) -> Option<&StubUser> {
        self.users.iter().find(|u| u.username == username)
    }

    fn find_by_id(&self, user_id: &str) -> Option<&StubUser> {
        self.users.iter().find(|u| u.user_id == user_id)
    }

    /// Merged permissions of a user, `None` if the user does not exist
    pub fn permissions_for(&self, user_id: &str) -> Option<PermissionSet> {
        let user = self.find_by_id(user_id)?;
        let grants = user.roles.iter().filter_map(|role| {
            let grant = self.roles.get(role);
            if grant.is_none() {
                warn!("User {} references unknown role {}", user_id, role);
            }
            grant
        });
        Some(merge_role_grants(grants))
    }
}

/// Shared stub state
#[derive(Clone)]
pub struct StubState {
    directory: Arc<StubDirectory>,
    /// token → user ID
    tokens: Arc<DashMap<String, String>>,
    /// When set, the permission endpoint answers with this envelope code
    permission_fault: Arc<RwLock<Option<i64>>>,
}

impl StubState {
    pub fn new(directory: StubDirectory) -> Self {
        Self {
            directory: Arc::new(directory),
            tokens: Arc::new(DashMap::new()),
            permission_fault: Arc::new(RwLock::new(None)),
        }
    }

    /// Issue a token for `user_id` without checking that the user exists
    pub fn issue_token(&self, user_id: &str) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.tokens.insert(token.clone(), user_id.to_string());
        token
    }

    pub fn revoke_token(&self, token: &str) -> bool {
        self.tokens.remove(token).is_some()
    }

    pub fn active_tokens(&self) -> usize {
        self.tokens.len()
    }

    /// Make the permission endpoint fail with `code` (or recover with `None`)
    pub fn set_permission_fault(&self, code: Option<i64>) {
        *self.permission_fault.write() = code;
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiEnvelope::<()>::failure(401, message)),
    )
        .into_response()
}

/// POST /api/login/
async fn login(State(state): State<StubState>, Json(req): Json<LoginRequest>) -> Response {
    if req.username.is_empty() || req.password.is_empty() {
        return Json(ApiEnvelope::<LoginGrant>::failure(400, "Username and password are required"))
            .into_response();
    }

    let Some(user) = state.directory.find_by_username(&req.username) else {
        return Json(ApiEnvelope::<LoginGrant>::failure(404, "User does not exist")).into_response();
    };

    if !user.active {
        return Json(ApiEnvelope::<LoginGrant>::failure(423, "Account is locked")).into_response();
    }

    if user.password != req.password {
        return Json(ApiEnvelope::<LoginGrant>::failure(401, "Wrong password")).into_response();
    }

    let token = state.issue_token(&user.user_id);
    info!("Stub login for {}", user.username);

    Json(ApiEnvelope::ok(LoginGrant {
        token_id: Some(Uuid::new_v4().simple().to_string()),
        token,
        user: user.identity(),
    }))
    .into_response()
}

/// POST /api/logout/
async fn logout(State(state): State<StubState>, headers: HeaderMap) -> Response {
    let Some(token) = bearer(&headers) else {
        return Json(ApiEnvelope::<()>::failure(400, "Token not provided")).into_response();
    };

    if !state.revoke_token(token) {
        return Json(ApiEnvelope::<()>::failure(401, "Invalid token")).into_response();
    }

    Json(ApiEnvelope::<()> {
        code: CODE_OK,
        message: Some("Logged out".to_string()),
        data: None,
    })
    .into_response()
}

/// GET /api/user/permissions
async fn permissions(State(state): State<StubState>, headers: HeaderMap) -> Response {
    let Some(token) = bearer(&headers) else {
        return unauthorized("Token not provided");
    };

    let Some(user_id) = state.tokens.get(token).map(|entry| entry.value().clone()) else {
        return unauthorized("Invalid token");
    };

    if let Some(code) = *state.permission_fault.read() {
        debug!("Injecting permission fault {}", code);
        return Json(ApiEnvelope::<PermissionSet>::failure(code, "Server error")).into_response();
    }

    match state.directory.permissions_for(&user_id) {
        Some(permissions) => Json(ApiEnvelope::ok(permissions)).into_response(),
        None => Json(ApiEnvelope::<PermissionSet>::failure(404, "User does not exist")).into_response(),
    }
}

/// Build the stub router
pub fn stub_router(state: StubState) -> Router {
    let permissions_with_slash = format!("{}/", PERMISSIONS_PATH);

    Router::new()
        .route(LOGIN_PATH, post(login))
        .route(LOGOUT_PATH, post(logout))
        .route(PERMISSIONS_PATH, get(permissions))
        .route(&permissions_with_slash, get(permissions))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
