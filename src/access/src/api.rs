//! Console API client
//!
//! Every response passes through [`HttpConsoleApi::intercept`]: an HTTP 401
//! clears `token` and `user_info` from the session store, runs the hooks
//! registered with [`ConsoleApi::on_unauthorized`] (the access context
//! registers one that drops cached permissions), and surfaces
//! [`AccessError::Unauthorized`], which the navigator turns into a redirect
//! to the login route.

use crate::error::{AccessError, Result};
use crate::session::{self, SessionStore};
use crate::types::{PermissionSet, UserIdentity};
use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, StatusCode};
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Success code carried in the response envelope
pub const CODE_OK: i64 = 200;

/// Permission endpoint
pub const PERMISSIONS_PATH: &str = "/api/user/permissions";

/// Login endpoint
pub const LOGIN_PATH: &str = "/api/login/";

/// Logout endpoint
pub const LOGOUT_PATH: &str = "/api/logout/";

/// Response envelope used by every console endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub code: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    /// Successful envelope
    pub fn ok(data: T) -> Self {
        Self {
            code: CODE_OK,
            message: None,
            data: Some(data),
        }
    }

    /// Failure envelope
    pub fn failure(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
            data: None,
        }
    }

    fn describe(&self) -> String {
        match &self.message {
            Some(message) => format!("code {}: {}", self.code, message),
            None => format!("code {}", self.code),
        }
    }
}

/// Credentials posted to the login endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Successful login payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginGrant {
    #[serde(default)]
    pub token_id: Option<String>,

    pub token: String,

    pub user: UserIdentity,
}

/// Remote console API
#[async_trait]
pub trait ConsoleApi: Send + Sync {
    /// Exchange credentials for a token and identity
    async fn login(&self, username: &str, password: &str) -> Result<LoginGrant>;

    /// Revoke a token
    async fn logout(&self, token: &str) -> Result<()>;

    /// Fetch the permission set of the token's user
    async fn fetch_permissions(&self, token: &str) -> Result<PermissionSet>;

    /// Register a callback run whenever the server rejects the session
    ///
    /// Clients without a session-level 401 leave this as a no-op.
    fn on_unauthorized(&self, _hook: UnauthorizedHook) {}
}

/// Callback run by the 401 interceptor after the session store is cleared
pub type UnauthorizedHook = Arc<dyn Fn() + Send + Sync>;

/// `reqwest`-backed console API client
pub struct HttpConsoleApi {
    client: reqwest::Client,
    base_url: String,
    session: Arc<dyn SessionStore>,
    unauthorized_hooks: RwLock<Vec<UnauthorizedHook>>,
}

impl HttpConsoleApi {
    /// Create a client for `base_url`
    ///
    /// `session` is the store cleared when the server answers 401.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        session: Arc<dyn SessionStore>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
            unauthorized_hooks: RwLock::new(Vec::new()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Global response interceptor
    ///
    /// `sent_token` is the token the request carried. A 401 for a token that
    /// has since been replaced in the store leaves the newer session alone.
    fn intercept(
        &self,
        response: reqwest::Response,
        sent_token: Option<&str>,
    ) -> Result<reqwest::Response> {
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let current = session::read_token(self.session.as_ref());
        match (sent_token, current.as_deref()) {
            (Some(sent), Some(current)) if sent != current => {
                warn!(
                    "{} answered 401 for a replaced token, keeping current session",
                    response.url().path()
                );
            }
            _ => {
                warn!("{} answered 401, clearing session", response.url().path());
                session::clear_session(self.session.as_ref())?;

                let hooks = self.unauthorized_hooks.read().clone();
                for hook in hooks {
                    hook();
                }
            }
        }

        Err(AccessError::Unauthorized)
    }

    async fn read_envelope<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
        sent_token: Option<&str>,
    ) -> Result<ApiEnvelope<T>> {
        let response = self.intercept(response, sent_token)?;
        let status = response.status();

        if !status.is_success() {
            return Err(AccessError::UnexpectedStatus(status.as_u16()));
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl ConsoleApi for HttpConsoleApi {
    async fn login(&self, username: &str, password: &str) -> Result<LoginGrant> {
        debug!("POST {} for {}", LOGIN_PATH, username);

        let response = self
            .client
            .post(self.url(LOGIN_PATH))
            .json(&LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;

        let envelope: ApiEnvelope<LoginGrant> = self.read_envelope(response, None).await?;

        match envelope {
            ApiEnvelope {
                code: CODE_OK,
                data: Some(grant),
                ..
            } => {
                info!("Login succeeded for {}", grant.user.display_name());
                Ok(grant)
            }
            other => Err(AccessError::LoginFailed {
                code: other.code,
                message: other.message.unwrap_or_else(|| "login rejected".to_string()),
            }),
        }
    }

    async fn logout(&self, token: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url(LOGOUT_PATH))
            .header(AUTHORIZATION, token)
            .send()
            .await?;

        let envelope: ApiEnvelope<serde_json::Value> =
            self.read_envelope(response, Some(token)).await?;

        if envelope.code != CODE_OK {
            warn!("Logout rejected: {}", envelope.describe());
        }

        Ok(())
    }

    async fn fetch_permissions(&self, token: &str) -> Result<PermissionSet> {
        debug!("GET {}", PERMISSIONS_PATH);

        let response = self
            .client
            .get(self.url(PERMISSIONS_PATH))
            .header(AUTHORIZATION, token)
            .send()
            .await?;

        let envelope: ApiEnvelope<PermissionSet> =
            self.read_envelope(response, Some(token)).await?;

        match envelope {
            ApiEnvelope {
                code: CODE_OK,
                data: Some(permissions),
                ..
            } => Ok(permissions),
            ApiEnvelope {
                code: CODE_OK,
                data: None,
                ..
            } => Err(AccessError::PermissionFetchFailed(
                "response carried no permission data".to_string(),
            )),
            other => Err(AccessError::PermissionFetchFailed(other.describe())),
        }
    }

    fn on_unauthorized(&self, hook: UnauthorizedHook) {
        self.unauthorized_hooks.write().push(hook);
    }
}
