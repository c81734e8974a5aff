//! Console client configuration

use crate::error::{AccessError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Base URL of the console API (e.g. "http://127.0.0.1:8000")
    pub api_base_url: String,

    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,

    /// Where the CLI persists `token` and `user_info`
    pub session_file: PathBuf,

    /// Route that never requires a session
    pub login_route: String,

    /// Route used after login and after a permission denial
    pub home_route: String,

    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,

    /// Optional JSON route table replacing the built-in one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routes_file: Option<PathBuf>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000".to_string(),
            request_timeout_ms: 10_000,
            session_file: PathBuf::from(".console-session.json"),
            login_route: "/login".to_string(),
            home_route: "/dashboard".to_string(),
            log_level: "info".to_string(),
            routes_file: None,
        }
    }
}

impl ConsoleConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AccessError::Config(format!("failed to read {}: {}", path.as_ref().display(), e))
        })?;

        toml::from_str(&contents).map_err(|e| {
            AccessError::Config(format!("failed to parse {}: {}", path.as_ref().display(), e))
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://") {
            return Err(AccessError::Config(format!(
                "api_base_url must be an http(s) URL, got '{}'",
                self.api_base_url
            )));
        }

        if self.request_timeout_ms == 0 {
            return Err(AccessError::Config(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }

        for (field, route) in [("login_route", &self.login_route), ("home_route", &self.home_route)] {
            if !route.starts_with('/') {
                return Err(AccessError::Config(format!(
                    "{} must start with '/', got '{}'",
                    field, route
                )));
            }
        }

        if self.login_route == self.home_route {
            return Err(AccessError::Config(
                "login_route and home_route must differ".to_string(),
            ));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(ConsoleConfig::default().validate().is_ok());
    }

    #[test]
    fn test_load_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.toml");
        std::fs::write(
            &path,
            "api_base_url = \"https://ci.example.com\"\nrequest_timeout_ms = 2500\n",
        )
        .unwrap();

        let config = ConsoleConfig::load(&path).unwrap();
        assert_eq!(config.api_base_url, "https://ci.example.com");
        assert_eq!(config.request_timeout(), Duration::from_millis(2500));
        assert_eq!(config.login_route, "/login");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = ConsoleConfig {
            api_base_url: "ftp://ci".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ConsoleConfig {
            home_route: "dashboard".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ConsoleConfig {
            home_route: "/login".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            ConsoleConfig::load("/definitely/not/here.toml"),
            Err(AccessError::Config(_))
        ));
    }
}
