//! User-visible transient notifications

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// A message shown to the user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Sink for user-visible messages
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NoticeLevel, message: &str);

    fn error(&self, message: &str) {
        self.notify(NoticeLevel::Error, message);
    }

    fn success(&self, message: &str) {
        self.notify(NoticeLevel::Success, message);
    }
}

/// Writes notifications to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Error => error!(target: "console::notice", "{}", message),
            NoticeLevel::Warning => warn!(target: "console::notice", "{}", message),
            NoticeLevel::Success | NoticeLevel::Info => info!(target: "console::notice", "{}", message),
        }
    }
}

/// Keeps every notification for later inspection
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// All notices, oldest first
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    /// Messages of error-level notices, oldest first
    pub fn errors(&self) -> Vec<String> {
        self.notices
            .lock()
            .iter()
            .filter(|n| n.level == NoticeLevel::Error)
            .map(|n| n.message.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.notices.lock().clear();
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        self.notices.lock().push(Notice {
            level,
            message: message.to_string(),
            at: Utc::now(),
        });
    }
}

fn action_label(action: &str) -> &str {
    match action {
        "view" => "view",
        "create" => "create",
        "edit" => "edit",
        "delete" => "delete",
        "execute" => "execute",
        "deploy" => "deploy",
        "rollback" => "roll back",
        "approve" => "approve",
        "test" => "test",
        "view_log" => "view logs of",
        "disable" => "disable or enable",
        other => other,
    }
}

fn module_label(module: &str) -> &str {
    match module {
        "project" => "projects",
        "build" | "build_task" => "build tasks",
        "build_history" => "build history",
        "environment" => "environments",
        "credential" => "credentials",
        "user" => "users",
        "role" => "roles",
        "notification" => "notifications",
        other => other,
    }
}

/// Message shown when a function permission is missing
pub fn permission_error_message(module: &str, action: &str) -> String {
    if module.is_empty() || action.is_empty() {
        return "You do not have permission to perform this action".to_string();
    }
    format!(
        "You do not have permission to {} {}",
        action_label(action),
        module_label(module)
    )
}

/// Message shown when navigation to a route is denied
pub fn route_denied_message(title: Option<&str>) -> String {
    format!(
        "You do not have permission to access {}",
        title.unwrap_or("this page")
    )
}
