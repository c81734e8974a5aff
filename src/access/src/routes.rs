//! Console route table
//!
//! Routes are declared as a tree of [`RouteDescriptor`]s and flattened into
//! a [`RouteTable`] keyed by full path. Children inherit the title and
//! permission of their parent unless they declare their own, and a parent
//! without an explicit redirect redirects to its first child.

use crate::error::{AccessError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Longest chain of route-level redirects followed during resolution
const MAX_ROUTE_REDIRECTS: usize = 8;

/// Declared route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDescriptor {
    /// Absolute for top-level routes, relative to the parent otherwise
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Menu permission path required to enter the route
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RouteDescriptor>,
}

impl RouteDescriptor {
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: Some(name.into()),
            title: None,
            permission: None,
            redirect: None,
            children: Vec::new(),
        }
    }

    /// Route without a name (layout or redirect-only node)
    pub fn anonymous(path: impl Into<String>) -> Self {
        Self {
            name: None,
            ..Self::new(path, "")
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.permission = Some(permission.into());
        self
    }

    pub fn redirect(mut self, redirect: impl Into<String>) -> Self {
        self.redirect = Some(redirect.into());
        self
    }

    pub fn children(mut self, children: Vec<RouteDescriptor>) -> Self {
        self.children = children;
        self
    }
}

/// A route flattened to its full path with inherited metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRoute {
    pub full_path: String,
    pub name: Option<String>,
    pub title: Option<String>,
    pub permission: Option<String>,
    pub redirect: Option<String>,
}

impl ResolvedRoute {
    /// Title for messages, falling back to the path
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.full_path)
    }
}

/// Flattened, path-indexed route table
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<ResolvedRoute>,
    by_path: HashMap<String, usize>,
}

impl RouteTable {
    /// Flatten a descriptor tree
    pub fn new(descriptors: &[RouteDescriptor]) -> Result<Self> {
        let mut table = Self {
            routes: Vec::new(),
            by_path: HashMap::new(),
        };

        for descriptor in descriptors {
            table.flatten(descriptor, None, None, None)?;
        }

        Ok(table)
    }

    /// Load a descriptor tree from a JSON file
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let descriptors: Vec<RouteDescriptor> = serde_json::from_str(&contents)?;
        Self::new(&descriptors)
    }

    fn flatten(
        &mut self,
        descriptor: &RouteDescriptor,
        parent_path: Option<&str>,
        inherited_title: Option<&str>,
        inherited_permission: Option<&str>,
    ) -> Result<()> {
        let full_path = join_path(parent_path, &descriptor.path);

        let title = descriptor.title.as_deref().or(inherited_title);
        let permission = descriptor.permission.as_deref().or(inherited_permission);

        let redirect = match (&descriptor.redirect, descriptor.children.first()) {
            (Some(redirect), _) => Some(join_path(parent_path, redirect)),
            (None, Some(first)) => Some(join_path(Some(&full_path), &first.path)),
            (None, None) => None,
        };

        if self.by_path.contains_key(&full_path) {
            return Err(AccessError::Config(format!("duplicate route path {}", full_path)));
        }

        self.by_path.insert(full_path.clone(), self.routes.len());
        self.routes.push(ResolvedRoute {
            full_path: full_path.clone(),
            name: descriptor.name.clone().filter(|n| !n.is_empty()),
            title: title.map(str::to_string),
            permission: permission.map(str::to_string),
            redirect,
        });

        for child in &descriptor.children {
            self.flatten(child, Some(&full_path), title, permission)?;
        }

        Ok(())
    }

    /// Exact lookup without following redirects
    pub fn get(&self, path: &str) -> Option<&ResolvedRoute> {
        self.by_path
            .get(&normalize_path(path))
            .map(|&idx| &self.routes[idx])
    }

    pub fn by_name(&self, name: &str) -> Option<&ResolvedRoute> {
        self.routes.iter().find(|r| r.name.as_deref() == Some(name))
    }

    /// Look up `path` and follow route-level redirects to the final route
    ///
    /// Returns `None` for unknown paths and for redirect cycles.
    pub fn resolve(&self, path: &str) -> Option<&ResolvedRoute> {
        let mut current = self.get(path)?;
        let mut seen = HashSet::new();

        while let Some(target) = &current.redirect {
            if !seen.insert(current.full_path.as_str()) || seen.len() > MAX_ROUTE_REDIRECTS {
                return None;
            }
            current = self.get(target)?;
        }

        Some(current)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedRoute> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Strip query/fragment and trailing slashes; keep `/` for the root
pub fn normalize_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or("");
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

fn join_path(parent: Option<&str>, path: &str) -> String {
    if path.starts_with('/') {
        return normalize_path(path);
    }
    match parent {
        Some(parent) => normalize_path(&format!("{}/{}", parent.trim_end_matches('/'), path)),
        None => normalize_path(path),
    }
}

/// Route tree of the CI/CD console
pub fn console_routes() -> Vec<RouteDescriptor> {
    vec![
        RouteDescriptor::new("/login", "login").title("Login"),
        RouteDescriptor::anonymous("/")
            .redirect("/dashboard")
            .children(vec![
                RouteDescriptor::new("dashboard", "dashboard")
                    .title("Dashboard")
                    .permission("/dashboard"),
                RouteDescriptor::new("projects", "projects")
                    .title("Projects")
                    .permission("/projects")
                    .redirect("/projects/list")
                    .children(vec![
                        RouteDescriptor::new("list", "project-list")
                            .title("Project List")
                            .permission("/projects/list"),
                        RouteDescriptor::new("detail", "project-detail")
                            .title("Project Detail")
                            .permission("/projects/list"),
                    ]),
                RouteDescriptor::new("build", "build")
                    .title("Build & Deploy")
                    .permission("/build")
                    .redirect("/build/tasks")
                    .children(vec![
                        RouteDescriptor::new("tasks", "build-tasks")
                            .title("Build Tasks")
                            .permission("/build/tasks"),
                        RouteDescriptor::new("tasks/detail", "build-task-detail")
                            .title("Task Detail")
                            .permission("/build/tasks"),
                        RouteDescriptor::new("tasks/create", "build-task-create")
                            .title("New Build Task")
                            .permission("/build/tasks"),
                        RouteDescriptor::new("tasks/edit", "build-task-edit")
                            .title("Edit Build Task")
                            .permission("/build/tasks"),
                        RouteDescriptor::new("tasks/copy", "build-task-copy")
                            .title("Copy Build Task")
                            .permission("/build/tasks"),
                        RouteDescriptor::new("history", "build-history")
                            .title("Build History")
                            .permission("/build/history"),
                    ]),
                RouteDescriptor::new("logs", "logs")
                    .title("Logs & Monitoring")
                    .permission("/logs")
                    .redirect("/logs/login")
                    .children(vec![
                        RouteDescriptor::new("login", "login-logs")
                            .title("Login Logs")
                            .permission("/logs/login"),
                        RouteDescriptor::new("login/detail", "login-log-detail")
                            .title("Login Log Detail")
                            .permission("/logs/login"),
                    ]),
                RouteDescriptor::new("user", "user")
                    .title("Users & Roles")
                    .permission("/user")
                    .redirect("/user/list")
                    .children(vec![
                        RouteDescriptor::new("list", "user-list")
                            .title("User Management")
                            .permission("/user/list"),
                        RouteDescriptor::new("role", "user-role")
                            .title("Role Management")
                            .permission("/user/role"),
                    ]),
                RouteDescriptor::new("credentials", "credentials")
                    .title("Credentials")
                    .permission("/credentials"),
                RouteDescriptor::new("environments", "environments")
                    .title("Environments")
                    .permission("/environments")
                    .redirect("/environments/list")
                    .children(vec![
                        RouteDescriptor::new("list", "environment-list")
                            .title("Environment List")
                            .permission("/environments/list"),
                        RouteDescriptor::new("detail", "environment-detail")
                            .title("Environment Detail")
                            .permission("/environments/list"),
                    ]),
                RouteDescriptor::new("system", "system")
                    .title("System Settings")
                    .permission("/system")
                    .redirect("/system/basic")
                    .children(vec![RouteDescriptor::new("basic", "system-basic")
                        .title("Basic Settings")
                        .permission("/system/basic")]),
            ]),
    ]
}

/// Console route table
pub fn console_route_table() -> Result<RouteTable> {
    RouteTable::new(&console_routes())
}
