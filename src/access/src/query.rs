//! Permission predicates over cached state
//!
//! Every predicate is fail-closed: an uninitialized state denies everything
//! and permitted-entity queries return an empty list.

use crate::cache::PermissionState;
use crate::notify::permission_error_message;
use crate::types::{EntityRef, Permitted, ScopeKind};
use std::fmt;

/// Whether a permission path names a sub-menu
///
/// Splitting on `/` keeps the leading empty segment, so `/build` has two
/// parts and `/build/tasks` has three.
pub fn is_sub_menu_path(permission: &str) -> bool {
    permission.split('/').count() > 2
}

impl PermissionState {
    /// Exact menu grant; administrators pass every menu
    pub fn has_menu_permission(&self, path: &str, is_admin: bool) -> bool {
        if !self.initialized {
            return false;
        }
        if is_admin {
            return true;
        }
        self.permissions.menu.contains(path)
    }

    /// `parent` itself is granted, or some granted path lies strictly under
    /// `parent + "/"`
    ///
    /// Plain string prefixing: no segment canonicalization is applied.
    pub fn has_any_sub_menu_permission(&self, parent: &str, is_admin: bool) -> bool {
        if !self.initialized {
            return false;
        }
        if is_admin {
            return true;
        }
        if self.permissions.menu.contains(parent) {
            return true;
        }

        let prefix = format!("{}/", parent);
        self.permissions
            .menu
            .iter()
            .any(|granted| granted != parent && granted.starts_with(&prefix))
    }

    /// Action granted within a module; a missing module grants nothing
    pub fn has_function_permission(&self, module: &str, action: &str) -> bool {
        if !self.initialized {
            return false;
        }
        self.permissions
            .function
            .get(module)
            .map(|actions| actions.contains(action))
            .unwrap_or(false)
    }

    pub fn has_project_permission(&self, project_id: &str) -> bool {
        if !self.initialized {
            return false;
        }
        let data = &self.permissions.data;
        match data.project_scope {
            ScopeKind::All => true,
            ScopeKind::Custom => data.project_ids.contains(project_id),
        }
    }

    pub fn has_environment_permission(&self, environment_type: &str) -> bool {
        if !self.initialized {
            return false;
        }
        let data = &self.permissions.data;
        match data.environment_scope {
            ScopeKind::All => true,
            ScopeKind::Custom => data.environment_types.contains(environment_type),
        }
    }

    pub fn permitted_project_ids(&self) -> Permitted<String> {
        if !self.initialized {
            return Permitted::Only(Vec::new());
        }
        let data = &self.permissions.data;
        match data.project_scope {
            ScopeKind::All => Permitted::Unrestricted,
            ScopeKind::Custom => Permitted::Only(data.project_ids.iter().cloned().collect()),
        }
    }

    pub fn permitted_environment_types(&self) -> Permitted<String> {
        if !self.initialized {
            return Permitted::Only(Vec::new());
        }
        let data = &self.permissions.data;
        match data.environment_scope {
            ScopeKind::All => Permitted::Unrestricted,
            ScopeKind::Custom => {
                Permitted::Only(data.environment_types.iter().cloned().collect())
            }
        }
    }

    /// Function grant AND, when an entity is given, its data-scope grant
    pub fn evaluate_check(
        &self,
        module: &str,
        action: &str,
        entity: Option<EntityRef<'_>>,
    ) -> Result<(), CheckDenial> {
        if !self.has_function_permission(module, action) {
            return Err(CheckDenial::Function {
                module: module.to_string(),
                action: action.to_string(),
            });
        }

        match entity {
            Some(EntityRef::Project(id)) if !self.has_project_permission(id) => {
                Err(CheckDenial::Project(id.to_string()))
            }
            Some(EntityRef::Environment(env)) if !self.has_environment_permission(env) => {
                Err(CheckDenial::Environment(env.to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// Why a composite permission check failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckDenial {
    Function { module: String, action: String },
    Project(String),
    Environment(String),
}

impl CheckDenial {
    /// Message shown to the user
    pub fn message(&self) -> String {
        match self {
            CheckDenial::Function { module, action } => permission_error_message(module, action),
            CheckDenial::Project(_) => "You do not have access to this project".to_string(),
            CheckDenial::Environment(_) => {
                "You do not have access to this environment".to_string()
            }
        }
    }
}

impl fmt::Display for CheckDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckDenial::Function { module, action } => write!(f, "missing {}:{}", module, action),
            CheckDenial::Project(id) => write!(f, "project {} out of scope", id),
            CheckDenial::Environment(env) => write!(f, "environment {} out of scope", env),
        }
    }
}
