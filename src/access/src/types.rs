//! Core permission and identity types

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};

/// Menu permission path (e.g. "/build/tasks")
pub type MenuPath = String;

/// Module name used by function permissions (e.g. "build")
pub type ModuleName = String;

/// Action name used by function permissions (e.g. "deploy")
pub type ActionName = String;

/// Identity persisted under the `user_info` session key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// User identifier; numeric IDs are normalized to strings
    #[serde(default, deserialize_with = "loose_id")]
    pub user_id: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub is_admin: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl UserIdentity {
    /// Create an identity with only a user ID
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_admin: false,
            username: None,
            name: None,
            email: None,
        }
    }

    /// Mark the identity as an administrator
    pub fn admin(mut self) -> Self {
        self.is_admin = true;
        self
    }

    /// Attach a username
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// An identity without a user ID counts as absent
    pub fn has_user_id(&self) -> bool {
        !self.user_id.is_empty()
    }

    /// Name to show in messages and logs
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.username.as_deref())
            .unwrap_or(&self.user_id)
    }
}

/// Whether a data scope covers everything or an explicit subset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopeKind {
    /// Every entity of the kind
    #[default]
    All,
    /// Only the listed entities ("custom" on the wire, "subset" accepted)
    Custom,
}

impl Serialize for ScopeKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(match self {
            ScopeKind::All => "all",
            ScopeKind::Custom => "custom",
        })
    }
}

impl<'de> Deserialize<'de> for ScopeKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(match raw.as_deref() {
            None | Some("all") => ScopeKind::All,
            Some(_) => ScopeKind::Custom,
        })
    }
}

/// Data-scope permissions
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataPermissions {
    #[serde(default)]
    pub project_scope: ScopeKind,

    #[serde(default, deserialize_with = "loose_id_set")]
    pub project_ids: BTreeSet<String>,

    #[serde(default)]
    pub environment_scope: ScopeKind,

    #[serde(default, deserialize_with = "null_as_default")]
    pub environment_types: BTreeSet<String>,
}

impl DataPermissions {
    /// Restrict projects to the given IDs
    pub fn with_projects<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.project_scope = ScopeKind::Custom;
        self.project_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Restrict environments to the given types
    pub fn with_environments<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.environment_scope = ScopeKind::Custom;
        self.environment_types = types.into_iter().map(Into::into).collect();
        self
    }
}

/// Permission payload returned by `GET /api/user/permissions`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PermissionSet {
    #[serde(default, deserialize_with = "null_as_default")]
    pub menu: BTreeSet<MenuPath>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub function: BTreeMap<ModuleName, BTreeSet<ActionName>>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub data: DataPermissions,
}

impl PermissionSet {
    /// Create an empty permission set
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant a menu path
    pub fn with_menu(mut self, path: impl Into<String>) -> Self {
        self.menu.insert(path.into());
        self
    }

    /// Grant an action within a module
    pub fn with_function(mut self, module: impl Into<String>, action: impl Into<String>) -> Self {
        self.function
            .entry(module.into())
            .or_default()
            .insert(action.into());
        self
    }

    /// Replace the data-scope permissions
    pub fn with_data(mut self, data: DataPermissions) -> Self {
        self.data = data;
        self
    }
}

/// Result of a "which entities may I see" query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Permitted<T> {
    /// Scope is "all": no filtering applies
    Unrestricted,
    /// Only these entities; empty means no access at all
    Only(Vec<T>),
}

impl<T: PartialEq> Permitted<T> {
    /// Whether the given entity passes this filter
    pub fn allows(&self, item: &T) -> bool {
        match self {
            Permitted::Unrestricted => true,
            Permitted::Only(items) => items.contains(item),
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self, Permitted::Unrestricted)
    }
}

/// Entity targeted by a composite permission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef<'a> {
    Project(&'a str),
    Environment(&'a str),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LooseId {
    Text(String),
    Number(i64),
}

impl From<LooseId> for String {
    fn from(id: LooseId) -> Self {
        match id {
            LooseId::Text(s) => s,
            LooseId::Number(n) => n.to_string(),
        }
    }
}

fn loose_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<LooseId>::deserialize(deserializer)?
        .map(String::from)
        .unwrap_or_default())
}

fn loose_id_set<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeSet<String>, D::Error> {
    let ids = Option::<Vec<LooseId>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(ids.into_iter().map(String::from).collect())
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
