//! Group-based authorization.
//!
//! Grants are `(group, resource_type, permission)` rows, optionally narrowed
//! to one `resource_key`. A user holds the union of the grants of every group
//! they belong to, plus the type-level grants of the guest group, which apply
//! to every caller.

pub mod engine;
pub mod identity;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use engine::{PermissionEngine, Visibility};
pub use identity::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    View,
    Create,
    Update,
    Delete,
}

impl Permission {
    pub const ALL: [Permission; 4] = [Permission::View, Permission::Create, Permission::Update, Permission::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::View => "view",
            Permission::Create => "create",
            Permission::Update => "update",
            Permission::Delete => "delete",
        }
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(Permission::View),
            "create" => Ok(Permission::Create),
            "update" => Ok(Permission::Update),
            "delete" => Ok(Permission::Delete),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PermissionSet {
    pub view: bool,
    pub create: bool,
    pub update: bool,
    pub delete: bool,
}

impl PermissionSet {
    pub fn set(&mut self, permission: Permission) {
        match permission {
            Permission::View => self.view = true,
            Permission::Create => self.create = true,
            Permission::Update => self.update = true,
            Permission::Delete => self.delete = true,
        }
    }
}

/// Per-record annotation: what the caller may do, and what an
/// unauthenticated caller may do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPermissions {
    pub active_user: PermissionSet,
    pub guest: PermissionSet,
}

/// One loaded grant row.
#[derive(Debug, Clone, PartialEq)]
pub struct GrantRow {
    pub resource_key: Option<Uuid>,
    pub resource_type: String,
    pub permission: Permission,
    /// Granted to the guest group rather than one of the caller's groups.
    pub guest: bool,
}

/// The grants relevant to one request, resolved in memory.
#[derive(Debug, Clone, Default)]
pub struct Grants {
    user_type: HashSet<(String, Permission)>,
    user_instance: HashSet<(Uuid, String, Permission)>,
    guest_type: HashSet<(String, Permission)>,
}

impl Grants {
    pub fn from_rows(rows: impl IntoIterator<Item = GrantRow>) -> Self {
        let mut grants = Grants::default();
        for row in rows {
            match (row.resource_key, row.guest) {
                (None, true) => {
                    grants.guest_type.insert((row.resource_type.clone(), row.permission));
                    grants.user_type.insert((row.resource_type, row.permission));
                }
                (None, false) => {
                    grants.user_type.insert((row.resource_type, row.permission));
                }
                (Some(key), false) => {
                    grants.user_instance.insert((key, row.resource_type, row.permission));
                }
                // Instance grants on the guest group are not honoured.
                (Some(_), true) => {}
            }
        }
        grants
    }

    pub fn allows_type(&self, resource_type: &str, permission: Permission) -> bool {
        self.user_type.contains(&(resource_type.to_string(), permission))
    }

    /// Type-level grant, or an instance grant on `key`. Instance grants only
    /// ever add rights.
    pub fn allows(&self, resource_type: &str, permission: Permission, key: Uuid) -> bool {
        self.allows_type(resource_type, permission)
            || self
                .user_instance
                .contains(&(key, resource_type.to_string(), permission))
    }

    pub fn guest_allows(&self, resource_type: &str, permission: Permission) -> bool {
        self.guest_type.contains(&(resource_type.to_string(), permission))
    }

    /// True when every `(resource_type, permission)` pair is granted at type level.
    pub fn authorize<'a>(&self, required: impl IntoIterator<Item = (&'a str, Permission)>) -> bool {
        required.into_iter().all(|(rt, p)| self.allows_type(rt, p))
    }

    pub fn annotate(&self, resource_type: &str, key: Uuid) -> RecordPermissions {
        let mut out = RecordPermissions::default();
        for permission in Permission::ALL {
            if self.allows(resource_type, permission, key) {
                out.active_user.set(permission);
            }
            if self.guest_allows(resource_type, permission) {
                out.guest.set(permission);
            }
        }
        out
    }
}
