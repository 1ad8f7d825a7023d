use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_core::{AppError, AppResult};

use crate::permission::PermissionRegistry;

/// Built-in roles that cannot be changed or deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemRole {
    /// Full access; implicitly holds every registered permission.
    Admin,
    /// Manages users and reports.
    Manager,
    /// Regular account.
    User,
    /// Read-only account.
    Viewer,
}

impl SystemRole {
    /// Returns a stable storage value, also used as the role id.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::User => "user",
            Self::Viewer => "viewer",
        }
    }

    /// Returns all system roles.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[SystemRole] = &[
            SystemRole::Admin,
            SystemRole::Manager,
            SystemRole::User,
            SystemRole::Viewer,
        ];

        ALL
    }

    /// Returns the display name.
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Admin => "Administrator",
            Self::Manager => "Manager",
            Self::User => "User",
            Self::Viewer => "Viewer",
        }
    }

    /// Resolves the static permission table for this role.
    ///
    /// Ids missing from the registry are dropped so a trimmed registry
    /// never grants unknown permissions.
    #[must_use]
    pub fn permissions(&self, registry: &PermissionRegistry) -> BTreeSet<String> {
        match self {
            Self::Admin => registry.ids().map(str::to_owned).collect(),
            Self::Manager => filter_known(registry, MANAGER_PERMISSIONS),
            Self::User => filter_known(registry, USER_PERMISSIONS),
            Self::Viewer => filter_known(registry, VIEWER_PERMISSIONS),
        }
    }
}

impl FromStr for SystemRole {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "admin" => Ok(Self::Admin),
            "manager" => Ok(Self::Manager),
            "user" => Ok(Self::User),
            "viewer" => Ok(Self::Viewer),
            _ => Err(AppError::Validation(format!(
                "unknown system role '{value}'"
            ))),
        }
    }
}

const MANAGER_PERMISSIONS: &[&str] = &[
    "users.create",
    "users.read",
    "users.update",
    "roles.read",
    "roles.assign",
    "permissions.read",
    "dashboard.read",
    "reports.read",
    "reports.export",
    "audit.read",
    "profile.read",
    "profile.update",
];

const USER_PERMISSIONS: &[&str] = &[
    "dashboard.read",
    "reports.read",
    "profile.read",
    "profile.update",
];

const VIEWER_PERMISSIONS: &[&str] = &["dashboard.read", "reports.read", "profile.read"];

fn filter_known(registry: &PermissionRegistry, ids: &[&str]) -> BTreeSet<String> {
    ids.iter()
        .filter(|id| registry.contains(id))
        .map(|id| (*id).to_owned())
        .collect()
}

/// Role definition held by the role registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    /// Stable role identifier.
    pub id: String,
    /// Unique role name.
    pub name: String,
    /// Optional description for administrators.
    pub description: Option<String>,
    /// Permission ids granted by the role.
    pub permissions: BTreeSet<String>,
    /// System roles are immutable.
    pub is_system: bool,
    /// Inactive roles grant nothing.
    pub is_active: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Role {
    /// Materializes a system role from the static table.
    #[must_use]
    pub fn system(role: SystemRole, registry: &PermissionRegistry, now: DateTime<Utc>) -> Self {
        Self {
            id: role.as_str().to_owned(),
            name: role.as_str().to_owned(),
            description: Some(role.display_name().to_owned()),
            permissions: role.permissions(registry),
            is_system: true,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns whether the role grants a permission id.
    #[must_use]
    pub fn grants(&self, permission_id: &str) -> bool {
        self.is_active && self.permissions.contains(permission_id)
    }

    /// Rejects mutation of system roles.
    pub fn ensure_mutable(&self) -> AppResult<()> {
        if self.is_system {
            return Err(AppError::Forbidden(format!(
                "system role '{}' cannot be modified",
                self.name
            )));
        }

        Ok(())
    }
}

/// Role reference carried on a user.
///
/// The remote API sends either a bare role id or a hydrated role with its
/// permissions; both shapes deserialize into this enum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoleRef {
    /// Reference by role id or system role name.
    Id(String),
    /// Hydrated role with its grants.
    Full {
        /// Role name.
        name: String,
        /// Permission ids granted by the role.
        #[serde(default)]
        permissions: Vec<String>,
    },
}

impl RoleRef {
    /// Builds a hydrated reference from a role definition.
    #[must_use]
    pub fn full(role: &Role) -> Self {
        let permissions = if role.is_active {
            role.permissions.iter().cloned().collect()
        } else {
            Vec::new()
        };

        Self::Full {
            name: role.name.clone(),
            permissions,
        }
    }

    /// Returns the id or name used to address the role.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Id(id) => id.as_str(),
            Self::Full { name, .. } => name.as_str(),
        }
    }

    /// Returns embedded permissions for hydrated references.
    #[must_use]
    pub fn embedded_permissions(&self) -> Option<&[String]> {
        match self {
            Self::Id(_) => None,
            Self::Full { permissions, .. } => Some(permissions.as_slice()),
        }
    }
}

/// Link between a user and a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignment {
    /// Assigned user.
    pub user_id: String,
    /// Assigned role.
    pub role_id: String,
    /// Subject that made the assignment.
    pub assigned_by: String,
    /// Assignment timestamp.
    pub assigned_at: DateTime<Utc>,
    /// Optional expiry.
    pub expires_at: Option<DateTime<Utc>>,
}

impl RoleAssignment {
    /// Returns whether the assignment has lapsed.
    ///
    /// An assignment is valid while `now < expires_at`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

/// Kind of change recorded in the assignment audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentEventKind {
    /// Role assigned to a user.
    Assigned,
    /// Role removed by an administrator.
    Removed,
    /// Assignment evicted after its expiry.
    Expired,
}

impl AssignmentEventKind {
    /// Returns a stable storage value for this event kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assigned => "security.role.assigned",
            Self::Removed => "security.role.removed",
            Self::Expired => "security.role.expired",
        }
    }
}

/// Audit trail entry for role assignment changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentEvent {
    /// Affected user.
    pub user_id: String,
    /// Affected role.
    pub role_id: String,
    /// What happened.
    pub kind: AssignmentEventKind,
    /// Subject that caused the change; `system` for expiry eviction.
    pub actor: String,
    /// When the change happened.
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{Role, RoleAssignment, RoleRef, SystemRole};
    use crate::permission::PermissionRegistry;

    #[test]
    fn admin_holds_every_registered_permission() {
        let registry = PermissionRegistry::seeded().unwrap_or_default();
        let admin = SystemRole::Admin.permissions(&registry);

        assert_eq!(admin.len(), registry.len());
        for role in [SystemRole::Manager, SystemRole::User, SystemRole::Viewer] {
            assert!(role.permissions(&registry).is_subset(&admin));
        }
    }

    #[test]
    fn viewer_cannot_update_profile() {
        let registry = PermissionRegistry::seeded().unwrap_or_default();
        let viewer = SystemRole::Viewer.permissions(&registry);
        assert!(viewer.contains("profile.read"));
        assert!(!viewer.contains("profile.update"));
    }

    #[test]
    fn system_role_rejects_mutation() {
        let registry = PermissionRegistry::seeded().unwrap_or_default();
        let role = Role::system(SystemRole::Manager, &registry, Utc::now());
        assert!(role.ensure_mutable().is_err());
    }

    #[test]
    fn assignment_expires_at_boundary() {
        let now = Utc::now();
        let assignment = RoleAssignment {
            user_id: "u-1".to_owned(),
            role_id: "auditor".to_owned(),
            assigned_by: "admin".to_owned(),
            assigned_at: now - Duration::hours(1),
            expires_at: Some(now),
        };

        assert!(assignment.is_expired_at(now));
        assert!(!assignment.is_expired_at(now - Duration::seconds(1)));
    }

    proptest::proptest! {
        #[test]
        fn assignment_is_expired_exactly_from_expiry_on(offset_seconds in -86_400_i64..86_400) {
            let expires_at = Utc::now();
            let assignment = RoleAssignment {
                user_id: "u-1".to_owned(),
                role_id: "auditor".to_owned(),
                assigned_by: "admin".to_owned(),
                assigned_at: expires_at - Duration::days(2),
                expires_at: Some(expires_at),
            };

            let probe = expires_at + Duration::seconds(offset_seconds);
            proptest::prop_assert_eq!(assignment.is_expired_at(probe), offset_seconds >= 0);
        }
    }

    #[test]
    fn role_ref_accepts_both_wire_shapes() {
        let parsed: Result<Vec<RoleRef>, _> = serde_json::from_str(
            r#"["admin", {"name": "auditor", "permissions": ["audit.read"]}]"#,
        );
        let Ok(parsed) = parsed else {
            panic!("role refs should deserialize");
        };

        assert_eq!(parsed[0], RoleRef::Id("admin".to_owned()));
        assert_eq!(parsed[1].name(), "auditor");
        assert_eq!(
            parsed[1].embedded_permissions(),
            Some(["audit.read".to_owned()].as_slice())
        );
    }
}
