use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tessera_core::{AppError, AppResult, NonEmptyString};

/// Extra constraint a permission places on the resource being accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionCondition {
    /// The acting user must own the resource.
    Owner,
}

impl PermissionCondition {
    /// Returns a stable storage value for this condition.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
        }
    }
}

impl FromStr for PermissionCondition {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "owner" => Ok(Self::Owner),
            _ => Err(AppError::Validation(format!(
                "unknown permission condition '{value}'"
            ))),
        }
    }
}

/// Permission definition addressed by its `resource.action` id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    id: String,
    name: String,
    resource: String,
    action: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    conditions: Vec<PermissionCondition>,
}

impl Permission {
    /// Creates a permission; the id is composed from resource and action.
    pub fn new(
        resource: impl Into<String>,
        action: impl Into<String>,
        name: impl Into<String>,
    ) -> AppResult<Self> {
        let resource = NonEmptyString::new(resource)?;
        let action = NonEmptyString::new(action)?;
        let name = NonEmptyString::new(name)?;

        if resource.as_str().contains('.') || action.as_str().contains('.') {
            return Err(AppError::Validation(
                "permission resource and action must not contain '.'".to_owned(),
            ));
        }

        Ok(Self {
            id: compose_permission_id(resource.as_str(), action.as_str()),
            name: name.into(),
            resource: resource.into(),
            action: action.into(),
            conditions: Vec::new(),
        })
    }

    /// Attaches a condition evaluated on resource access checks.
    #[must_use]
    pub fn with_condition(mut self, condition: PermissionCondition) -> Self {
        if !self.conditions.contains(&condition) {
            self.conditions.push(condition);
        }
        self
    }

    /// Returns the `resource.action` id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Returns the human-readable name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the protected resource.
    #[must_use]
    pub fn resource(&self) -> &str {
        self.resource.as_str()
    }

    /// Returns the action on the resource.
    #[must_use]
    pub fn action(&self) -> &str {
        self.action.as_str()
    }

    /// Returns declared conditions.
    #[must_use]
    pub fn conditions(&self) -> &[PermissionCondition] {
        &self.conditions
    }
}

/// Builds the canonical permission id for a resource and action.
#[must_use]
pub fn compose_permission_id(resource: &str, action: &str) -> String {
    format!("{resource}.{action}")
}

/// Registry of every permission the application knows about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionRegistry {
    permissions: BTreeMap<String, Permission>,
}

impl PermissionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates the registry seeded with the built-in permission set.
    pub fn seeded() -> AppResult<Self> {
        let mut registry = Self::empty();
        for (resource, action, name, owner_only) in SEEDED_PERMISSIONS {
            let mut permission = Permission::new(*resource, *action, *name)?;
            if *owner_only {
                permission = permission.with_condition(PermissionCondition::Owner);
            }
            registry.register(permission)?;
        }

        Ok(registry)
    }

    /// Adds a permission; ids must be unique.
    pub fn register(&mut self, permission: Permission) -> AppResult<()> {
        if self.permissions.contains_key(permission.id()) {
            return Err(AppError::Conflict(format!(
                "permission '{}' is already registered",
                permission.id()
            )));
        }

        self.permissions
            .insert(permission.id().to_owned(), permission);
        Ok(())
    }

    /// Looks up a permission by id.
    #[must_use]
    pub fn get(&self, permission_id: &str) -> Option<&Permission> {
        self.permissions.get(permission_id)
    }

    /// Returns whether the id is registered.
    #[must_use]
    pub fn contains(&self, permission_id: &str) -> bool {
        self.permissions.contains_key(permission_id)
    }

    /// Iterates over registered ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.permissions.keys().map(String::as_str)
    }

    /// Iterates over registered permissions in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.permissions.values()
    }

    /// Returns the number of registered permissions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    /// Returns whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }
}

/// (resource, action, name, owner-only)
const SEEDED_PERMISSIONS: &[(&str, &str, &str, bool)] = &[
    ("users", "create", "Create users", false),
    ("users", "read", "View users", false),
    ("users", "update", "Edit users", false),
    ("users", "delete", "Delete users", false),
    ("roles", "create", "Create roles", false),
    ("roles", "read", "View roles", false),
    ("roles", "update", "Edit roles", false),
    ("roles", "delete", "Delete roles", false),
    ("roles", "assign", "Assign roles to users", false),
    ("permissions", "read", "View permissions", false),
    ("dashboard", "read", "View dashboard", false),
    ("reports", "read", "View reports", false),
    ("reports", "export", "Export reports", false),
    ("settings", "read", "View settings", false),
    ("settings", "update", "Change settings", false),
    ("audit", "read", "View audit log", false),
    ("profile", "read", "View own profile", true),
    ("profile", "update", "Edit own profile", true),
];
