use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::Arc;

use tessera_domain::{
    AccessConditions, AccessDecision, AuthUser, PermissionCondition, PermissionRegistry, RoleRef,
    SystemRole, compose_permission_id,
};

/// Application service answering "can this user do X".
///
/// Every check is a pure function of the user and the registries held here.
/// Unknown permission ids are denied, never errors.
#[derive(Clone)]
pub struct PermissionService {
    registry: Arc<PermissionRegistry>,
    system_grants: Arc<HashMap<SystemRole, BTreeSet<String>>>,
}

impl PermissionService {
    /// Creates a permission service over a registry.
    #[must_use]
    pub fn new(registry: Arc<PermissionRegistry>) -> Self {
        let system_grants = SystemRole::all()
            .iter()
            .map(|role| (*role, role.permissions(&registry)))
            .collect();

        Self {
            registry,
            system_grants: Arc::new(system_grants),
        }
    }

    /// Returns the permission registry.
    #[must_use]
    pub fn registry(&self) -> &PermissionRegistry {
        &self.registry
    }

    /// Checks one permission id.
    #[must_use]
    pub fn check_permission(&self, permission_id: &str, user: Option<&AuthUser>) -> AccessDecision {
        if !self.registry.contains(permission_id) {
            return AccessDecision::denied(format!("unknown permission '{permission_id}'"));
        }

        let Some(user) = user else {
            return AccessDecision::denied("authentication required");
        };

        if !user.is_active {
            return AccessDecision::denied("user account is inactive");
        }

        if self.user_grants(user, permission_id) {
            AccessDecision::granted()
        } else {
            AccessDecision::denied(format!("missing permission '{permission_id}'"))
        }
    }

    /// Grants only when every id is granted; reports the first denial.
    #[must_use]
    pub fn check_permissions(&self, permission_ids: &[&str], user: Option<&AuthUser>) -> AccessDecision {
        if permission_ids.is_empty() {
            return AccessDecision::denied("no permissions requested");
        }

        for permission_id in permission_ids {
            let decision = self.check_permission(permission_id, user);
            if !decision.granted {
                return decision;
            }
        }

        AccessDecision::granted()
    }

    /// Grants when at least one id is granted.
    #[must_use]
    pub fn check_any_permission(
        &self,
        permission_ids: &[&str],
        user: Option<&AuthUser>,
    ) -> AccessDecision {
        if permission_ids.is_empty() {
            return AccessDecision::denied("no permissions requested");
        }

        if permission_ids
            .iter()
            .any(|permission_id| self.check_permission(permission_id, user).granted)
        {
            return AccessDecision::granted();
        }

        AccessDecision::denied(format!(
            "none of the permissions [{}] are granted",
            permission_ids.join(", ")
        ))
    }

    /// Checks `resource.action` and then the permission's declared conditions.
    #[must_use]
    pub fn check_resource_access(
        &self,
        resource: &str,
        action: &str,
        user: Option<&AuthUser>,
        conditions: Option<&AccessConditions>,
    ) -> AccessDecision {
        let permission_id = compose_permission_id(resource, action);
        let decision = self.check_permission(&permission_id, user);
        if !decision.granted {
            return decision;
        }

        let (Some(permission), Some(user)) = (self.registry.get(&permission_id), user) else {
            return AccessDecision::denied(format!("unknown permission '{permission_id}'"));
        };

        for condition in permission.conditions() {
            match condition {
                PermissionCondition::Owner => {
                    let owner_id = conditions.and_then(|value| value.owner_id.as_deref());
                    match owner_id {
                        None => {
                            return AccessDecision::denied(format!(
                                "permission '{permission_id}' requires a resource owner"
                            ));
                        }
                        Some(owner_id) if owner_id != user.id => {
                            return AccessDecision::denied(format!(
                                "permission '{permission_id}' only applies to the resource owner"
                            ));
                        }
                        Some(_) => {}
                    }
                }
            }
        }

        AccessDecision::granted()
    }

    /// Returns every registered permission id the user holds.
    #[must_use]
    pub fn effective_permissions(&self, user: &AuthUser) -> BTreeSet<String> {
        if !user.is_active {
            return BTreeSet::new();
        }

        self.registry
            .ids()
            .filter(|permission_id| self.user_grants(user, permission_id))
            .map(str::to_owned)
            .collect()
    }

    /// Returns whether the user carries a role by id or name.
    #[must_use]
    pub fn has_role(&self, user: Option<&AuthUser>, role: &str) -> bool {
        user.is_some_and(|user| user.is_active && user.has_role(role))
    }

    fn user_grants(&self, user: &AuthUser, permission_id: &str) -> bool {
        user.has_direct_permission(permission_id)
            || user
                .roles
                .iter()
                .any(|role| self.role_grants(role, permission_id))
    }

    fn role_grants(&self, role: &RoleRef, permission_id: &str) -> bool {
        if let Ok(SystemRole::Admin) = SystemRole::from_str(role.name()) {
            return true;
        }

        match role {
            RoleRef::Full { permissions, .. } => {
                permissions.iter().any(|value| value == permission_id)
            }
            // Custom roles referenced by id must be hydrated before checks.
            RoleRef::Id(id) => SystemRole::from_str(id)
                .ok()
                .and_then(|system_role| self.system_grants.get(&system_role))
                .is_some_and(|grants| grants.contains(permission_id)),
        }
    }
}
