use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;

use tessera_core::{AppError, AppResult, Clock, NonEmptyString};
use tessera_domain::{PermissionRegistry, Role, SystemRole};
use tracing::info;
use uuid::Uuid;

use crate::role_ports::{CreateRoleInput, RoleRepository, UpdateRoleInput};

mod assignments;

/// Actor recorded for changes the service makes on its own.
pub const SYSTEM_ACTOR: &str = "system";

/// Application service for role definitions and user role assignments.
#[derive(Clone)]
pub struct RoleService {
    repository: Arc<dyn RoleRepository>,
    registry: Arc<PermissionRegistry>,
    clock: Arc<dyn Clock>,
}

impl RoleService {
    /// Creates a new role service from required ports.
    #[must_use]
    pub fn new(
        repository: Arc<dyn RoleRepository>,
        registry: Arc<PermissionRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            registry,
            clock,
        }
    }

    /// Seeds the built-in roles that are missing; returns how many were created.
    pub async fn ensure_system_roles(&self) -> AppResult<usize> {
        let now = self.clock.now();
        let mut created = 0;

        for system_role in SystemRole::all() {
            if self.repository.find_role(system_role.as_str()).await?.is_some() {
                continue;
            }

            self.repository
                .save_role(Role::system(*system_role, &self.registry, now))
                .await?;
            created += 1;
        }

        if created > 0 {
            info!(created, "system roles seeded");
        }

        Ok(created)
    }

    /// Lists every role.
    pub async fn list_roles(&self) -> AppResult<Vec<Role>> {
        self.repository.list_roles().await
    }

    /// Returns one role or `NotFound`.
    pub async fn find_role(&self, role_id: &str) -> AppResult<Role> {
        self.repository
            .find_role(role_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' does not exist")))
    }

    /// Creates a custom role.
    pub async fn create_role(&self, input: CreateRoleInput) -> AppResult<Role> {
        let name = self.available_name(input.name.as_str(), None).await?;
        let permissions = self.validate_permissions(&input.permissions)?;
        let now = self.clock.now();

        let role = Role {
            id: Uuid::new_v4().to_string(),
            name,
            description: normalize_description(input.description),
            permissions,
            is_system: false,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        self.repository.save_role(role.clone()).await?;
        info!(role_id = %role.id, role_name = %role.name, "role created");

        Ok(role)
    }

    /// Applies a partial update to a custom role.
    pub async fn update_role(&self, role_id: &str, input: UpdateRoleInput) -> AppResult<Role> {
        let mut role = self.find_role(role_id).await?;
        role.ensure_mutable()?;

        if let Some(name) = input.name {
            role.name = self.available_name(name.as_str(), Some(role.id.as_str())).await?;
        }
        if let Some(description) = input.description {
            role.description = normalize_description(Some(description));
        }
        if let Some(permissions) = input.permissions {
            role.permissions = self.validate_permissions(&permissions)?;
        }
        if let Some(is_active) = input.is_active {
            role.is_active = is_active;
        }
        role.updated_at = self.clock.now();

        self.repository.save_role(role.clone()).await?;
        info!(role_id = %role.id, "role updated");

        Ok(role)
    }

    /// Deletes a custom role together with its assignments.
    pub async fn delete_role(&self, role_id: &str) -> AppResult<()> {
        let role = self.find_role(role_id).await?;
        role.ensure_mutable()?;

        let removed = self.repository.remove_assignments_for_role(role_id).await?;
        self.repository.delete_role(role_id).await?;
        info!(role_id, removed_assignments = removed, "role deleted");

        Ok(())
    }

    async fn available_name(&self, name: &str, current_role_id: Option<&str>) -> AppResult<String> {
        let name = NonEmptyString::new(name.trim())?;

        if SystemRole::from_str(&name.as_str().to_ascii_lowercase()).is_ok() {
            return Err(AppError::Conflict(format!(
                "role name '{}' is reserved",
                name.as_str()
            )));
        }

        if let Some(existing) = self.repository.find_role_by_name(name.as_str()).await?
            && current_role_id != Some(existing.id.as_str())
        {
            return Err(AppError::Conflict(format!(
                "role '{}' already exists",
                name.as_str()
            )));
        }

        Ok(name.into())
    }

    fn validate_permissions(&self, permission_ids: &[String]) -> AppResult<BTreeSet<String>> {
        let unknown: Vec<&str> = permission_ids
            .iter()
            .map(String::as_str)
            .filter(|id| !self.registry.contains(id))
            .collect();

        if !unknown.is_empty() {
            return Err(AppError::Validation(format!(
                "unknown permissions: {}",
                unknown.join(", ")
            )));
        }

        Ok(permission_ids.iter().cloned().collect())
    }
}

fn normalize_description(description: Option<String>) -> Option<String> {
    description
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests;
