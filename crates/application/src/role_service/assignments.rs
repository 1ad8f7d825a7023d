use std::collections::BTreeSet;

use tessera_core::{AppError, AppResult};
use tessera_domain::{AssignmentEvent, AssignmentEventKind, AuthUser, Role, RoleAssignment, RoleRef};
use tracing::{debug, info};

use crate::role_ports::AssignRoleInput;

use super::{RoleService, SYSTEM_ACTOR};

impl RoleService {
    /// Assigns a role to a user, replacing any previous assignment of the same role.
    pub async fn assign_role(&self, actor: &str, input: AssignRoleInput) -> AppResult<RoleAssignment> {
        if input.user_id.trim().is_empty() {
            return Err(AppError::Validation("user id must not be empty".to_owned()));
        }

        let role = self.find_role(input.role_id.as_str()).await?;
        if !role.is_active {
            return Err(AppError::Validation(format!(
                "role '{}' is inactive",
                role.name
            )));
        }

        let now = self.clock.now();
        if let Some(expires_at) = input.expires_at
            && expires_at <= now
        {
            return Err(AppError::Validation(
                "assignment expiry must be in the future".to_owned(),
            ));
        }

        let assignment = RoleAssignment {
            user_id: input.user_id,
            role_id: role.id,
            assigned_by: actor.to_owned(),
            assigned_at: now,
            expires_at: input.expires_at,
        };

        self.repository.upsert_assignment(assignment.clone()).await?;
        self.record(
            &assignment.user_id,
            &assignment.role_id,
            AssignmentEventKind::Assigned,
            actor,
        )
        .await?;

        info!(
            user_id = %assignment.user_id,
            role_id = %assignment.role_id,
            expires_at = ?assignment.expires_at,
            "role assigned"
        );

        Ok(assignment)
    }

    /// Removes a role from a user.
    pub async fn remove_role(&self, actor: &str, user_id: &str, role_id: &str) -> AppResult<()> {
        if !self.repository.remove_assignment(user_id, role_id).await? {
            return Err(AppError::NotFound(format!(
                "user '{user_id}' does not hold role '{role_id}'"
            )));
        }

        self.record(user_id, role_id, AssignmentEventKind::Removed, actor)
            .await?;
        info!(user_id, role_id, "role removed");

        Ok(())
    }

    /// Returns the active roles of a user.
    ///
    /// Expired assignments are evicted here and recorded in the audit trail.
    pub async fn get_user_roles(&self, user_id: &str) -> AppResult<Vec<Role>> {
        let now = self.clock.now();
        let mut roles = Vec::new();

        for assignment in self.repository.list_assignments_for_user(user_id).await? {
            if assignment.is_expired_at(now) {
                if self
                    .repository
                    .remove_assignment(user_id, &assignment.role_id)
                    .await?
                {
                    self.record(
                        user_id,
                        &assignment.role_id,
                        AssignmentEventKind::Expired,
                        SYSTEM_ACTOR,
                    )
                    .await?;
                    info!(user_id, role_id = %assignment.role_id, "expired role assignment evicted");
                }
                continue;
            }

            match self.repository.find_role(&assignment.role_id).await? {
                Some(role) if role.is_active => roles.push(role),
                Some(_) => {}
                None => debug!(role_id = %assignment.role_id, "assignment references a missing role"),
            }
        }

        roles.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(roles)
    }

    /// Returns the registered permissions granted by the user's active roles.
    pub async fn get_user_permissions(&self, user_id: &str) -> AppResult<BTreeSet<String>> {
        let roles = self.get_user_roles(user_id).await?;

        Ok(roles
            .iter()
            .flat_map(|role| role.permissions.iter())
            .filter(|permission_id| self.registry.contains(permission_id))
            .cloned()
            .collect())
    }

    /// Returns the assignment audit trail of a user.
    pub async fn list_assignment_events(&self, user_id: &str) -> AppResult<Vec<AssignmentEvent>> {
        self.repository.list_assignment_events(user_id).await
    }

    /// Replaces id-only role references with hydrated ones.
    ///
    /// References to unknown roles are kept as they are.
    pub async fn hydrate_user(&self, mut user: AuthUser) -> AppResult<AuthUser> {
        let mut hydrated = Vec::with_capacity(user.roles.len());

        for reference in user.roles {
            let RoleRef::Id(role_id) = &reference else {
                hydrated.push(reference);
                continue;
            };

            let role = match self.repository.find_role(role_id).await? {
                Some(role) => Some(role),
                None => self.repository.find_role_by_name(role_id).await?,
            };

            hydrated.push(role.map_or(reference, |role| RoleRef::full(&role)));
        }

        user.roles = hydrated;
        Ok(user)
    }

    async fn record(
        &self,
        user_id: &str,
        role_id: &str,
        kind: AssignmentEventKind,
        actor: &str,
    ) -> AppResult<()> {
        self.repository
            .append_assignment_event(AssignmentEvent {
                user_id: user_id.to_owned(),
                role_id: role_id.to_owned(),
                kind,
                actor: actor.to_owned(),
                occurred_at: self.clock.now(),
            })
            .await
    }
}
