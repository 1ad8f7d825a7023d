use std::collections::HashMap;

use async_trait::async_trait;
use tessera_application::RoleRepository;
use tessera_core::AppResult;
use tessera_domain::{AssignmentEvent, Role, RoleAssignment};
use tokio::sync::RwLock;

/// In-memory role repository implementation.
#[derive(Debug, Default)]
pub struct InMemoryRoleRepository {
    roles: RwLock<HashMap<String, Role>>,
    assignments: RwLock<HashMap<(String, String), RoleAssignment>>,
    events: RwLock<Vec<AssignmentEvent>>,
}

impl InMemoryRoleRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self {
            roles: RwLock::new(HashMap::new()),
            assignments: RwLock::new(HashMap::new()),
            events: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl RoleRepository for InMemoryRoleRepository {
    async fn list_roles(&self) -> AppResult<Vec<Role>> {
        let mut roles: Vec<Role> = self.roles.read().await.values().cloned().collect();
        roles.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(roles)
    }

    async fn find_role(&self, role_id: &str) -> AppResult<Option<Role>> {
        Ok(self.roles.read().await.get(role_id).cloned())
    }

    async fn find_role_by_name(&self, name: &str) -> AppResult<Option<Role>> {
        Ok(self
            .roles
            .read()
            .await
            .values()
            .find(|role| role.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn save_role(&self, role: Role) -> AppResult<()> {
        self.roles.write().await.insert(role.id.clone(), role);
        Ok(())
    }

    async fn delete_role(&self, role_id: &str) -> AppResult<bool> {
        Ok(self.roles.write().await.remove(role_id).is_some())
    }

    async fn upsert_assignment(&self, assignment: RoleAssignment) -> AppResult<()> {
        let key = (assignment.user_id.clone(), assignment.role_id.clone());
        self.assignments.write().await.insert(key, assignment);
        Ok(())
    }

    async fn remove_assignment(&self, user_id: &str, role_id: &str) -> AppResult<bool> {
        let key = (user_id.to_owned(), role_id.to_owned());
        Ok(self.assignments.write().await.remove(&key).is_some())
    }

    async fn list_assignments_for_user(&self, user_id: &str) -> AppResult<Vec<RoleAssignment>> {
        let mut assignments: Vec<RoleAssignment> = self
            .assignments
            .read()
            .await
            .values()
            .filter(|assignment| assignment.user_id == user_id)
            .cloned()
            .collect();
        assignments.sort_by(|left, right| {
            left.assigned_at
                .cmp(&right.assigned_at)
                .then_with(|| left.role_id.cmp(&right.role_id))
        });

        Ok(assignments)
    }

    async fn remove_assignments_for_role(&self, role_id: &str) -> AppResult<usize> {
        let mut assignments = self.assignments.write().await;
        let before = assignments.len();
        assignments.retain(|(_, stored_role_id), _| stored_role_id != role_id);
        Ok(before - assignments.len())
    }

    async fn append_assignment_event(&self, event: AssignmentEvent) -> AppResult<()> {
        self.events.write().await.push(event);
        Ok(())
    }

    async fn list_assignment_events(&self, user_id: &str) -> AppResult<Vec<AssignmentEvent>> {
        Ok(self
            .events
            .read()
            .await
            .iter()
            .filter(|event| event.user_id == user_id)
            .cloned()
            .collect())
    }
}
