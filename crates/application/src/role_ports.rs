use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tessera_core::AppResult;
use tessera_domain::{AssignmentEvent, Role, RoleAssignment};

/// Input payload for creating custom roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRoleInput {
    /// Unique role name, compared case-insensitively.
    pub name: String,
    /// Optional description for administrators.
    pub description: Option<String>,
    /// Permission ids to grant; each must be registered.
    pub permissions: Vec<String>,
}

/// Partial update of a custom role; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateRoleInput {
    /// New role name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// Replacement permission set.
    pub permissions: Option<Vec<String>>,
    /// Activates or deactivates the role.
    pub is_active: Option<bool>,
}

/// Input payload for assigning a role to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignRoleInput {
    /// User receiving the role.
    pub user_id: String,
    /// Role to assign.
    pub role_id: String,
    /// Optional end of the assignment.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Repository port for roles, assignments and the assignment audit trail.
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Lists every role ordered by name.
    async fn list_roles(&self) -> AppResult<Vec<Role>>;

    /// Finds a role by id.
    async fn find_role(&self, role_id: &str) -> AppResult<Option<Role>>;

    /// Finds a role by name, ignoring case.
    async fn find_role_by_name(&self, name: &str) -> AppResult<Option<Role>>;

    /// Inserts or replaces a role by id.
    async fn save_role(&self, role: Role) -> AppResult<()>;

    /// Deletes a role; returns whether it existed.
    async fn delete_role(&self, role_id: &str) -> AppResult<bool>;

    /// Inserts or replaces the assignment for its user and role pair.
    async fn upsert_assignment(&self, assignment: RoleAssignment) -> AppResult<()>;

    /// Removes one assignment; returns whether it existed.
    async fn remove_assignment(&self, user_id: &str, role_id: &str) -> AppResult<bool>;

    /// Lists stored assignments of a user, expired ones included.
    async fn list_assignments_for_user(&self, user_id: &str) -> AppResult<Vec<RoleAssignment>>;

    /// Removes every assignment of a role; returns how many were removed.
    async fn remove_assignments_for_role(&self, role_id: &str) -> AppResult<usize>;

    /// Appends an audit trail entry.
    async fn append_assignment_event(&self, event: AssignmentEvent) -> AppResult<()>;

    /// Lists audit trail entries of a user in insertion order.
    async fn list_assignment_events(&self, user_id: &str) -> AppResult<Vec<AssignmentEvent>>;
}
