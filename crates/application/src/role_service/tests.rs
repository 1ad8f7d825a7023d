use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use tokio::sync::Mutex;

use tessera_core::{AppError, AppResult, ManualClock};
use tessera_domain::{
    AssignmentEvent, AssignmentEventKind, AuthUser, PermissionRegistry, Role, RoleAssignment,
    RoleRef,
};

use crate::role_ports::{AssignRoleInput, CreateRoleInput, RoleRepository, UpdateRoleInput};

use super::RoleService;

#[derive(Default)]
struct FakeRoleRepository {
    roles: Mutex<Vec<Role>>,
    assignments: Mutex<Vec<RoleAssignment>>,
    events: Mutex<Vec<AssignmentEvent>>,
}

#[async_trait]
impl RoleRepository for FakeRoleRepository {
    async fn list_roles(&self) -> AppResult<Vec<Role>> {
        Ok(self.roles.lock().await.clone())
    }

    async fn find_role(&self, role_id: &str) -> AppResult<Option<Role>> {
        Ok(self
            .roles
            .lock()
            .await
            .iter()
            .find(|role| role.id == role_id)
            .cloned())
    }

    async fn find_role_by_name(&self, name: &str) -> AppResult<Option<Role>> {
        Ok(self
            .roles
            .lock()
            .await
            .iter()
            .find(|role| role.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn save_role(&self, role: Role) -> AppResult<()> {
        let mut roles = self.roles.lock().await;
        roles.retain(|stored| stored.id != role.id);
        roles.push(role);
        Ok(())
    }

    async fn delete_role(&self, role_id: &str) -> AppResult<bool> {
        let mut roles = self.roles.lock().await;
        let before = roles.len();
        roles.retain(|stored| stored.id != role_id);
        Ok(roles.len() != before)
    }

    async fn upsert_assignment(&self, assignment: RoleAssignment) -> AppResult<()> {
        let mut assignments = self.assignments.lock().await;
        assignments.retain(|stored| {
            !(stored.user_id == assignment.user_id && stored.role_id == assignment.role_id)
        });
        assignments.push(assignment);
        Ok(())
    }

    async fn remove_assignment(&self, user_id: &str, role_id: &str) -> AppResult<bool> {
        let mut assignments = self.assignments.lock().await;
        let before = assignments.len();
        assignments.retain(|stored| !(stored.user_id == user_id && stored.role_id == role_id));
        Ok(assignments.len() != before)
    }

    async fn list_assignments_for_user(&self, user_id: &str) -> AppResult<Vec<RoleAssignment>> {
        Ok(self
            .assignments
            .lock()
            .await
            .iter()
            .filter(|stored| stored.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn remove_assignments_for_role(&self, role_id: &str) -> AppResult<usize> {
        let mut assignments = self.assignments.lock().await;
        let before = assignments.len();
        assignments.retain(|stored| stored.role_id != role_id);
        Ok(before - assignments.len())
    }

    async fn append_assignment_event(&self, event: AssignmentEvent) -> AppResult<()> {
        self.events.lock().await.push(event);
        Ok(())
    }

    async fn list_assignment_events(&self, user_id: &str) -> AppResult<Vec<AssignmentEvent>> {
        Ok(self
            .events
            .lock()
            .await
            .iter()
            .filter(|event| event.user_id == user_id)
            .cloned()
            .collect())
    }
}

struct Harness {
    service: RoleService,
    repository: Arc<FakeRoleRepository>,
    clock: Arc<ManualClock>,
}

async fn harness() -> Harness {
    let start = Utc
        .with_ymd_and_hms(2026, 1, 15, 8, 0, 0)
        .single()
        .unwrap_or_else(Utc::now);
    let clock = Arc::new(ManualClock::new(start));
    let repository = Arc::new(FakeRoleRepository::default());
    let service = RoleService::new(
        repository.clone(),
        Arc::new(PermissionRegistry::seeded().unwrap_or_default()),
        clock.clone(),
    );

    let seeded = service.ensure_system_roles().await;
    assert!(matches!(seeded, Ok(4)));

    Harness {
        service,
        repository,
        clock,
    }
}

fn auditor_input() -> CreateRoleInput {
    CreateRoleInput {
        name: "Auditor".to_owned(),
        description: Some("Reads the audit log".to_owned()),
        permissions: vec!["audit.read".to_owned(), "reports.read".to_owned()],
    }
}

#[tokio::test]
async fn seeding_system_roles_is_idempotent() {
    let harness = harness().await;

    let second = harness.service.ensure_system_roles().await;

    assert!(matches!(second, Ok(0)));
    assert_eq!(harness.repository.roles.lock().await.len(), 4);
}

#[tokio::test]
async fn system_roles_reject_update_and_delete() {
    let harness = harness().await;

    let update = harness
        .service
        .update_role(
            "admin",
            UpdateRoleInput {
                is_active: Some(false),
                ..UpdateRoleInput::default()
            },
        )
        .await;
    assert!(matches!(update, Err(AppError::Forbidden(_))));

    let delete = harness.service.delete_role("viewer").await;
    assert!(matches!(delete, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn create_role_rejects_duplicate_reserved_and_unknown_input() {
    let harness = harness().await;
    assert!(harness.service.create_role(auditor_input()).await.is_ok());

    let duplicate = harness
        .service
        .create_role(CreateRoleInput {
            name: "auditor".to_owned(),
            ..auditor_input()
        })
        .await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));

    let reserved = harness
        .service
        .create_role(CreateRoleInput {
            name: "Admin".to_owned(),
            ..auditor_input()
        })
        .await;
    assert!(matches!(reserved, Err(AppError::Conflict(_))));

    let unknown = harness
        .service
        .create_role(CreateRoleInput {
            name: "Billing".to_owned(),
            description: None,
            permissions: vec!["billing.read".to_owned()],
        })
        .await;
    assert!(
        matches!(unknown, Err(AppError::Validation(message)) if message.contains("billing.read"))
    );

    let blank = harness
        .service
        .create_role(CreateRoleInput {
            name: "   ".to_owned(),
            ..auditor_input()
        })
        .await;
    assert!(matches!(blank, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn update_role_keeps_its_own_name_available() {
    let harness = harness().await;
    let role = harness
        .service
        .create_role(auditor_input())
        .await
        .unwrap_or_else(|_| unreachable!());

    let updated = harness
        .service
        .update_role(
            &role.id,
            UpdateRoleInput {
                name: Some("AUDITOR".to_owned()),
                permissions: Some(vec!["audit.read".to_owned()]),
                ..UpdateRoleInput::default()
            },
        )
        .await;

    let updated = updated.unwrap_or_else(|_| unreachable!());
    assert_eq!(updated.name, "AUDITOR");
    assert_eq!(updated.permissions.len(), 1);
}

#[tokio::test]
async fn deleting_a_role_removes_its_assignments() {
    let harness = harness().await;
    let role = harness
        .service
        .create_role(auditor_input())
        .await
        .unwrap_or_else(|_| unreachable!());
    let assigned = harness
        .service
        .assign_role(
            "admin-1",
            AssignRoleInput {
                user_id: "u-1".to_owned(),
                role_id: role.id.clone(),
                expires_at: None,
            },
        )
        .await;
    assert!(assigned.is_ok());

    assert!(harness.service.delete_role(&role.id).await.is_ok());

    assert!(harness.repository.assignments.lock().await.is_empty());
    assert!(matches!(
        harness.service.find_role(&role.id).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn expired_assignment_is_evicted_on_read() {
    let harness = harness().await;
    let expires_at = harness.clock_now() + Duration::hours(1);
    let assigned = harness
        .service
        .assign_role(
            "admin-1",
            AssignRoleInput {
                user_id: "u-1".to_owned(),
                role_id: "manager".to_owned(),
                expires_at: Some(expires_at),
            },
        )
        .await;
    assert!(assigned.is_ok());

    let before = harness.service.get_user_permissions("u-1").await;
    assert!(matches!(before, Ok(ref permissions) if permissions.contains("users.update")));

    harness.clock.set(expires_at);

    let roles = harness.service.get_user_roles("u-1").await;
    assert!(matches!(roles, Ok(ref roles) if roles.is_empty()));
    let permissions = harness.service.get_user_permissions("u-1").await;
    assert!(matches!(permissions, Ok(ref permissions) if permissions.is_empty()));

    let events = harness
        .service
        .list_assignment_events("u-1")
        .await
        .unwrap_or_else(|_| unreachable!());
    let kinds: Vec<AssignmentEventKind> = events.iter().map(|event| event.kind).collect();
    assert_eq!(
        kinds,
        vec![AssignmentEventKind::Assigned, AssignmentEventKind::Expired]
    );
    assert_eq!(events[1].actor, "system");
}

#[tokio::test]
async fn assignment_with_past_expiry_is_rejected() {
    let harness = harness().await;

    let result = harness
        .service
        .assign_role(
            "admin-1",
            AssignRoleInput {
                user_id: "u-1".to_owned(),
                role_id: "viewer".to_owned(),
                expires_at: Some(harness.clock_now()),
            },
        )
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn removing_an_unheld_role_is_not_found() {
    let harness = harness().await;

    let result = harness.service.remove_role("admin-1", "u-1", "viewer").await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn remove_role_records_the_actor() {
    let harness = harness().await;
    let assigned = harness
        .service
        .assign_role(
            "admin-1",
            AssignRoleInput {
                user_id: "u-1".to_owned(),
                role_id: "viewer".to_owned(),
                expires_at: None,
            },
        )
        .await;
    assert!(assigned.is_ok());

    assert!(harness.service.remove_role("admin-2", "u-1", "viewer").await.is_ok());

    let events = harness
        .service
        .list_assignment_events("u-1")
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].kind, AssignmentEventKind::Removed);
    assert_eq!(events[1].actor, "admin-2");
}

#[tokio::test]
async fn hydrate_user_resolves_known_role_ids() {
    let harness = harness().await;
    let role = harness
        .service
        .create_role(auditor_input())
        .await
        .unwrap_or_else(|_| unreachable!());

    let user = AuthUser {
        id: "u-1".to_owned(),
        email: "u-1@example.com".to_owned(),
        first_name: None,
        last_name: None,
        roles: vec![
            RoleRef::Id(role.id.clone()),
            RoleRef::Id("viewer".to_owned()),
            RoleRef::Id("ghost".to_owned()),
        ],
        permissions: Vec::new(),
        is_active: true,
        created_at: harness.clock_now(),
        updated_at: harness.clock_now(),
        last_login_at: None,
    };

    let hydrated = harness
        .service
        .hydrate_user(user)
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(hydrated.roles[0].name(), "Auditor");
    assert!(
        hydrated.roles[0]
            .embedded_permissions()
            .is_some_and(|permissions| permissions.contains(&"audit.read".to_owned()))
    );
    assert!(hydrated.roles[1].embedded_permissions().is_some());
    assert_eq!(hydrated.roles[2], RoleRef::Id("ghost".to_owned()));
}

impl Harness {
    fn clock_now(&self) -> chrono::DateTime<Utc> {
        use tessera_core::Clock;

        self.clock.now()
    }
}
