//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod access;
mod credentials;
mod permission;
mod role;
mod session;
mod user;

pub use access::{AccessConditions, AccessDecision};
pub use credentials::{
    FieldErrors, LoginCredentials, NAME_MAX_LENGTH, RegistrationData, summarize_field_errors,
};
pub use permission::{
    Permission, PermissionCondition, PermissionRegistry, compose_permission_id,
};
pub use role::{
    AssignmentEvent, AssignmentEventKind, Role, RoleAssignment, RoleRef, SystemRole,
};
pub use session::{AuthTokens, DEFAULT_TOKEN_TYPE, SessionIdentity, SessionState};
pub use user::{
    AuthUser, EmailAddress, PASSWORD_MAX_LENGTH, PASSWORD_MIN_LENGTH, password_issues,
    validate_password,
};
