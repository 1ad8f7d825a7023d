use serde::{Deserialize, Serialize};

/// Outcome of an authorization check.
///
/// Checks never return errors; a denial carries the reason instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    /// Whether access is allowed.
    pub granted: bool,
    /// Why access was denied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AccessDecision {
    /// Access allowed.
    #[must_use]
    pub fn granted() -> Self {
        Self {
            granted: true,
            reason: None,
        }
    }

    /// Access denied with a reason.
    #[must_use]
    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            granted: false,
            reason: Some(reason.into()),
        }
    }
}

/// Facts about the accessed resource evaluated against permission conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessConditions {
    /// Owner of the resource, compared for owner-only permissions.
    pub owner_id: Option<String>,
}

impl AccessConditions {
    /// Conditions for a resource owned by the given user.
    #[must_use]
    pub fn owned_by(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: Some(owner_id.into()),
        }
    }
}
