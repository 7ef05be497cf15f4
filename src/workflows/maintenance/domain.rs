use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier wrapper for properties under management.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyId(pub String);

/// Identifier wrapper for tenants of a property.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

/// Identifier wrapper for maintenance workers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub String);

/// Identifier wrapper for maintenance requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Urgency declared at intake; drives the overdue window used by reporting
/// specifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Routine,
    Urgent,
    Emergency,
}

impl Urgency {
    pub const fn ordered() -> [Self; 4] {
        [Self::Low, Self::Routine, Self::Urgent, Self::Emergency]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Routine => "Routine",
            Self::Urgent => "Urgent",
            Self::Emergency => "Emergency",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "routine" => Some(Self::Routine),
            "urgent" => Some(Self::Urgent),
            "emergency" => Some(Self::Emergency),
            _ => None,
        }
    }

    /// Hours an open request may age before it counts as overdue.
    pub const fn overdue_after_hours(self) -> i64 {
        match self {
            Self::Low => 24 * 14,
            Self::Routine => 24 * 7,
            Self::Urgent => 48,
            Self::Emergency => 4,
        }
    }
}

/// Relationship between an acting user and the property/request in scope,
/// as resolved by the externally supplied principal directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Tenant,
    Manager,
    Worker,
    System,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Tenant => "tenant",
            Self::Manager => "manager",
            Self::Worker => "worker",
            Self::System => "system",
        }
    }
}

/// Acting principal for an operation. The role is already scoped to the
/// property the operation touches; identity management stays external.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Manager | Role::System)
    }
}

/// Malformed input rejected before any aggregate is touched.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("request description must not be empty")]
    EmptyDescription,
    #[error("unknown specialization value '{value}'")]
    UnknownSpecialization { value: String },
    #[error("unknown urgency value '{value}'")]
    UnknownUrgency { value: String },
}

/// Principal lacks the relationship or role the attempted action requires.
/// Kept apart from invariant violations so callers can render "forbidden"
/// rather than "invalid".
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("user '{user}' acting as {role} may not {action}")]
pub struct AuthorizationError {
    pub user: String,
    pub role: &'static str,
    pub action: String,
}

impl AuthorizationError {
    pub fn new(actor: &Principal, action: impl Into<String>) -> Self {
        Self {
            user: actor.user_id.clone(),
            role: actor.role.label(),
            action: action.into(),
        }
    }

    /// The directory knows no relationship for this user at all.
    pub fn unknown_user(user_id: &str, action: impl Into<String>) -> Self {
        Self {
            user: user_id.to_string(),
            role: "unknown",
            action: action.into(),
        }
    }
}
