//! Users, roles, and bindings — all tenant-scoped.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// A user belonging to exactly one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Unique within the tenant, not globally.
    pub email: String,
    /// Hashed secret (argon2); never the plaintext password.
    pub secret_hash: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A tenant-scoped, named set of permission strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    /// Free-form permission tokens, e.g. `workflow:write`.
    pub permissions: Vec<String>,
}

/// Assignment of a role to a user within a tenant. The (tenant, user, role)
/// triple is unique.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Binding {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub role_id: Uuid,
}

/// The actor type recorded on an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    User,
    System,
    Agent,
}

impl std::fmt::Display for ActorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::System => write!(f, "system"),
            Self::Agent => write!(f, "agent"),
        }
    }
}

/// Request-scoped identity and authority, constructed only by
/// `af-auth::validate_token` and threaded explicitly through every
/// downstream call — never read from ambient/thread-local state.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub roles: Vec<Role>,
    pub permissions: HashSet<String>,
    pub jti: Uuid,
    pub token_expires_at: chrono::DateTime<chrono::Utc>,
}

impl RequestContext {
    /// The union of permissions across bound roles plus permissions
    /// carried directly on the token. Default deny: absence is a denial.
    pub fn has_permission(&self, permission: &str) -> bool {
        if self.permissions.contains(permission) {
            return true;
        }
        self.roles
            .iter()
            .any(|r| r.permissions.iter().any(|p| p == permission))
    }
}
