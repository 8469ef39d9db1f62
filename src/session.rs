//! Session context: who is logged in and with which roles
//!
//! Set once at login from the validated service ticket, read-only for the
//! rest of the session and torn down at logout.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

/// Classification of the authenticated principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Lecturer,
    Admin,
}

impl Role {
    pub const STAFF: [Role; 2] = [Role::Lecturer, Role::Admin];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Lecturer => "lecturer",
            Role::Admin => "admin",
        }
    }

    /// Organisational unit marking this role in a distinguished name
    fn organisational_unit(self) -> &'static str {
        match self {
            Role::Student => "ou=students",
            Role::Lecturer => "ou=academic",
            Role::Admin => "ou=apstaff",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of roles held by a principal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, role: Role) {
        self.0.insert(role);
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    /// Holds at least one of `roles`
    pub fn any_of(&self, roles: &[Role]) -> bool {
        roles.iter().any(|r| self.contains(*r))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.0.iter().copied()
    }

    /// Derive roles from the principal's distinguished names.
    pub fn from_distinguished_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut set = RoleSet::new();
        for name in names {
            let name = name.to_ascii_lowercase();
            for role in [Role::Student, Role::Lecturer, Role::Admin] {
                if name.contains(role.organisational_unit()) {
                    set.insert(role);
                }
            }
        }
        set
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Authenticated principal established at login
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub username: String,
    pub roles: RoleSet,
    #[serde(default)]
    pub attributes: Value,
}

/// Which dashboard a principal starts with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardSections {
    Students,
    Staff,
}

impl Principal {
    /// Default dashboard for the principal's roles, students first
    pub fn default_dashboard(&self) -> Option<DashboardSections> {
        if self.roles.contains(Role::Student) {
            Some(DashboardSections::Students)
        } else if self.roles.any_of(&Role::STAFF) {
            Some(DashboardSections::Staff)
        } else {
            None
        }
    }

    /// Endpoints worth having in the store after login, so the principal's
    /// usual pages work offline
    pub fn warm_up_endpoints(&self) -> &'static [&'static str] {
        if self.roles.contains(Role::Student) {
            &["/student/profile", "/student/courses", "/staff/listing"]
        } else if self.roles.any_of(&Role::STAFF) {
            &["/staff/profile", "/staff/listing"]
        } else {
            &[]
        }
    }
}

/// Shared session state injected into the ticket service and pipeline
#[derive(Clone, Default)]
pub struct Session {
    principal: Arc<RwLock<Option<Principal>>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session for `principal`, replacing any previous one
    pub async fn init(&self, principal: Principal) {
        *self.principal.write().await = Some(principal);
    }

    /// End the session
    pub async fn teardown(&self) {
        *self.principal.write().await = None;
    }

    pub async fn principal(&self) -> Option<Principal> {
        self.principal.read().await.clone()
    }

    pub async fn roles(&self) -> RoleSet {
        self.principal
            .read()
            .await
            .as_ref()
            .map(|p| p.roles.clone())
            .unwrap_or_default()
    }

    pub async fn is_active(&self) -> bool {
        self.principal.read().await.is_some()
    }
}
