//! Role model for report access
//!
//! Defines the roles an acting user can hold over a single report.

use std::collections::HashSet;
use uuid::Uuid;

use crate::models::User;

/// Roles a user can hold over a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Booked the report
    Owner,
    /// Reviews the project the report's task belongs to
    Reviewer,
    /// Supervises the report's owner
    Supervisor,
    /// Elevated account, holds over every report
    Superuser,
}

/// Relations needed to resolve roles over one report
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleFacts {
    pub owner_id: Uuid,
    /// Reviewers of the report's project
    pub reviewers: Vec<Uuid>,
    /// Supervisors of the report's owner
    pub supervisors: Vec<Uuid>,
}

/// A set of roles with helper methods
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSet {
    roles: HashSet<Role>,
}

impl RoleSet {
    /// Create a new empty role set
    pub fn new() -> Self {
        Self {
            roles: HashSet::new(),
        }
    }

    /// Resolve every role `actor` holds given the report's facts
    pub fn resolve(actor: &User, facts: &RoleFacts) -> Self {
        let mut set = Self::new();
        if facts.owner_id == actor.id {
            set.add(Role::Owner);
        }
        if facts.reviewers.contains(&actor.id) {
            set.add(Role::Reviewer);
        }
        if facts.supervisors.contains(&actor.id) {
            set.add(Role::Supervisor);
        }
        if actor.is_superuser {
            set.add(Role::Superuser);
        }
        set
    }

    /// Check if this set contains a role
    pub fn has(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// True when any of `roles` is held
    pub fn any(&self, roles: &[Role]) -> bool {
        roles.iter().any(|r| self.has(*r))
    }

    /// Add a role
    pub fn add(&mut self, role: Role) {
        self.roles.insert(role);
    }

    /// Check if the set is empty
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

impl From<Vec<Role>> for RoleSet {
    fn from(roles: Vec<Role>) -> Self {
        Self {
            roles: roles.into_iter().collect(),
        }
    }
}
