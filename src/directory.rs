//! Employee directory and role registry
//!
//! Two separate parent-pointer hierarchies live here: employees point at an
//! optional superior, roles point at an optional reports-to role. Both are
//! advisory for routing, but both must stay acyclic; writes run through
//! [`would_create_cycle`] before a parent pointer changes.

use crate::money::Money;
use crate::timestamp::TimeStamp;
use chrono::Utc;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Role {
    #[n(0)]
    pub role_id: String,
    #[n(1)]
    pub role_name: String,
    #[n(2)]
    pub description: Option<String>,
    #[n(3)]
    pub can_approve: bool,
    #[n(4)]
    pub reports_to_role_id: Option<String>,
    // one-to-one monthly spending cap; absent means no limit configured
    #[n(5)]
    pub threshold: Option<RoleThreshold>,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct RoleThreshold {
    #[n(0)]
    pub max_amount: Money,
}

impl Role {
    pub fn new(role_id: String, role_name: &str, can_approve: bool) -> Self {
        Self {
            role_id,
            role_name: role_name.to_string(),
            description: None,
            can_approve,
            reports_to_role_id: None,
            threshold: None,
        }
    }
    pub fn set_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
    pub fn set_threshold(mut self, max_amount: Money) -> Self {
        self.threshold = Some(RoleThreshold { max_amount });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Employee {
    #[n(0)]
    pub employee_id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub email: String,
    #[n(3)]
    pub role_id: String,
    // nullable: an employee may have no superior
    #[n(4)]
    pub superior_id: Option<String>,
    // opaque hash produced by the external hashing capability
    #[n(5)]
    pub password_hash: Option<String>,
    #[n(6)]
    pub location: Option<String>,
    #[n(7)]
    pub grade: Option<String>,
    #[n(8)]
    pub is_active: bool,
    #[n(9)]
    pub created_at: TimeStamp<Utc>,
    #[n(10)]
    pub modified_at: Option<TimeStamp<Utc>>,
}

impl Employee {
    pub fn new(employee_id: String, name: &str, email: &str, role_id: &str) -> Self {
        Self {
            employee_id,
            name: name.to_string(),
            email: email.to_string(),
            role_id: role_id.to_string(),
            superior_id: None,
            password_hash: None,
            location: None,
            grade: None,
            is_active: true,
            created_at: TimeStamp::new(),
            modified_at: None,
        }
    }
    pub fn set_superior(mut self, superior_id: &str) -> Self {
        self.superior_id = Some(superior_id.to_string());
        self
    }
    pub fn set_password_hash(mut self, hash: &str) -> Self {
        self.password_hash = Some(hash.to_string());
        self
    }
    pub fn set_location(mut self, location: &str) -> Self {
        self.location = Some(location.to_string());
        self
    }
    pub fn set_grade(mut self, grade: &str) -> Self {
        self.grade = Some(grade.to_string());
        self
    }
}

/// Would pointing `child` at `new_parent` close a cycle?
///
/// Walks the parent chain from `new_parent` upward with a visited set bounded
/// by the population, so a pre-existing (corrupt) cycle above cannot loop us
/// forever either.
pub fn would_create_cycle(
    child: &str,
    new_parent: &str,
    parent_of: &HashMap<String, Option<String>>,
) -> bool {
    if child == new_parent {
        return true;
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut cursor = new_parent;

    while visited.insert(cursor) {
        match parent_of.get(cursor).and_then(|p| p.as_deref()) {
            Some(parent) if parent == child => return true,
            Some(parent) => cursor = parent,
            None => return false,
        }
    }
    // revisited a node without reaching `child`: chain loops elsewhere
    false
}
