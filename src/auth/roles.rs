// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User roles and the role hierarchy.
//!
//! ## Role Hierarchy
//!
//! Roles are configured per deployment as `name:priority[:protected]` entries.
//! Priority totally orders the roles: a higher priority is more privileged and
//! no two roles may share one. The hierarchy is validated once at load time so
//! a request-time comparison can never be ambiguous.
//!
//! The comparison helpers here are pure; auditing and HTTP mapping live in
//! [`super::gate`].

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A single role definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleDef {
    /// Lower-case role name (e.g. `manager`).
    pub name: String,
    /// Higher is more privileged.
    pub priority: u32,
    /// Protected roles can't be deleted and always keep an active holder.
    pub protected: bool,
}

/// Errors detected while loading a role hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoleHierarchyError {
    #[error("no roles defined")]
    Empty,

    #[error("entry '{0}' is not of the form name:priority[:protected]")]
    BadEntry(String),

    #[error("role '{0}' is defined more than once")]
    DuplicateName(String),

    #[error("roles '{0}' and '{1}' share priority {2}")]
    DuplicatePriority(String, String, u32),

    #[error("top role '{0}' must be protected")]
    UnprotectedTop(String),
}

/// Why a role check failed. The text is safe to return to API consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub reason: String,
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

/// The ordered, validated set of roles for a deployment.
///
/// Stored highest priority first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleHierarchy {
    roles: Vec<RoleDef>,
}

impl RoleHierarchy {
    /// Build a hierarchy from definitions, enforcing the load-time invariants.
    pub fn new(mut roles: Vec<RoleDef>) -> Result<Self, RoleHierarchyError> {
        if roles.is_empty() {
            return Err(RoleHierarchyError::Empty);
        }
        roles.sort_by(|a, b| b.priority.cmp(&a.priority));

        for (i, role) in roles.iter().enumerate() {
            for other in &roles[i + 1..] {
                if other.name.trim().eq_ignore_ascii_case(role.name.trim()) {
                    return Err(RoleHierarchyError::DuplicateName(role.name.clone()));
                }
                if other.priority == role.priority {
                    return Err(RoleHierarchyError::DuplicatePriority(
                        role.name.clone(),
                        other.name.clone(),
                        role.priority,
                    ));
                }
            }
        }

        if !roles[0].protected {
            return Err(RoleHierarchyError::UnprotectedTop(roles[0].name.clone()));
        }

        Ok(Self { roles })
    }

    /// Parse `admin:100:protected,manager:75,...`.
    pub fn parse(spec: &str) -> Result<Self, RoleHierarchyError> {
        let mut roles = Vec::new();
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
            let (name, priority, protected) = match parts.as_slice() {
                [name, priority] => (*name, *priority, false),
                [name, priority, "protected"] => (*name, *priority, true),
                _ => return Err(RoleHierarchyError::BadEntry(entry.to_string())),
            };
            let priority: u32 = priority
                .parse()
                .map_err(|_| RoleHierarchyError::BadEntry(entry.to_string()))?;
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(RoleHierarchyError::BadEntry(entry.to_string()));
            }
            roles.push(RoleDef {
                name: name.to_ascii_lowercase(),
                priority,
                protected,
            });
        }
        Self::new(roles)
    }

    /// Look up a role by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&RoleDef> {
        let name = name.trim();
        self.roles.iter().find(|r| r.name.eq_ignore_ascii_case(name))
    }

    pub fn priority(&self, name: &str) -> Option<u32> {
        self.get(name).map(|r| r.priority)
    }

    /// All roles, most privileged first.
    pub fn roles(&self) -> &[RoleDef] {
        &self.roles
    }

    pub fn top(&self) -> &RoleDef {
        &self.roles[0]
    }

    pub fn lowest(&self) -> &RoleDef {
        &self.roles[self.roles.len() - 1]
    }

    /// Passes iff `priority(actual) >= priority(required)`.
    ///
    /// An unknown role on either side denies.
    pub fn require_minimum_role(&self, actual: &str, required: &str) -> Result<(), Denial> {
        let Some(required_priority) = self.priority(required) else {
            return Err(Denial {
                reason: format!("required role '{required}' is not configured"),
            });
        };
        match self.priority(actual) {
            Some(p) if p >= required_priority => Ok(()),
            Some(_) => Err(Denial {
                reason: format!("{actual} is below minimum role: {required}"),
            }),
            None => Err(Denial {
                reason: format!("{actual} is not a recognised role"),
            }),
        }
    }

    /// Passes iff `actual` is one of `allowed`.
    pub fn require_any_of(&self, actual: &str, allowed: &[&str]) -> Result<(), Denial> {
        if self.get(actual).is_some() && allowed.iter().any(|r| r.eq_ignore_ascii_case(actual)) {
            Ok(())
        } else {
            Err(Denial {
                reason: format!("{actual} is not one of: {}", allowed.join(", ")),
            })
        }
    }
}

impl Default for RoleHierarchy {
    /// The built-in hierarchy (`config::DEFAULT_ROLE_HIERARCHY`).
    fn default() -> Self {
        let role = |name: &str, priority, protected| RoleDef {
            name: name.to_string(),
            priority,
            protected,
        };
        Self {
            roles: vec![
                role("admin", 100, true),
                role("manager", 75, false),
                role("dispatcher", 50, false),
                role("technician", 25, false),
                role("viewer", 10, false),
            ],
        }
    }
}
