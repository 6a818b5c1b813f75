// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Role-based access checks.
//!
//! Checks are available two ways: called from a handler (`RoleGate`), or as a
//! per-route layer (`RoleGuard` + [`enforce_role`]). Both audit denials and
//! return [`AuthError::InsufficientRole`] with a caller-safe reason.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::extractor::request_meta;
use super::roles::{Denial, RoleHierarchy};
use super::{AuthError, AuthenticatedUser};
use crate::storage::{AuditAction, AuditLogEntry, AuditRecorder, RequestMeta};

/// RBAC enforcement over the deployment's role hierarchy.
pub struct RoleGate {
    roles: RoleHierarchy,
    audit: AuditRecorder,
}

impl RoleGate {
    pub fn new(roles: RoleHierarchy, audit: AuditRecorder) -> Self {
        Self { roles, audit }
    }

    pub fn roles(&self) -> &RoleHierarchy {
        &self.roles
    }

    /// Passes iff the user's role priority is at least that of `role`.
    pub fn require_minimum_role(
        &self,
        user: &AuthenticatedUser,
        role: &str,
        meta: &RequestMeta,
    ) -> Result<(), AuthError> {
        self.roles
            .require_minimum_role(user.role_name(), role)
            .map_err(|denial| self.deny(user, denial, meta))
    }

    /// Passes iff the user's role is one of `roles`.
    pub fn require_any_of(
        &self,
        user: &AuthenticatedUser,
        roles: &[&str],
        meta: &RequestMeta,
    ) -> Result<(), AuthError> {
        self.roles
            .require_any_of(user.role_name(), roles)
            .map_err(|denial| self.deny(user, denial, meta))
    }

    /// Passes iff the user owns the resource or holds at least `role`.
    pub fn require_owner_or_minimum_role(
        &self,
        user: &AuthenticatedUser,
        owner_id: u64,
        role: &str,
        meta: &RequestMeta,
    ) -> Result<(), AuthError> {
        if user.user_id() == owner_id {
            return Ok(());
        }
        self.require_minimum_role(user, role, meta)
    }

    fn deny(&self, user: &AuthenticatedUser, denial: Denial, meta: &RequestMeta) -> AuthError {
        tracing::info!(
            user_id = user.user_id(),
            role = user.role_name(),
            reason = %denial,
            "role check denied"
        );
        self.audit.record(
            AuditLogEntry::new(AuditAction::PermissionDenied)
                .with_actor(user.user_id())
                .with_request(meta)
                .with("role", user.role_name())
                .with("reason", denial.reason.as_str()),
        );
        AuthError::InsufficientRole {
            reason: denial.reason,
        }
    }
}

#[derive(Debug, Clone)]
enum Requirement {
    Minimum(String),
    AnyOf(Vec<String>),
}

/// State for a per-route role check layer.
///
/// ```rust,ignore
/// Router::new()
///     .route("/v1/users", get(list_users))
///     .route_layer(from_fn_with_state(RoleGuard::minimum(gate, "manager"), enforce_role))
/// ```
#[derive(Clone)]
pub struct RoleGuard {
    gate: Arc<RoleGate>,
    requirement: Requirement,
}

impl RoleGuard {
    pub fn minimum(gate: Arc<RoleGate>, role: impl Into<String>) -> Self {
        Self {
            gate,
            requirement: Requirement::Minimum(role.into()),
        }
    }

    pub fn any_of(gate: Arc<RoleGate>, roles: &[&str]) -> Self {
        Self {
            gate,
            requirement: Requirement::AnyOf(roles.iter().map(|r| r.to_string()).collect()),
        }
    }

    fn check(&self, user: &AuthenticatedUser, meta: &RequestMeta) -> Result<(), AuthError> {
        match &self.requirement {
            Requirement::Minimum(role) => self.gate.require_minimum_role(user, role, meta),
            Requirement::AnyOf(roles) => {
                let roles: Vec<&str> = roles.iter().map(String::as_str).collect();
                self.gate.require_any_of(user, &roles, meta)
            }
        }
    }
}

/// Role check middleware. Must run after the request authenticator.
pub async fn enforce_role(State(guard): State<RoleGuard>, request: Request, next: Next) -> Response {
    let Some(user) = request.extensions().get::<AuthenticatedUser>() else {
        return AuthError::Unauthenticated.into_response();
    };
    let meta = request_meta(request.headers(), request.extensions());
    match guard.check(user, &meta) {
        Ok(()) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::AuthProvider;
    use crate::storage::test_support::temp_database;
    use crate::storage::Identity;

    fn user(id: u64, role: &str, roles: &RoleHierarchy) -> AuthenticatedUser {
        AuthenticatedUser {
            identity: Identity {
                id,
                external_subject: None,
                email: format!("{role}@example.com"),
                role: role.to_string(),
                active: true,
                created_at: chrono::Utc::now(),
                last_login_at: None,
            },
            role: roles.get(role).cloned().unwrap(),
            provider: AuthProvider::OAuth,
            expires_at: 0,
        }
    }

    fn gate() -> (tempfile::TempDir, RoleGate, AuditRecorder) {
        let (temp, db) = temp_database();
        let audit = AuditRecorder::new(Arc::new(db));
        (temp, RoleGate::new(RoleHierarchy::default(), audit.clone()), audit)
    }

    #[test]
    fn minimum_role_denial_is_audited_with_reason() {
        let (_temp, gate, audit) = gate();
        let technician = user(4, "technician", gate.roles());
        let meta = RequestMeta::default();

        let err = gate
            .require_minimum_role(&technician, "manager", &meta)
            .unwrap_err();
        assert_eq!(
            err,
            AuthError::InsufficientRole {
                reason: "technician is below minimum role: manager".to_string()
            }
        );

        let denied = audit.by_action(AuditAction::PermissionDenied).unwrap();
        assert_eq!(denied.len(), 1);
        assert_eq!(denied[0].actor_id, Some(4));
        assert_eq!(denied[0].context["reason"], "technician is below minimum role: manager");
    }

    #[test]
    fn passing_checks_are_not_audited() {
        let (_temp, gate, audit) = gate();
        let manager = user(2, "manager", gate.roles());
        let meta = RequestMeta::default();
        assert!(gate.require_minimum_role(&manager, "dispatcher", &meta).is_ok());
        assert!(gate.require_any_of(&manager, &["manager", "admin"], &meta).is_ok());
        assert!(audit.recent(10).unwrap().is_empty());
    }

    #[test]
    fn any_of_denies_non_members() {
        let (_temp, gate, _audit) = gate();
        let admin = user(1, "admin", gate.roles());
        assert!(gate
            .require_any_of(&admin, &["dispatcher", "technician"], &RequestMeta::default())
            .is_err());
    }

    #[test]
    fn owner_or_elevated() {
        let (_temp, gate, _audit) = gate();
        let viewer = user(9, "viewer", gate.roles());
        let manager = user(2, "manager", gate.roles());
        let meta = RequestMeta::default();

        assert!(gate.require_owner_or_minimum_role(&viewer, 9, "manager", &meta).is_ok());
        assert!(gate.require_owner_or_minimum_role(&viewer, 2, "manager", &meta).is_err());
        assert!(gate.require_owner_or_minimum_role(&manager, 9, "manager", &meta).is_ok());
    }
}
