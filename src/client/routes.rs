// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Client surfaces and the per-navigation authorization check.

use crate::auth::roles::{RoleDef, RoleHierarchy, RoleHierarchyError};
use crate::models::UserView;

use super::auth_state::AuthSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    OAuthCallback,
    Dashboard,
    WorkOrders,
    Customers,
    Invoices,
    Profile,
    Technicians,
    Users,
    AuditLog,
}

/// Who may see a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
    MinimumRole(&'static str),
}

impl Route {
    pub const ALL: [Route; 10] = [
        Route::Login,
        Route::OAuthCallback,
        Route::Dashboard,
        Route::WorkOrders,
        Route::Customers,
        Route::Invoices,
        Route::Profile,
        Route::Technicians,
        Route::Users,
        Route::AuditLog,
    ];

    pub fn access(self) -> Access {
        match self {
            Route::Login | Route::OAuthCallback => Access::Public,
            Route::Dashboard
            | Route::WorkOrders
            | Route::Customers
            | Route::Invoices
            | Route::Profile => Access::Authenticated,
            Route::Technicians => Access::MinimumRole("dispatcher"),
            Route::Users => Access::MinimumRole("manager"),
            Route::AuditLog => Access::MinimumRole("admin"),
        }
    }

    /// Sign-in surfaces never trigger an auth redirect.
    pub fn is_auth_surface(self) -> bool {
        matches!(self, Route::Login | Route::OAuthCallback)
    }

    pub fn path(self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::OAuthCallback => "/oauth/callback",
            Route::Dashboard => "/",
            Route::WorkOrders => "/work-orders",
            Route::Customers => "/customers",
            Route::Invoices => "/invoices",
            Route::Profile => "/profile",
            Route::Technicians => "/technicians",
            Route::Users => "/users",
            Route::AuditLog => "/audit-log",
        }
    }

    /// Resolve a deep link. Query strings and trailing slashes are ignored.
    pub fn from_path(path: &str) -> Option<Route> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let trimmed = path.trim_end_matches('/');
        let path = if trimmed.is_empty() { "/" } else { trimmed };
        Route::ALL.into_iter().find(|r| r.path() == path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Allow,
    Redirect(Route),
}

/// Consulted before any surface is shown, including on first paint.
#[derive(Debug, Clone)]
pub struct RouteGate {
    roles: RoleHierarchy,
}

impl RouteGate {
    pub fn new(roles: RoleHierarchy) -> Self {
        Self { roles }
    }

    /// Build from the hierarchy the server reports in `/v1/auth/config`.
    pub fn from_roles(roles: Vec<RoleDef>) -> Result<Self, RoleHierarchyError> {
        Ok(Self::new(RoleHierarchy::new(roles)?))
    }

    pub fn check(&self, target: Route, authenticated: bool, user: Option<&UserView>) -> RouteDecision {
        let required = match target.access() {
            Access::Public => return RouteDecision::Allow,
            Access::Authenticated => None,
            Access::MinimumRole(role) => Some(role),
        };
        let Some(user) = user.filter(|_| authenticated) else {
            return RouteDecision::Redirect(Route::Login);
        };
        match required {
            None => RouteDecision::Allow,
            Some(role) => match self.roles.require_minimum_role(&user.role, role) {
                Ok(()) => RouteDecision::Allow,
                Err(denial) => {
                    tracing::debug!(route = ?target, reason = %denial, "route denied");
                    RouteDecision::Redirect(Route::Dashboard)
                }
            },
        }
    }

    pub fn check_snapshot(&self, target: Route, snapshot: &AuthSnapshot) -> RouteDecision {
        self.check(target, snapshot.is_authenticated(), snapshot.user.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::auth_state::test_support::user;

    fn gate() -> RouteGate {
        RouteGate::new(RoleHierarchy::default())
    }

    #[test]
    fn public_routes_always_allowed() {
        assert_eq!(gate().check(Route::Login, false, None), RouteDecision::Allow);
        assert_eq!(gate().check(Route::OAuthCallback, false, None), RouteDecision::Allow);
    }

    #[test]
    fn unauthenticated_goes_to_login() {
        for route in [Route::Dashboard, Route::Invoices, Route::AuditLog] {
            assert_eq!(
                gate().check(route, false, None),
                RouteDecision::Redirect(Route::Login)
            );
        }
        // A user without the authenticated flag is not trusted
        let viewer = user("viewer");
        assert_eq!(
            gate().check(Route::Profile, false, Some(&viewer)),
            RouteDecision::Redirect(Route::Login)
        );
        assert_eq!(
            gate().check(Route::Profile, true, None),
            RouteDecision::Redirect(Route::Login)
        );
    }

    #[test]
    fn role_routes_follow_hierarchy() {
        let dispatcher = user("dispatcher");
        let gate = gate();
        assert_eq!(gate.check(Route::Technicians, true, Some(&dispatcher)), RouteDecision::Allow);
        assert_eq!(
            gate.check(Route::Users, true, Some(&dispatcher)),
            RouteDecision::Redirect(Route::Dashboard)
        );
        let admin = user("admin");
        assert_eq!(gate.check(Route::AuditLog, true, Some(&admin)), RouteDecision::Allow);
    }

    #[test]
    fn unknown_role_is_denied() {
        let ghost = user("ghost");
        assert_eq!(
            gate().check(Route::Technicians, true, Some(&ghost)),
            RouteDecision::Redirect(Route::Dashboard)
        );
        assert_eq!(gate().check(Route::Dashboard, true, Some(&ghost)), RouteDecision::Allow);
    }

    #[test]
    fn deep_links_resolve() {
        assert_eq!(Route::from_path("/users/"), Some(Route::Users));
        assert_eq!(Route::from_path("/oauth/callback?code=x&state=y"), Some(Route::OAuthCallback));
        assert_eq!(Route::from_path(""), Some(Route::Dashboard));
        assert_eq!(Route::from_path("/nowhere"), None);
        for route in Route::ALL {
            assert_eq!(Route::from_path(route.path()), Some(route));
        }
    }

    #[test]
    fn gate_from_server_roles() {
        let roles = RoleHierarchy::default().roles().to_vec();
        let gate = RouteGate::from_roles(roles).unwrap();
        let manager = user("manager");
        assert_eq!(gate.check(Route::Users, true, Some(&manager)), RouteDecision::Allow);
        assert!(RouteGate::from_roles(Vec::new()).is_err());

        let mut shadowed = RoleHierarchy::default().roles().to_vec();
        shadowed.push(RoleDef {
            name: "ADMIN".to_string(),
            priority: 1,
            protected: false,
        });
        assert!(matches!(
            RouteGate::from_roles(shadowed),
            Err(RoleHierarchyError::DuplicateName(_))
        ));
    }
}
