// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{auth_middleware, enforce_role, RoleDef, RoleGuard},
    error,
    models::{
        AuthConfigResponse, LocalLoginRequest, LocalLoginResponse, LogoutRequest,
        OAuthCallbackRequest, OAuthClientConfig, RefreshRequest, RefreshResponse,
        SetActiveRequest, SetRoleRequest, TokenPairResponse, UserView,
    },
    state::AppState,
    storage::{AuditAction, AuditLogEntry},
};

pub mod admin;
pub mod auth;
pub mod health;
pub mod users;

/// Role required by the admin-only routes.
pub const ADMIN_ROLE: &str = "admin";

pub fn router(state: AppState) -> Router {
    let gate = Arc::clone(&state.gate);
    let require = |role: &str| {
        middleware::from_fn_with_state(RoleGuard::minimum(Arc::clone(&gate), role), enforce_role)
    };

    let public_routes = Router::new()
        .route("/health", get(health::health))
        .route("/v1/auth/config", get(auth::auth_config))
        .route("/v1/auth/local", post(auth::local_login))
        .route("/v1/auth/oauth/callback", post(auth::oauth_callback))
        .route("/v1/auth/refresh", post(auth::refresh))
        .route("/v1/auth/logout", post(auth::logout));

    let manager_routes = Router::new()
        .route("/v1/users", get(users::list_users))
        .route_layer(require(users::USER_READ_ROLE));

    let admin_routes = Router::new()
        .route("/v1/users/{id}/role", put(users::set_role))
        .route("/v1/users/{id}/active", put(users::set_active))
        .route("/v1/admin/audit", get(admin::list_audit))
        .route_layer(require(ADMIN_ROLE));

    // Per-handler checks (self-or-manager) live in the handlers themselves.
    let protected_routes = Router::new()
        .route("/v1/auth/me", get(auth::me))
        .route("/v1/roles", get(auth::list_roles))
        .route("/v1/users/{id}", get(users::get_user))
        .merge(manager_routes)
        .merge(admin_routes)
        .route_layer(middleware::from_fn_with_state(
            state.authenticator.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .fallback(error::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(cors_layer()),
        )
}

/// Bearer tokens travel in a header, never in cookies, so any origin may call.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::auth_config,
        auth::local_login,
        auth::oauth_callback,
        auth::refresh,
        auth::logout,
        auth::me,
        auth::list_roles,
        users::list_users,
        users::get_user,
        users::set_role,
        users::set_active,
        admin::list_audit
    ),
    components(
        schemas(
            health::HealthResponse,
            health::HealthChecks,
            AuthConfigResponse,
            OAuthClientConfig,
            RoleDef,
            LocalLoginRequest,
            LocalLoginResponse,
            OAuthCallbackRequest,
            TokenPairResponse,
            RefreshRequest,
            RefreshResponse,
            LogoutRequest,
            UserView,
            SetRoleRequest,
            SetActiveRequest,
            AuditLogEntry,
            AuditAction,
            admin::AuditLogResponse
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Health", description = "Service health"),
        (name = "Auth", description = "Sign-in, tokens and discovery"),
        (name = "Users", description = "Identity administration"),
        (name = "Admin", description = "Audit log")
    )
)]
struct ApiDoc;
