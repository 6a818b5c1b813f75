// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity administration endpoints.
//!
//! Listing requires `manager`; a single user is visible to themselves or a
//! manager; role and activation changes are admin-only (enforced by a route
//! layer, see `api::router`).

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    auth::Auth,
    error::ApiError,
    models::{SetActiveRequest, SetRoleRequest, UserView},
    state::AppState,
    storage::{AuditAction, AuditLogEntry, RequestMeta},
};

/// Minimum role for reading other users' records.
pub const USER_READ_ROLE: &str = "manager";

/// List all identities.
#[utoipa::path(
    get,
    path = "/v1/users",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "All users", body = [UserView]),
        (status = 403, description = "Insufficient role")
    )
)]
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserView>>, ApiError> {
    let users = state
        .db
        .users()
        .list()?
        .iter()
        .map(|identity| UserView::new(identity, &state.roles))
        .collect();
    Ok(Json(users))
}

/// Get one identity. Callers may always read their own record.
#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    tag = "Users",
    security(("bearer" = [])),
    params(("id" = u64, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = UserView),
        (status = 403, description = "Not the caller and insufficient role"),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    Auth(user): Auth,
    meta: RequestMeta,
    Path(id): Path<u64>,
) -> Result<Json<UserView>, ApiError> {
    state
        .gate
        .require_owner_or_minimum_role(&user, id, USER_READ_ROLE, &meta)?;
    let identity = state
        .db
        .users()
        .get(id)?
        .ok_or_else(|| ApiError::not_found(format!("User {id} not found")))?;
    Ok(Json(UserView::new(&identity, &state.roles)))
}

/// Assign a role.
#[utoipa::path(
    put,
    path = "/v1/users/{id}/role",
    tag = "Users",
    security(("bearer" = [])),
    params(("id" = u64, Path, description = "User id")),
    request_body = SetRoleRequest,
    responses(
        (status = 200, description = "Updated user", body = UserView),
        (status = 400, description = "Unknown role"),
        (status = 404, description = "User not found"),
        (status = 409, description = "Would leave a protected role without an active holder")
    )
)]
pub async fn set_role(
    State(state): State<AppState>,
    Auth(admin): Auth,
    meta: RequestMeta,
    Path(id): Path<u64>,
    Json(req): Json<SetRoleRequest>,
) -> Result<Json<UserView>, ApiError> {
    if state.roles.get(&req.role).is_none() {
        return Err(ApiError::bad_request(format!("Unknown role: {}", req.role)));
    }

    let users = state.db.users();
    let previous = users
        .get(id)?
        .ok_or_else(|| ApiError::not_found(format!("User {id} not found")))?
        .role;
    let identity = users.set_role(id, &req.role, &state.roles)?;

    tracing::info!(
        actor_id = admin.user_id(),
        user_id = id,
        from = %previous,
        to = %identity.role,
        "role changed"
    );
    state.audit.record(
        AuditLogEntry::new(AuditAction::RoleChanged)
            .with_actor(admin.user_id())
            .with_request(&meta)
            .with("user_id", id)
            .with("from", previous)
            .with("to", identity.role.clone()),
    );
    Ok(Json(UserView::new(&identity, &state.roles)))
}

/// Activate or deactivate an identity. Deactivation ends every session.
#[utoipa::path(
    put,
    path = "/v1/users/{id}/active",
    tag = "Users",
    security(("bearer" = [])),
    params(("id" = u64, Path, description = "User id")),
    request_body = SetActiveRequest,
    responses(
        (status = 200, description = "Updated user", body = UserView),
        (status = 404, description = "User not found"),
        (status = 409, description = "Would leave a protected role without an active holder")
    )
)]
pub async fn set_active(
    State(state): State<AppState>,
    Auth(admin): Auth,
    meta: RequestMeta,
    Path(id): Path<u64>,
    Json(req): Json<SetActiveRequest>,
) -> Result<Json<UserView>, ApiError> {
    let identity = state.db.users().set_active(id, req.active, &state.roles)?;

    let (action, revoked) = if identity.active {
        (AuditAction::AccountActivated, 0)
    } else {
        (AuditAction::AccountDeactivated, state.sessions.revoke_all(id)?)
    };
    tracing::info!(
        actor_id = admin.user_id(),
        user_id = id,
        active = identity.active,
        revoked,
        "account status changed"
    );
    state.audit.record(
        AuditLogEntry::new(action)
            .with_actor(admin.user_id())
            .with_request(&meta)
            .with("user_id", id)
            .with("revoked_sessions", revoked),
    );
    Ok(Json(UserView::new(&identity, &state.roles)))
}
