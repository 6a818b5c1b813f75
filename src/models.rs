// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies shared by the HTTP handlers and the client
//! service. All types use camelCase on the wire and derive `ToSchema` for the
//! OpenAPI document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::roles::{RoleDef, RoleHierarchy};
use crate::config::Environment;
use crate::storage::Identity;

// =============================================================================
// Users
// =============================================================================

/// A user as seen by API consumers.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: u64,
    pub email: String,
    pub role: String,
    /// Priority of `role` in the deployment's hierarchy.
    pub role_priority: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
}

impl UserView {
    pub fn new(identity: &Identity, roles: &RoleHierarchy) -> Self {
        Self {
            id: identity.id,
            email: identity.email.clone(),
            role: identity.role.clone(),
            role_priority: roles.priority(&identity.role).unwrap_or(0),
            active: identity.active,
            created_at: identity.created_at,
            last_login_at: identity.last_login_at,
        }
    }
}

/// Request to change a user's role.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SetRoleRequest {
    pub role: String,
}

/// Request to activate or deactivate a user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SetActiveRequest {
    pub active: bool,
}

// =============================================================================
// Sign-in
// =============================================================================

/// Request a development identity by role.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LocalLoginRequest {
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocalLoginResponse {
    pub token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    pub user: UserView,
}

/// Provider redirect parameters.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OAuthCallbackRequest {
    pub code: String,
    pub code_verifier: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub user: UserView,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

// =============================================================================
// Discovery
// =============================================================================

/// Parameters the client needs to start an authorization code flow.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OAuthClientConfig {
    pub authorize_url: String,
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfigResponse {
    pub dev_auth_enabled: bool,
    pub environment: Environment,
    /// Highest priority first.
    pub roles: Vec<RoleDef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oauth: Option<OAuthClientConfig>,
}
