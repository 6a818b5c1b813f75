// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Sign-in, token refresh, sign-out and discovery endpoints.

use axum::{extract::State, http::StatusCode, Json};

use crate::{
    auth::{Auth, AuthError, AuthProvider, Credentials, RoleDef},
    error::ApiError,
    models::{
        AuthConfigResponse, LocalLoginRequest, LocalLoginResponse, LogoutRequest,
        OAuthCallbackRequest, OAuthClientConfig, RefreshRequest, RefreshResponse,
        TokenPairResponse, UserView,
    },
    state::AppState,
    storage::{AuditAction, AuditLogEntry, RequestMeta},
};

/// Describe the sign-in methods this deployment offers.
#[utoipa::path(
    get,
    path = "/v1/auth/config",
    tag = "Auth",
    responses(
        (status = 200, description = "Sign-in configuration", body = AuthConfigResponse)
    )
)]
pub async fn auth_config(State(state): State<AppState>) -> Json<AuthConfigResponse> {
    let oauth = state.config.oauth.as_ref().and_then(|o| {
        o.authorize_url.as_ref().map(|authorize_url| OAuthClientConfig {
            authorize_url: authorize_url.clone(),
            client_id: o.client_id.clone(),
            redirect_uri: o.redirect_uri.clone(),
        })
    });
    Json(AuthConfigResponse {
        dev_auth_enabled: state.config.dev_auth_enabled,
        environment: state.config.environment,
        roles: state.roles.roles().to_vec(),
        oauth,
    })
}

/// Sign in as the pre-provisioned development identity for a role.
#[utoipa::path(
    post,
    path = "/v1/auth/local",
    tag = "Auth",
    request_body = LocalLoginRequest,
    responses(
        (status = 200, description = "Signed in", body = LocalLoginResponse),
        (status = 400, description = "Unknown role"),
        (status = 403, description = "Local sign-in is disabled")
    )
)]
pub async fn local_login(
    State(state): State<AppState>,
    meta: RequestMeta,
    Json(req): Json<LocalLoginRequest>,
) -> Result<Json<LocalLoginResponse>, ApiError> {
    let identity = state
        .local
        .authenticate(Credentials::Local { role: req.role }, &meta)
        .await?;
    let session = state.sessions.start(identity, AuthProvider::Local)?;

    Ok(Json(LocalLoginResponse {
        token: session.access_token,
        refresh_token: session.refresh_token,
        expires_in: session.expires_in,
        user: UserView::new(&session.identity, &state.roles),
    }))
}

/// Complete an authorization code + PKCE sign-in.
#[utoipa::path(
    post,
    path = "/v1/auth/oauth/callback",
    tag = "Auth",
    request_body = OAuthCallbackRequest,
    responses(
        (status = 200, description = "Signed in", body = TokenPairResponse),
        (status = 400, description = "Malformed code or verifier"),
        (status = 401, description = "Provider exchange failed")
    )
)]
pub async fn oauth_callback(
    State(state): State<AppState>,
    meta: RequestMeta,
    Json(req): Json<OAuthCallbackRequest>,
) -> Result<Json<TokenPairResponse>, ApiError> {
    let Some(strategy) = state.oauth.as_deref() else {
        tracing::warn!("oauth callback received but no provider is configured");
        state.audit.record(
            AuditLogEntry::new(AuditAction::LoginFailure)
                .with_request(&meta)
                .with("provider", AuthProvider::OAuth.to_string())
                .with("reason", "provider not configured"),
        );
        return Err(AuthError::ProviderExchangeFailure.into());
    };

    let credentials = Credentials::AuthorizationCode {
        code: req.code,
        code_verifier: req.code_verifier,
    };
    let identity = strategy.authenticate(credentials, &meta).await?;
    let session = state.sessions.start(identity, AuthProvider::OAuth)?;

    Ok(Json(TokenPairResponse {
        access_token: session.access_token,
        refresh_token: session.refresh_token,
        expires_in: session.expires_in,
        user: UserView::new(&session.identity, &state.roles),
    }))
}

/// Rotate a refresh credential into a new token pair.
#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    tag = "Auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = RefreshResponse),
        (status = 401, description = "Refresh credential invalid or reused")
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    meta: RequestMeta,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let session = state.sessions.refresh(&req.refresh_token, &meta)?;
    Ok(Json(RefreshResponse {
        access_token: session.access_token,
        refresh_token: session.refresh_token,
        expires_in: session.expires_in,
    }))
}

/// Revoke a refresh credential. Always 204.
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    tag = "Auth",
    request_body = LogoutRequest,
    responses(
        (status = 204, description = "Signed out")
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    meta: RequestMeta,
    body: Option<Json<LogoutRequest>>,
) -> Result<StatusCode, ApiError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    if let Some(token) = req.refresh_token {
        state.sessions.logout(&token, &meta)?;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// The authenticated caller.
#[utoipa::path(
    get,
    path = "/v1/auth/me",
    tag = "Auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Current user", body = UserView),
        (status = 401, description = "Missing token"),
        (status = 403, description = "Invalid token or inactive user")
    )
)]
pub async fn me(State(state): State<AppState>, Auth(user): Auth) -> Json<UserView> {
    Json(UserView::new(&user.identity, &state.roles))
}

/// The role hierarchy, highest priority first.
#[utoipa::path(
    get,
    path = "/v1/roles",
    tag = "Auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Configured roles", body = [RoleDef])
    )
)]
pub async fn list_roles(State(state): State<AppState>, Auth(_user): Auth) -> Json<Vec<RoleDef>> {
    Json(state.roles.roles().to_vec())
}
