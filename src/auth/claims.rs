// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token claims and the authenticated user attached to each request.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::roles::RoleDef;
use crate::storage::Identity;

/// How the identity behind a token signed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    /// Pre-provisioned development identity.
    Local,
    /// External OAuth2/OIDC provider.
    OAuth,
}

impl fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthProvider::Local => write!(f, "local"),
            AuthProvider::OAuth => write!(f, "oauth"),
        }
    }
}

/// Claims carried by every token this service issues.
///
/// ```json
/// { "iss": "...", "sub": "...", "aud": "...", "exp": 0, "iat": 0,
///   "email": "...", "role": "...", "provider": "local", "userId": 1 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub email: String,
    pub role: String,
    pub provider: AuthProvider,
    pub user_id: u64,
}

/// The identity-specific part of a token; the codec fills in the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSubject {
    pub subject: String,
    pub email: String,
    pub role: String,
    pub provider: AuthProvider,
    pub user_id: u64,
}

impl TokenSubject {
    pub fn for_identity(identity: &Identity, provider: AuthProvider) -> Self {
        Self {
            subject: identity
                .external_subject
                .clone()
                .unwrap_or_else(|| format!("user:{}", identity.id)),
            email: identity.email.clone(),
            role: identity.role.clone(),
            provider,
            user_id: identity.id,
        }
    }
}

impl From<&TokenClaims> for TokenSubject {
    fn from(claims: &TokenClaims) -> Self {
        Self {
            subject: claims.sub.clone(),
            email: claims.email.clone(),
            role: claims.role.clone(),
            provider: claims.provider,
            user_id: claims.user_id,
        }
    }
}

/// Authenticated user information attached to a request.
///
/// Only ever built from a verified token AND the current durable record, so
/// `identity.role` reflects the stored role, not the role in the token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub identity: Identity,
    pub role: RoleDef,
    pub provider: AuthProvider,
    /// Token expiration (Unix timestamp)
    pub expires_at: i64,
}

impl AuthenticatedUser {
    pub fn user_id(&self) -> u64 {
        self.identity.id
    }

    pub fn role_name(&self) -> &str {
        &self.role.name
    }
}
