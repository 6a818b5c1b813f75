// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request authentication middleware for Axum.
//!
//! Applied to every protected router subtree with
//! `axum::middleware::from_fn_with_state(authenticator, auth_middleware)`.
//!
//! | Situation                                   | Result            |
//! |---------------------------------------------|-------------------|
//! | no bearer token                             | `Unauthenticated` |
//! | token fails verification (any reason)       | `Forbidden`       |
//! | identity gone, inactive, or role unknown    | `Forbidden`       |
//! | otherwise                                   | user attached     |
//!
//! Every rejection is audited before the response is returned, and no
//! handler code runs for a rejected request.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::codec::TokenCodec;
use super::extractor::request_meta;
use super::roles::RoleHierarchy;
use super::{AuthError, AuthenticatedUser};
use crate::storage::{AuditAction, AuditLogEntry, AuditRecorder, AuthDatabase, RequestMeta};

/// Verifies bearer tokens and resolves them to current identities.
#[derive(Clone)]
pub struct RequestAuthenticator {
    codec: Arc<TokenCodec>,
    db: Arc<AuthDatabase>,
    roles: Arc<RoleHierarchy>,
    audit: AuditRecorder,
}

impl RequestAuthenticator {
    pub fn new(
        codec: Arc<TokenCodec>,
        db: Arc<AuthDatabase>,
        roles: Arc<RoleHierarchy>,
        audit: AuditRecorder,
    ) -> Self {
        Self {
            codec,
            db,
            roles,
            audit,
        }
    }

    /// Authenticate a request from its headers.
    pub fn authenticate(
        &self,
        headers: &HeaderMap,
        meta: &RequestMeta,
    ) -> Result<AuthenticatedUser, AuthError> {
        let Some(token) = bearer_token(headers) else {
            self.reject(None, "no bearer token", meta);
            return Err(AuthError::Unauthenticated);
        };

        let claims = match self.codec.verify(token) {
            Ok(claims) => claims,
            Err(e) => {
                self.reject(None, &e.to_string(), meta);
                return Err(AuthError::Forbidden);
            }
        };

        let identity = match self.db.users().get(claims.user_id)? {
            Some(identity) if identity.active => identity,
            Some(_) => {
                self.reject(Some(claims.user_id), "identity is deactivated", meta);
                return Err(AuthError::Forbidden);
            }
            None => {
                self.reject(Some(claims.user_id), "identity no longer exists", meta);
                return Err(AuthError::Forbidden);
            }
        };

        // The stored role is authoritative; the token's role claim may be stale
        let Some(role) = self.roles.get(&identity.role).cloned() else {
            self.reject(Some(identity.id), "stored role is not configured", meta);
            return Err(AuthError::Forbidden);
        };

        Ok(AuthenticatedUser {
            identity,
            role,
            provider: claims.provider,
            expires_at: claims.exp,
        })
    }

    fn reject(&self, actor: Option<u64>, reason: &str, meta: &RequestMeta) {
        tracing::debug!(?actor, reason, "request authentication rejected");
        self.audit.record(
            AuditLogEntry::new(AuditAction::TokenRejected)
                .with_optional_actor(actor)
                .with_request(meta)
                .with("reason", reason),
        );
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Authentication middleware function.
pub async fn auth_middleware(
    State(authenticator): State<RequestAuthenticator>,
    mut request: Request,
    next: Next,
) -> Response {
    let meta = request_meta(request.headers(), request.extensions());
    match authenticator.authenticate(request.headers(), &meta) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::{AuthProvider, TokenSubject};
    use crate::config::{SigningKey, SigningSecret};
    use crate::storage::test_support::temp_database;
    use axum::http::HeaderValue;
    use std::time::Duration;

    struct Fixture {
        _temp: tempfile::TempDir,
        db: Arc<AuthDatabase>,
        codec: Arc<TokenCodec>,
        audit: AuditRecorder,
        authenticator: RequestAuthenticator,
    }

    fn fixture() -> Fixture {
        let (temp, db) = temp_database();
        let db = Arc::new(db);
        let key = SigningKey {
            key_id: "k1".to_string(),
            secret: SigningSecret::new(b"middleware-test-secret-0123456789abcdef".to_vec()),
        };
        let codec = Arc::new(TokenCodec::new("https://auth.test", &key, None));
        let audit = AuditRecorder::new(Arc::clone(&db));
        let authenticator = RequestAuthenticator::new(
            Arc::clone(&codec),
            Arc::clone(&db),
            Arc::new(RoleHierarchy::default()),
            audit.clone(),
        );
        Fixture {
            _temp: temp,
            db,
            codec,
            audit,
            authenticator,
        }
    }

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    fn token_for(f: &Fixture, role: &str) -> (u64, String) {
        let identity = f.db.users().ensure_dev_identity(role).unwrap();
        let subject = TokenSubject::for_identity(&identity, AuthProvider::Local);
        (identity.id, f.codec.issue(&subject, Duration::from_secs(60)).unwrap())
    }

    #[test]
    fn bearer_parsing() {
        assert_eq!(bearer_token(&headers("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers("bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers("Basic abc")), None);
        assert_eq!(bearer_token(&headers("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn missing_token_is_unauthenticated() {
        let f = fixture();
        let result = f.authenticator.authenticate(&HeaderMap::new(), &RequestMeta::default());
        assert_eq!(result.unwrap_err(), AuthError::Unauthenticated);
    }

    #[test]
    fn invalid_token_is_forbidden_and_audited() {
        let f = fixture();
        let result = f
            .authenticator
            .authenticate(&headers("Bearer not.a.token"), &RequestMeta::default());
        assert_eq!(result.unwrap_err(), AuthError::Forbidden);
        assert_eq!(f.audit.by_action(AuditAction::TokenRejected).unwrap().len(), 1);
    }

    #[test]
    fn valid_token_attaches_stored_identity() {
        let f = fixture();
        let (id, token) = token_for(&f, "dispatcher");
        let user = f
            .authenticator
            .authenticate(&headers(&format!("Bearer {token}")), &RequestMeta::default())
            .unwrap();
        assert_eq!(user.user_id(), id);
        assert_eq!(user.role.priority, 50);
        assert_eq!(user.provider, AuthProvider::Local);
    }

    #[test]
    fn deactivated_identity_is_forbidden_despite_valid_token() {
        let f = fixture();
        let (id, token) = token_for(&f, "technician");
        f.db.users()
            .set_active(id, false, &RoleHierarchy::default())
            .unwrap();

        let result = f
            .authenticator
            .authenticate(&headers(&format!("Bearer {token}")), &RequestMeta::default());
        assert_eq!(result.unwrap_err(), AuthError::Forbidden);
        let rejected = f.audit.by_action(AuditAction::TokenRejected).unwrap();
        assert_eq!(rejected[0].actor_id, Some(id));
    }

    #[test]
    fn role_changes_apply_to_existing_tokens() {
        let f = fixture();
        let (id, token) = token_for(&f, "viewer");
        f.db.users()
            .set_role(id, "manager", &RoleHierarchy::default())
            .unwrap();
        let user = f
            .authenticator
            .authenticate(&headers(&format!("Bearer {token}")), &RequestMeta::default())
            .unwrap();
        assert_eq!(user.role_name(), "manager");
    }
}
