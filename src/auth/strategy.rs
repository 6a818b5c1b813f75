// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Sign-in strategies.
//!
//! A closed set of variants behind one `authenticate` call. Each call records
//! exactly one audit entry, success or failure.

use std::sync::Arc;
use std::time::Duration;

use super::claims::AuthProvider;
use super::provider::{validate_code_verifier, IdentityProvider, ProviderError};
use super::roles::RoleHierarchy;
use super::AuthError;
use crate::storage::{AuditAction, AuditLogEntry, AuditRecorder, AuthDatabase, Identity, RequestMeta};

/// Provider-specific sign-in credentials.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Request a pre-provisioned development identity by role name.
    Local { role: String },
    /// Authorization code and PKCE verifier from the provider redirect.
    AuthorizationCode { code: String, code_verifier: String },
}

impl Credentials {
    fn provider(&self) -> AuthProvider {
        match self {
            Credentials::Local { .. } => AuthProvider::Local,
            Credentials::AuthorizationCode { .. } => AuthProvider::OAuth,
        }
    }
}

/// A failed attempt, before it is audited.
struct Failure {
    error: AuthError,
    actor: Option<u64>,
    reason: String,
}

impl Failure {
    fn new(error: AuthError, reason: impl Into<String>) -> Self {
        Self {
            error,
            actor: None,
            reason: reason.into(),
        }
    }

    fn with_actor(mut self, actor: u64) -> Self {
        self.actor = Some(actor);
        self
    }
}

impl From<crate::storage::StorageError> for Failure {
    fn from(e: crate::storage::StorageError) -> Self {
        tracing::error!(error = %e, "storage failure during sign-in");
        Failure::new(AuthError::Internal, "storage failure")
    }
}

/// Successful sign-in details that go into the audit entry.
struct Success {
    identity: Identity,
    created: bool,
}

/// Sign-in strategy variants.
pub enum AuthStrategy {
    Local(LocalStrategy),
    ExternalOAuth(ExternalOAuthStrategy),
}

impl AuthStrategy {
    pub fn provider(&self) -> AuthProvider {
        match self {
            AuthStrategy::Local(_) => AuthProvider::Local,
            AuthStrategy::ExternalOAuth(_) => AuthProvider::OAuth,
        }
    }

    /// Verify `credentials` and return the signed-in identity.
    pub async fn authenticate(
        &self,
        credentials: Credentials,
        meta: &RequestMeta,
    ) -> Result<Identity, AuthError> {
        let (audit, outcome) = match (self, &credentials) {
            (AuthStrategy::Local(s), Credentials::Local { role }) => (&s.audit, s.run(role)),
            (
                AuthStrategy::ExternalOAuth(s),
                Credentials::AuthorizationCode {
                    code,
                    code_verifier,
                },
            ) => (&s.audit, s.run(code, code_verifier).await),
            (AuthStrategy::Local(s), _) => (
                &s.audit,
                Err(Failure::new(
                    AuthError::InvalidRequest("credentials do not match sign-in method".into()),
                    "credential kind mismatch",
                )),
            ),
            (AuthStrategy::ExternalOAuth(s), _) => (
                &s.audit,
                Err(Failure::new(
                    AuthError::InvalidRequest("credentials do not match sign-in method".into()),
                    "credential kind mismatch",
                )),
            ),
        };
        finish(audit, credentials.provider(), outcome, meta)
    }
}

fn finish(
    audit: &AuditRecorder,
    provider: AuthProvider,
    outcome: Result<Success, Failure>,
    meta: &RequestMeta,
) -> Result<Identity, AuthError> {
    match outcome {
        Ok(Success { identity, created }) => {
            tracing::info!(user_id = identity.id, role = %identity.role, %provider, created, "sign-in succeeded");
            audit.record(
                AuditLogEntry::new(AuditAction::LoginSuccess)
                    .with_actor(identity.id)
                    .with_request(meta)
                    .with("provider", provider.to_string())
                    .with("created", created),
            );
            Ok(identity)
        }
        Err(failure) => {
            let action = if failure.error == AuthError::SecurityViolation {
                tracing::warn!(%provider, reason = %failure.reason, "restricted sign-in attempted");
                AuditAction::SecurityViolation
            } else {
                tracing::info!(%provider, reason = %failure.reason, "sign-in failed");
                AuditAction::LoginFailure
            };
            audit.record(
                AuditLogEntry::new(action)
                    .with_optional_actor(failure.actor)
                    .with_request(meta)
                    .with("provider", provider.to_string())
                    .with("reason", failure.reason),
            );
            Err(failure.error)
        }
    }
}

/// Sign-in as a pre-provisioned development identity.
pub struct LocalStrategy {
    enabled: bool,
    db: Arc<AuthDatabase>,
    roles: Arc<RoleHierarchy>,
    audit: AuditRecorder,
}

impl LocalStrategy {
    pub fn new(
        enabled: bool,
        db: Arc<AuthDatabase>,
        roles: Arc<RoleHierarchy>,
        audit: AuditRecorder,
    ) -> Self {
        Self {
            enabled,
            db,
            roles,
            audit,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn run(&self, role: &str) -> Result<Success, Failure> {
        // Checked before anything touches the store
        if !self.enabled {
            return Err(Failure::new(
                AuthError::SecurityViolation,
                "local sign-in is disabled",
            ));
        }

        let Some(role) = self.roles.get(role) else {
            return Err(Failure::new(
                AuthError::InvalidRequest(format!("unknown role: {role}")),
                "unknown role",
            ));
        };

        let identity = self.db.users().ensure_dev_identity(&role.name)?;
        if !identity.active {
            return Err(
                Failure::new(AuthError::Forbidden, "identity is deactivated").with_actor(identity.id),
            );
        }
        let identity = self.db.users().touch_login(identity.id)?;
        Ok(Success {
            identity,
            created: false,
        })
    }
}

/// Sign-in through the external OAuth2/OIDC provider.
pub struct ExternalOAuthStrategy {
    provider: Arc<dyn IdentityProvider>,
    timeout: Duration,
    default_role: String,
    db: Arc<AuthDatabase>,
    audit: AuditRecorder,
}

impl ExternalOAuthStrategy {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        timeout: Duration,
        default_role: impl Into<String>,
        db: Arc<AuthDatabase>,
        audit: AuditRecorder,
    ) -> Self {
        Self {
            provider,
            timeout,
            default_role: default_role.into(),
            db,
            audit,
        }
    }

    async fn run(&self, code: &str, code_verifier: &str) -> Result<Success, Failure> {
        if code.trim().is_empty() {
            return Err(Failure::new(
                AuthError::InvalidRequest("code is required".into()),
                "empty authorization code",
            ));
        }
        validate_code_verifier(code_verifier)
            .map_err(|reason| Failure::new(AuthError::InvalidRequest(reason), "bad code_verifier"))?;

        // Consumed before the exchange so a replay fails even if the provider
        // would accept it
        if !self.db.authorization_codes().consume(code)? {
            return Err(Failure::new(
                AuthError::ProviderExchangeFailure,
                "authorization code replayed",
            ));
        }

        let external = tokio::time::timeout(self.timeout, self.provider.exchange(code, code_verifier))
            .await
            .unwrap_or(Err(ProviderError::Timeout))
            .map_err(|e| {
                tracing::warn!(error = %e, "provider exchange failed");
                Failure::new(AuthError::ProviderExchangeFailure, e.to_string())
            })?;

        let (identity, created) =
            self.db
                .users()
                .record_login(&external.subject, &external.email, &self.default_role)?;

        if let Some(claimed) = external.claimed_role.as_deref() {
            if claimed != identity.role {
                tracing::warn!(
                    user_id = identity.id,
                    stored = %identity.role,
                    claimed,
                    "ignoring provider role claim"
                );
            }
        }

        if !identity.active {
            return Err(
                Failure::new(AuthError::Forbidden, "identity is deactivated").with_actor(identity.id),
            );
        }
        Ok(Success { identity, created })
    }
}
