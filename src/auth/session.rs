// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access/refresh token pairs.

use std::sync::Arc;
use std::time::Duration;

use super::claims::{AuthProvider, TokenSubject};
use super::codec::TokenCodec;
use super::AuthError;
use crate::config::TokenConfig;
use crate::storage::{
    AuditAction, AuditLogEntry, AuditRecorder, AuthDatabase, Identity, RequestMeta, RotationOutcome,
};

/// A freshly issued token pair.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    pub identity: Identity,
}

/// Issues, rotates and revokes sessions.
#[derive(Clone)]
pub struct SessionService {
    codec: Arc<TokenCodec>,
    db: Arc<AuthDatabase>,
    audit: AuditRecorder,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl SessionService {
    pub fn new(
        codec: Arc<TokenCodec>,
        db: Arc<AuthDatabase>,
        audit: AuditRecorder,
        config: &TokenConfig,
    ) -> Self {
        Self {
            codec,
            db,
            audit,
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
        }
    }

    /// Start a new refresh family for a freshly signed-in identity.
    pub fn start(&self, identity: Identity, provider: AuthProvider) -> Result<IssuedSession, AuthError> {
        let refresh_token = self
            .db
            .refresh_credentials()
            .issue(identity.id, provider, self.refresh_ttl)?;
        let access_token = self.access_token(&identity, provider)?;
        Ok(IssuedSession {
            access_token,
            refresh_token,
            expires_in: self.access_ttl.as_secs(),
            identity,
        })
    }

    /// Exchange a refresh credential for a new pair.
    ///
    /// Reused, unknown and expired credentials are all `RefreshInvalid`; a
    /// reuse additionally revokes the whole family.
    pub fn refresh(&self, presented: &str, meta: &RequestMeta) -> Result<IssuedSession, AuthError> {
        if presented.trim().is_empty() {
            return Err(AuthError::InvalidRequest("refreshToken is required".into()));
        }

        let repo = self.db.refresh_credentials();
        let (record, refresh_token) = match repo.rotate(presented, self.refresh_ttl)? {
            RotationOutcome::Rotated { record, credential } => (record, credential),
            RotationOutcome::Reused { family_id, revoked } => {
                tracing::warn!(%family_id, revoked, "refresh credential reuse detected");
                self.audit.record(
                    AuditLogEntry::new(AuditAction::RefreshReuseDetected)
                        .with_request(meta)
                        .with("family_id", family_id)
                        .with("revoked", revoked),
                );
                return Err(AuthError::RefreshInvalid);
            }
            RotationOutcome::Expired { user_id } => {
                return Err(self.rejected(Some(user_id), "expired", meta));
            }
            RotationOutcome::Unknown => return Err(self.rejected(None, "unknown", meta)),
        };

        let identity = match self.db.users().get(record.user_id)? {
            Some(identity) if identity.active => identity,
            _ => {
                repo.revoke(&refresh_token)?;
                return Err(self.rejected(Some(record.user_id), "identity unavailable", meta));
            }
        };

        let access_token = self.access_token(&identity, record.provider)?;
        tracing::debug!(user_id = identity.id, "session refreshed");
        self.audit.record(
            AuditLogEntry::new(AuditAction::TokenRefreshed)
                .with_actor(identity.id)
                .with_request(meta)
                .with("family_id", record.family_id),
        );
        Ok(IssuedSession {
            access_token,
            refresh_token,
            expires_in: self.access_ttl.as_secs(),
            identity,
        })
    }

    /// Revoke a refresh credential. Idempotent.
    ///
    /// A credential that was already rotated away still ends its session: the
    /// live successor is revoked with it.
    pub fn logout(&self, presented: &str, meta: &RequestMeta) -> Result<(), AuthError> {
        if presented.trim().is_empty() {
            return Ok(());
        }
        if let Some(user_id) = self.db.refresh_credentials().revoke(presented)? {
            tracing::info!(user_id, "signed out");
            self.audit.record(
                AuditLogEntry::new(AuditAction::Logout)
                    .with_actor(user_id)
                    .with_request(meta),
            );
        }
        Ok(())
    }

    /// Revoke every refresh credential of a user.
    pub fn revoke_all(&self, user_id: u64) -> Result<usize, AuthError> {
        Ok(self.db.refresh_credentials().revoke_user(user_id)?)
    }

    fn access_token(&self, identity: &Identity, provider: AuthProvider) -> Result<String, AuthError> {
        self.codec
            .issue(&TokenSubject::for_identity(identity, provider), self.access_ttl)
            .map_err(|e| {
                tracing::error!(error = %e, "failed to sign access token");
                AuthError::Internal
            })
    }

    fn rejected(&self, actor: Option<u64>, reason: &str, meta: &RequestMeta) -> AuthError {
        self.audit.record(
            AuditLogEntry::new(AuditAction::RefreshRejected)
                .with_optional_actor(actor)
                .with_request(meta)
                .with("reason", reason),
        );
        AuthError::RefreshInvalid
    }
}
