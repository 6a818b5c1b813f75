// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;
use std::time::Duration;

use crate::auth::jwks::JwksManager;
use crate::auth::provider::ProviderError;
use crate::auth::strategy::{ExternalOAuthStrategy, LocalStrategy};
use crate::auth::{
    AuthProvider, AuthStrategy, IdentityProvider, OidcProvider, RequestAuthenticator, RoleGate,
    RoleHierarchy, SessionService, TokenCodec,
};
use crate::config::AppConfig;
use crate::storage::{AuditRecorder, AuthDatabase, StorageResult};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<AuthDatabase>,
    pub roles: Arc<RoleHierarchy>,
    pub audit: AuditRecorder,
    pub gate: Arc<RoleGate>,
    pub authenticator: RequestAuthenticator,
    pub sessions: SessionService,
    pub local: Arc<AuthStrategy>,
    /// Present only when an OAuth provider is configured.
    pub oauth: Option<Arc<AuthStrategy>>,
    /// Provider key set, for the health check.
    pub provider_jwks: Option<JwksManager>,
}

impl AppState {
    /// Wire up every component from configuration and an opened database.
    pub fn new(config: AppConfig, db: AuthDatabase) -> Result<Self, ProviderError> {
        let provider = config.oauth.clone().map(OidcProvider::new).transpose()?;
        let provider_jwks = provider.as_ref().map(|p| p.jwks().clone());
        let timeout = provider.as_ref().map(OidcProvider::timeout);

        let mut state = Self::assemble(config, db);
        if let (Some(provider), Some(timeout)) = (provider, timeout) {
            state = state.with_identity_provider(Arc::new(provider), timeout);
        }
        state.provider_jwks = provider_jwks;
        Ok(state)
    }

    fn assemble(config: AppConfig, db: AuthDatabase) -> Self {
        let db = Arc::new(db);
        let roles = Arc::new(config.roles.clone());
        let codec = Arc::new(TokenCodec::from_config(&config.token));
        let audit = AuditRecorder::new(Arc::clone(&db));

        let gate = Arc::new(RoleGate::new((*roles).clone(), audit.clone()));
        let authenticator = RequestAuthenticator::new(
            Arc::clone(&codec),
            Arc::clone(&db),
            Arc::clone(&roles),
            audit.clone(),
        );
        let sessions = SessionService::new(codec, Arc::clone(&db), audit.clone(), &config.token);
        let local = Arc::new(AuthStrategy::Local(LocalStrategy::new(
            config.dev_auth_enabled,
            Arc::clone(&db),
            Arc::clone(&roles),
            audit.clone(),
        )));

        Self {
            config: Arc::new(config),
            db,
            roles,
            audit,
            gate,
            authenticator,
            sessions,
            local,
            oauth: None,
            provider_jwks: None,
        }
    }

    /// Use `provider` for authorization code sign-in.
    pub fn with_identity_provider(
        mut self,
        provider: Arc<dyn IdentityProvider>,
        timeout: Duration,
    ) -> Self {
        self.oauth = Some(Arc::new(AuthStrategy::ExternalOAuth(ExternalOAuthStrategy::new(
            provider,
            timeout,
            self.config.default_role.clone(),
            Arc::clone(&self.db),
            self.audit.clone(),
        ))));
        self
    }

    /// The strategy serving `provider`, if available.
    pub fn strategy(&self, provider: AuthProvider) -> Option<&AuthStrategy> {
        match provider {
            AuthProvider::Local => Some(&self.local),
            AuthProvider::OAuth => self.oauth.as_deref(),
        }
    }

    /// Create one development identity per role. No-op unless dev auth is on.
    pub fn seed_dev_identities(&self) -> StorageResult<usize> {
        if !self.config.dev_auth_enabled {
            return Ok(0);
        }
        let users = self.db.users();
        for role in self.roles.roles() {
            let identity = users.ensure_dev_identity(&role.name)?;
            tracing::debug!(user_id = identity.id, role = %role.name, "development identity ready");
        }
        Ok(self.roles.roles().len())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    pub const TEST_SECRET: &str = "router-test-secret-0123456789abcdefghij";

    /// State over a temporary database, with `vars` layered over test defaults.
    pub fn test_state(vars: &[(&str, &str)]) -> (TempDir, AppState) {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let mut env: HashMap<String, String> = [
            ("APP_ENV", "test"),
            ("DEV_AUTH_ENABLED", "true"),
            ("TOKEN_SIGNING_SECRET", TEST_SECRET),
            ("TOKEN_ISSUER", "https://auth.test"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        env.insert("DATA_DIR".into(), temp.path().display().to_string());
        for (k, v) in vars {
            env.insert(k.to_string(), v.to_string());
        }

        let config = AppConfig::from_lookup(|k| env.get(k).cloned()).expect("test config");
        let db = AuthDatabase::open(&config.database_path()).expect("test database");
        let state = AppState::new(config, db).expect("test state");
        state.seed_dev_identities().expect("seed");
        (temp, state)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::test_state;
    use super::*;

    #[test]
    fn seeds_one_identity_per_role() {
        let (_temp, state) = test_state(&[]);
        let users = state.db.users().list().unwrap();
        assert_eq!(users.len(), 5);
        assert!(users.iter().any(|u| u.email == "admin@dev.local"));
        // Seeding twice creates nothing new
        state.seed_dev_identities().unwrap();
        assert_eq!(state.db.users().list().unwrap().len(), 5);
    }

    #[test]
    fn no_seeding_when_dev_auth_disabled() {
        let (_temp, state) = test_state(&[("DEV_AUTH_ENABLED", "false")]);
        assert!(state.db.users().list().unwrap().is_empty());
        assert!(state.oauth.is_none());
    }

    #[test]
    fn strategies_by_provider() {
        let (_temp, state) = test_state(&[]);
        assert_eq!(
            state.strategy(AuthProvider::Local).map(AuthStrategy::provider),
            Some(AuthProvider::Local)
        );
        assert!(state.strategy(AuthProvider::OAuth).is_none());
    }
}
