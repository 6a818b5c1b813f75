// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! External identity provider (OAuth2 authorization code + PKCE, OIDC).
//!
//! The provider's token is never handed to callers. Its `id_token` is
//! verified here against the provider JWKS and reduced to an
//! [`ExternalIdentity`]; the strategy then issues this service's own token.

use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Validation};
use serde::Deserialize;

use super::jwks::JwksManager;
use crate::config::OAuthConfig;

/// Clock skew tolerated on provider-issued assertions.
const CLOCK_SKEW_LEEWAY: u64 = 60;

const VERIFIER_MIN_LEN: usize = 43;
const VERIFIER_MAX_LEN: usize = 128;

/// Provider exchange failures. Detail is for logs only.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Transport(String),

    #[error("provider exchange timed out")]
    Timeout,

    #[error("provider returned HTTP {0}")]
    Status(u16),

    #[error("provider response was invalid: {0}")]
    InvalidResponse(String),

    #[error("identity assertion rejected: {0}")]
    InvalidAssertion(String),

    #[error("no matching key in provider JWKS")]
    NoMatchingKey,
}

impl ProviderError {
    pub(crate) fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Transport(e.to_string())
        }
    }
}

/// Identity asserted by the provider after a successful exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    /// Provider-scoped subject, stored as the identity's external subject.
    pub subject: String,
    pub email: String,
    /// Role claimed by the provider, if any. Never applied to a stored identity.
    pub claimed_role: Option<String>,
}

/// Exchanges an authorization code for a verified identity.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn exchange(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<ExternalIdentity, ProviderError>;
}

/// Check a PKCE code verifier (RFC 7636 section 4.1).
pub fn validate_code_verifier(verifier: &str) -> Result<(), String> {
    if !(VERIFIER_MIN_LEN..=VERIFIER_MAX_LEN).contains(&verifier.len()) {
        return Err(format!(
            "code_verifier must be {VERIFIER_MIN_LEN}-{VERIFIER_MAX_LEN} characters"
        ));
    }
    let unreserved = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~');
    if !verifier.chars().all(unreserved) {
        return Err("code_verifier contains characters outside the unreserved set".to_string());
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    id_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<bool>,
    #[serde(default)]
    role: Option<String>,
}

/// OpenID Connect provider client.
pub struct OidcProvider {
    config: OAuthConfig,
    client: reqwest::Client,
    jwks: JwksManager,
}

impl OidcProvider {
    pub fn new(config: OAuthConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        let jwks = JwksManager::new(&config.jwks_url, client.clone());
        Ok(Self {
            config,
            client,
            jwks,
        })
    }

    pub fn jwks(&self) -> &JwksManager {
        &self.jwks
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    /// Verify a provider `id_token` and extract the identity it asserts.
    pub async fn verify_id_token(&self, id_token: &str) -> Result<ExternalIdentity, ProviderError> {
        let header = decode_header(id_token)
            .map_err(|e| ProviderError::InvalidAssertion(format!("bad header: {e}")))?;

        let (key, algorithm) = match header.kid.as_deref() {
            Some(kid) => self.jwks.get_decoding_key(kid).await?,
            None => self.jwks.get_any_decoding_key().await?,
        };
        if header.alg != algorithm {
            return Err(ProviderError::InvalidAssertion(format!(
                "algorithm {:?} does not match key",
                header.alg
            )));
        }

        let mut validation = Validation::new(algorithm);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.client_id]);

        let claims = decode::<IdTokenClaims>(id_token, &key, &validation)
            .map_err(|e| ProviderError::InvalidAssertion(e.to_string()))?
            .claims;

        if claims.email_verified == Some(false) {
            return Err(ProviderError::InvalidAssertion("email is not verified".into()));
        }
        let email = claims
            .email
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| ProviderError::InvalidAssertion("missing email claim".into()))?;

        Ok(ExternalIdentity {
            subject: claims.sub,
            email,
            claimed_role: claims.role,
        })
    }
}

#[async_trait]
impl IdentityProvider for OidcProvider {
    async fn exchange(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<ExternalIdentity, ProviderError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", code_verifier),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(redirect_uri) = &self.config.redirect_uri {
            form.push(("redirect_uri", redirect_uri.as_str()));
        }
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&form)
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status().as_u16()));
        }

        let body: TokenEndpointResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let id_token = body
            .id_token
            .ok_or_else(|| ProviderError::InvalidResponse("no id_token in response".into()))?;

        self.verify_id_token(&id_token).await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! An in-process OIDC provider with a real ES256 key.

    use super::*;
    use axum::{extract::State, routing::get, routing::post, Form, Json, Router};
    use base64ct::{Base64UrlUnpadded, Encoding};
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use ring::rand::SystemRandom;
    use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
    use std::collections::HashMap;
    use std::sync::Arc;

    pub const ISSUER: &str = "https://id.example.com";
    pub const CLIENT_ID: &str = "workorders-desktop";
    pub const KID: &str = "stub-1";

    #[derive(Clone)]
    pub struct StubKeys {
        encoding: Arc<EncodingKey>,
        pub jwks: serde_json::Value,
    }

    impl StubKeys {
        pub fn generate() -> Self {
            let rng = SystemRandom::new();
            let pkcs8 =
                EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng).unwrap();
            let pair =
                EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &rng)
                    .unwrap();
            let point = pair.public_key().as_ref();
            let jwks = serde_json::json!({
                "keys": [{
                    "kty": "EC",
                    "crv": "P-256",
                    "kid": KID,
                    "alg": "ES256",
                    "use": "sig",
                    "x": Base64UrlUnpadded::encode_string(&point[1..33]),
                    "y": Base64UrlUnpadded::encode_string(&point[33..65]),
                }]
            });
            Self {
                encoding: Arc::new(EncodingKey::from_ec_der(pkcs8.as_ref())),
                jwks,
            }
        }

        /// Sign an id_token with the given claim overrides.
        pub fn id_token(&self, claims: serde_json::Value) -> String {
            let now = chrono::Utc::now().timestamp();
            let mut full = serde_json::json!({
                "iss": ISSUER,
                "aud": CLIENT_ID,
                "iat": now,
                "exp": now + 300,
            });
            if let (Some(full), Some(extra)) = (full.as_object_mut(), claims.as_object()) {
                full.extend(extra.clone());
            }
            let mut header = Header::new(Algorithm::ES256);
            header.kid = Some(KID.to_string());
            encode(&header, &full, &self.encoding).unwrap()
        }
    }

    /// Codes the stub accepts, mapped to the subject/email they assert.
    #[derive(Clone)]
    struct StubState {
        keys: StubKeys,
        codes: Arc<HashMap<String, (String, String)>>,
        delay: Duration,
    }

    async fn token(
        State(state): State<StubState>,
        Form(form): Form<HashMap<String, String>>,
    ) -> Result<Json<serde_json::Value>, axum::http::StatusCode> {
        tokio::time::sleep(state.delay).await;
        let code = form.get("code").map(String::as_str).unwrap_or_default();
        let verifier_ok = form
            .get("code_verifier")
            .is_some_and(|v| validate_code_verifier(v).is_ok());
        match state.codes.get(code) {
            Some((sub, email)) if verifier_ok => Ok(Json(serde_json::json!({
                "access_token": "provider-access",
                "token_type": "Bearer",
                "id_token": state.keys.id_token(serde_json::json!({ "sub": sub, "email": email })),
            }))),
            _ => Err(axum::http::StatusCode::BAD_REQUEST),
        }
    }

    async fn jwks(State(state): State<StubState>) -> Json<serde_json::Value> {
        Json(state.keys.jwks.clone())
    }

    /// Serve the stub on an ephemeral port and return a matching config.
    pub async fn spawn_stub(codes: &[(&str, &str, &str)], delay: Duration) -> (OAuthConfig, StubKeys) {
        let keys = StubKeys::generate();
        let state = StubState {
            keys: keys.clone(),
            codes: Arc::new(
                codes
                    .iter()
                    .map(|(c, s, e)| (c.to_string(), (s.to_string(), e.to_string())))
                    .collect(),
            ),
            delay,
        };
        let app = Router::new()
            .route("/token", post(token))
            .route("/jwks", get(jwks))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let config = OAuthConfig {
            issuer: ISSUER.to_string(),
            authorize_url: Some(format!("{ISSUER}/authorize")),
            token_url: format!("http://{addr}/token"),
            jwks_url: format!("http://{addr}/jwks"),
            client_id: CLIENT_ID.to_string(),
            client_secret: None,
            redirect_uri: Some("workorders://callback".to_string()),
            timeout: Duration::from_secs(5),
        };
        (config, keys)
    }
}
