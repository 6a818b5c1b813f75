// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP access to the auth service from the client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

use super::auth_state::ClientAuthState;
use crate::models::{
    AuthConfigResponse, LocalLoginRequest, LocalLoginResponse, LogoutRequest,
    OAuthCallbackRequest, RefreshRequest, RefreshResponse, TokenPairResponse, UserView,
};

/// Client-side failures. Server rejections keep the server's error code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("invalid server url: {0}")]
    InvalidUrl(String),

    #[error("request timed out")]
    Timeout,

    #[error("server unreachable: {0}")]
    Transport(String),

    #[error("{message}")]
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
        reason: Option<String>,
    },

    #[error("unexpected response from server")]
    InvalidResponse,

    #[error("not signed in")]
    NotSignedIn,

    #[error("sign-in is unavailable")]
    SignInUnavailable,

    #[error("superseded by a newer sign-in or sign-out")]
    Superseded,

    #[error("secure random generator unavailable")]
    Entropy,
}

impl ClientError {
    /// HTTP status of a server rejection.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_security_violation(&self) -> bool {
        matches!(self, ClientError::Rejected { code: Some(code), .. } if code == "security_violation")
    }

    pub(crate) fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::Timeout
        } else if e.is_decode() {
            ClientError::InvalidResponse
        } else {
            ClientError::Transport(e.to_string())
        }
    }
}

/// What a sign-in call presents to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginCredentials {
    Local { role: String },
    AuthorizationCode { code: String, code_verifier: String },
}

/// Result of a successful sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedIn {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub user: UserView,
}

/// The auth endpoints the client state machine depends on.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn sign_in(&self, credentials: &LoginCredentials) -> Result<SignedIn, ClientError>;

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ClientError>;

    async fn logout(&self, refresh_token: &str) -> Result<(), ClientError>;

    async fn me(&self, access_token: &str) -> Result<UserView, ClientError>;
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// `AuthApi` over HTTP with a bounded per-request timeout.
#[derive(Clone)]
pub struct HttpAuthApi {
    base: Url,
    http: reqwest::Client,
}

impl HttpAuthApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let base = Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ClientError::from_transport)?;
        Ok(Self { base, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        self.base
            .join(path)
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response, ClientError> {
        self.http
            .post(self.url(path)?)
            .json(body)
            .send()
            .await
            .map_err(ClientError::from_transport)
    }

    /// Sign-in methods offered by the server.
    pub async fn auth_config(&self) -> Result<AuthConfigResponse, ClientError> {
        let response = self
            .http
            .get(self.url("/v1/auth/config")?)
            .send()
            .await
            .map_err(ClientError::from_transport)?;
        read_json(response).await
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn sign_in(&self, credentials: &LoginCredentials) -> Result<SignedIn, ClientError> {
        match credentials {
            LoginCredentials::Local { role } => {
                let body = LocalLoginRequest { role: role.clone() };
                let r: LocalLoginResponse = read_json(self.post("/v1/auth/local", &body).await?).await?;
                Ok(SignedIn {
                    access_token: r.token,
                    refresh_token: r.refresh_token,
                    expires_in: r.expires_in,
                    user: r.user,
                })
            }
            LoginCredentials::AuthorizationCode {
                code,
                code_verifier,
            } => {
                let body = OAuthCallbackRequest {
                    code: code.clone(),
                    code_verifier: code_verifier.clone(),
                };
                let r: TokenPairResponse =
                    read_json(self.post("/v1/auth/oauth/callback", &body).await?).await?;
                Ok(SignedIn {
                    access_token: r.access_token,
                    refresh_token: r.refresh_token,
                    expires_in: r.expires_in,
                    user: r.user,
                })
            }
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ClientError> {
        let body = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };
        read_json(self.post("/v1/auth/refresh", &body).await?).await
    }

    async fn logout(&self, refresh_token: &str) -> Result<(), ClientError> {
        let body = LogoutRequest {
            refresh_token: Some(refresh_token.to_string()),
        };
        let response = self.post("/v1/auth/logout", &body).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(rejection(response).await)
        }
    }

    async fn me(&self, access_token: &str) -> Result<UserView, ClientError> {
        let response = self
            .http
            .get(self.url("/v1/auth/me")?)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(ClientError::from_transport)?;
        read_json(response).await
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    if response.status().is_success() {
        response.json::<T>().await.map_err(ClientError::from_transport)
    } else {
        Err(rejection(response).await)
    }
}

async fn rejection(response: Response) -> ClientError {
    let status = response.status().as_u16();
    match response.json::<ErrorBody>().await {
        Ok(body) => ClientError::Rejected {
            status,
            code: body.error_code,
            message: body.error,
            reason: body.reason,
        },
        Err(_) => ClientError::Rejected {
            status,
            code: None,
            message: format!("request failed with status {status}"),
            reason: None,
        },
    }
}

/// Requests on behalf of the signed-in user.
///
/// Every response status is reported to the auth state, so a 401/403 from any
/// endpoint signs the client out.
#[derive(Clone)]
pub struct AuthorizedClient {
    api: HttpAuthApi,
    state: Arc<ClientAuthState>,
}

impl AuthorizedClient {
    pub fn new(api: HttpAuthApi, state: Arc<ClientAuthState>) -> Self {
        Self { api, state }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.send(Method::GET, path, None::<&()>).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(Method::PUT, path, Some(body)).await
    }

    async fn send<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let token = self.state.snapshot().token.ok_or(ClientError::NotSignedIn)?;
        let mut request = self
            .api
            .http
            .request(method, self.api.url(path)?)
            .bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(ClientError::from_transport)?;
        self.state.observe_response_status(response.status().as_u16());
        read_json(response).await
    }
}
