// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication and authorization errors.
//!
//! This is the only error type an auth decision ever returns to a caller.
//! Responses carry a category and, for role failures or bad input, a reason
//! string that is safe to show. Internal causes are logged and collapsed to
//! [`AuthError::Internal`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::storage::StorageError;

/// Authentication error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No credential presented
    Unauthenticated,
    /// Credential present but invalid, expired or wrongly signed, or the
    /// identity behind it is gone or inactive
    Forbidden,
    /// Valid identity, role too low
    InsufficientRole { reason: String },
    /// Restricted capability invoked outside its allowed environment
    SecurityViolation,
    /// External identity provider unreachable or rejected the exchange
    ProviderExchangeFailure,
    /// Request is malformed (missing fields, bad PKCE verifier)
    InvalidRequest(String),
    /// Refresh credential reused, unknown or expired
    RefreshInvalid,
    /// Anything else; detail is logged, never returned
    Internal,
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::Unauthenticated => "unauthenticated",
            AuthError::Forbidden => "forbidden",
            AuthError::InsufficientRole { .. } => "insufficient_role",
            AuthError::SecurityViolation => "security_violation",
            AuthError::ProviderExchangeFailure => "provider_exchange_failed",
            AuthError::InvalidRequest(_) => "invalid_request",
            AuthError::RefreshInvalid => "refresh_invalid",
            AuthError::Internal => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Unauthenticated
            | AuthError::ProviderExchangeFailure
            | AuthError::RefreshInvalid => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden
            | AuthError::InsufficientRole { .. }
            | AuthError::SecurityViolation => StatusCode::FORBIDDEN,
            AuthError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AuthError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Caller-safe detail, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            AuthError::InsufficientRole { reason } | AuthError::InvalidRequest(reason) => {
                Some(reason)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::Unauthenticated => write!(f, "Authentication is required"),
            AuthError::Forbidden => write!(f, "Credential was rejected"),
            AuthError::InsufficientRole { .. } => {
                write!(f, "Insufficient role for this operation")
            }
            AuthError::SecurityViolation => {
                write!(f, "This sign-in method is not available")
            }
            AuthError::ProviderExchangeFailure => {
                write!(f, "Sign-in with the identity provider failed")
            }
            AuthError::InvalidRequest(_) => write!(f, "Invalid request"),
            AuthError::RefreshInvalid => write!(f, "Refresh credential is invalid"),
            AuthError::Internal => write!(f, "Internal server error"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<StorageError> for AuthError {
    fn from(e: StorageError) -> Self {
        tracing::error!(error = %e, "storage failure during auth");
        AuthError::Internal
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code(),
            reason: self.reason().map(str::to_string),
        });
        (status, body).into_response()
    }
}
