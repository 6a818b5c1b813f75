// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Sign-in, token issuance and role-based access control.
//!
//! ## Auth Flow
//!
//! 1. The client signs in through a strategy:
//!    - `LocalStrategy`: pre-provisioned development identity by role name,
//!      only when dev auth is enabled
//!    - `ExternalOAuthStrategy`: authorization code + PKCE verifier, exchanged
//!      with the OIDC provider whose `id_token` is verified against its JWKS
//! 2. The server issues its own HS256 access token plus a rotating refresh
//!    credential
//! 3. The client sends `Authorization: Bearer <token>`
//! 4. `RequestAuthenticator` verifies the token, loads the current identity
//!    and attaches it to the request
//! 5. `RoleGate` checks role requirements per route or per handler
//!
//! ## Security
//!
//! - Missing token is 401; any other token problem is 403
//! - A valid token for a deactivated identity is 403
//! - The stored role is authoritative, not the role claim in the token
//! - Every rejection is audited

pub mod claims;
pub mod codec;
pub mod error;
pub mod extractor;
pub mod gate;
pub mod jwks;
pub mod middleware;
pub mod provider;
pub mod roles;
pub mod session;
pub mod strategy;

pub use claims::{AuthProvider, AuthenticatedUser};
pub use codec::TokenCodec;
pub use error::AuthError;
pub use extractor::Auth;
pub use gate::{enforce_role, RoleGate, RoleGuard};
pub use middleware::{auth_middleware, RequestAuthenticator};
pub use provider::{IdentityProvider, OidcProvider};
pub use roles::{RoleDef, RoleHierarchy};
pub use session::SessionService;
pub use strategy::{AuthStrategy, Credentials};
