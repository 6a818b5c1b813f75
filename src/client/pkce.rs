// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! PKCE (RFC 7636) helpers for starting an authorization code sign-in.

use base64ct::{Base64UrlUnpadded, Encoding};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use url::Url;

use super::api::ClientError;
use crate::models::OAuthClientConfig;

const SCOPES: &str = "openid email profile";

/// A code verifier and its S256 challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    /// 32 random bytes, which encode to a 43 character verifier.
    pub fn generate() -> Result<Self, ClientError> {
        let verifier = random_token(32)?;
        Ok(Self {
            challenge: challenge_for(&verifier),
            verifier,
        })
    }
}

pub fn challenge_for(verifier: &str) -> String {
    Base64UrlUnpadded::encode_string(&Sha256::digest(verifier.as_bytes()))
}

/// Opaque value echoed back by the provider; compare before exchanging.
pub fn random_state() -> Result<String, ClientError> {
    random_token(16)
}

fn random_token(len: usize) -> Result<String, ClientError> {
    let mut bytes = vec![0u8; len];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| ClientError::Entropy)?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Provider authorize URL for `config`.
pub fn authorize_url(
    config: &OAuthClientConfig,
    pkce: &PkcePair,
    state: &str,
) -> Result<Url, ClientError> {
    let mut url =
        Url::parse(&config.authorize_url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("response_type", "code")
            .append_pair("client_id", &config.client_id)
            .append_pair("scope", SCOPES)
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("state", state);
        if let Some(redirect_uri) = &config.redirect_uri {
            query.append_pair("redirect_uri", redirect_uri);
        }
    }
    Ok(url)
}
