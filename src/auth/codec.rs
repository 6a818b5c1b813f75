// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token issuance and verification.
//!
//! ## Security
//!
//! - HS256 with this service's own key material; the codec only accepts
//!   tokens it could have issued itself. Provider ID tokens are verified by
//!   the OAuth provider client and never reach this module.
//! - The signature is checked before any claim is looked at. Expiry is
//!   compared afterwards against the caller-supplied clock, with no leeway.
//! - Tokens carry a `kid`; an optional previous key keeps tokens issued before
//!   a rotation verifiable until they expire.
//!
//! `verify` does no I/O and takes `&self`, so it can be shared freely across
//! concurrent requests.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{
    decode, decode_header, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header,
    Validation,
};

use super::claims::{TokenClaims, TokenSubject};
use crate::config::{SigningKey, TokenConfig};

const ALGORITHM: Algorithm = Algorithm::HS256;

/// Token verification and issuance failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("token is malformed")]
    Malformed,

    #[error("token signature is invalid")]
    BadSignature,

    #[error("token lifetime must be positive")]
    InvalidTtl,

    #[error("token could not be signed")]
    Signing,
}

#[derive(Clone)]
struct VerificationKey {
    key_id: String,
    key: DecodingKey,
}

/// Issues and verifies this service's signed tokens.
#[derive(Clone)]
pub struct TokenCodec {
    issuer: String,
    key_id: String,
    encoding: EncodingKey,
    verification: Vec<VerificationKey>,
}

impl TokenCodec {
    pub fn new(issuer: impl Into<String>, current: &SigningKey, previous: Option<&SigningKey>) -> Self {
        let mut verification = vec![VerificationKey {
            key_id: current.key_id.clone(),
            key: DecodingKey::from_secret(current.secret.as_bytes()),
        }];
        if let Some(previous) = previous {
            verification.push(VerificationKey {
                key_id: previous.key_id.clone(),
                key: DecodingKey::from_secret(previous.secret.as_bytes()),
            });
        }

        Self {
            issuer: issuer.into(),
            key_id: current.key_id.clone(),
            encoding: EncodingKey::from_secret(current.secret.as_bytes()),
            verification,
        }
    }

    pub fn from_config(config: &TokenConfig) -> Self {
        Self::new(&config.issuer, &config.current, config.previous.as_ref())
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Issue a token valid from now for `ttl`.
    pub fn issue(&self, subject: &TokenSubject, ttl: Duration) -> Result<String, TokenError> {
        self.issue_at(subject, ttl, Utc::now().timestamp())
    }

    /// Issue a token with an explicit `iat` (Unix seconds).
    pub fn issue_at(
        &self,
        subject: &TokenSubject,
        ttl: Duration,
        now: i64,
    ) -> Result<String, TokenError> {
        let ttl_secs = i64::try_from(ttl.as_secs()).map_err(|_| TokenError::InvalidTtl)?;
        if ttl_secs <= 0 {
            return Err(TokenError::InvalidTtl);
        }
        let exp = now.checked_add(ttl_secs).ok_or(TokenError::InvalidTtl)?;

        let claims = TokenClaims {
            iss: self.issuer.clone(),
            sub: subject.subject.clone(),
            aud: self.issuer.clone(),
            exp,
            iat: now,
            email: subject.email.clone(),
            role: subject.role.clone(),
            provider: subject.provider,
            user_id: subject.user_id,
        };

        let mut header = Header::new(ALGORITHM);
        header.kid = Some(self.key_id.clone());

        encode(&header, &claims, &self.encoding).map_err(|_| TokenError::Signing)
    }

    /// Verify a token against the current clock.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Verify a token as of `now` (Unix seconds).
    pub fn verify_at(&self, token: &str, now: i64) -> Result<TokenClaims, TokenError> {
        let header = decode_header(token).map_err(|_| TokenError::Malformed)?;
        if header.alg != ALGORITHM {
            return Err(TokenError::BadSignature);
        }

        // Unknown or missing kid means the token wasn't signed with our material
        let key = header
            .kid
            .as_deref()
            .and_then(|kid| self.verification.iter().find(|k| k.key_id == kid))
            .ok_or(TokenError::BadSignature)?;

        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "iat", "iss", "aud", "sub"]);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.issuer]);

        let claims = decode::<TokenClaims>(token, &key.key, &validation)
            .map_err(|e| match e.kind() {
                // The header already parsed, so an encoding failure here sits in
                // the signature segment.
                ErrorKind::InvalidSignature | ErrorKind::Base64(_) | ErrorKind::InvalidAlgorithm => {
                    TokenError::BadSignature
                }
                _ => TokenError::Malformed,
            })?
            .claims;

        if claims.exp <= claims.iat {
            return Err(TokenError::Malformed);
        }
        if now >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::AuthProvider;
    use crate::config::SigningSecret;
    use base64ct::{Base64UrlUnpadded, Encoding};

    const ISSUER: &str = "https://auth.example.com";

    fn key(id: &str, secret: &str) -> SigningKey {
        SigningKey {
            key_id: id.to_string(),
            secret: SigningSecret::new(secret.as_bytes().to_vec()),
        }
    }

    fn codec() -> TokenCodec {
        TokenCodec::new(ISSUER, &key("k1", "first-secret-first-secret-first-secret"), None)
    }

    fn subject() -> TokenSubject {
        TokenSubject {
            subject: "user:42".to_string(),
            email: "manager@example.com".to_string(),
            role: "manager".to_string(),
            provider: AuthProvider::Local,
            user_id: 42,
        }
    }

    const TTL: Duration = Duration::from_secs(600);

    #[test]
    fn round_trip_preserves_claims() {
        let codec = codec();
        let now = Utc::now().timestamp();
        let token = codec.issue_at(&subject(), TTL, now).unwrap();
        let claims = codec.verify_at(&token, now + 1).unwrap();

        assert_eq!(TokenSubject::from(&claims), subject());
        assert_eq!(claims.iss, ISSUER);
        assert_eq!(claims.aud, ISSUER);
        assert_eq!(claims.iat, now);
        assert_eq!(claims.exp, now + 600);
    }

    #[test]
    fn issue_uses_wall_clock() {
        let codec = codec();
        let token = codec.issue(&subject(), TTL).unwrap();
        assert!(codec.verify(&token).is_ok());
    }

    #[test]
    fn expired_tokens_never_verify() {
        let codec = codec();
        let now = 1_700_000_000;
        let token = codec.issue_at(&subject(), TTL, now).unwrap();

        assert!(codec.verify_at(&token, now + 599).is_ok());
        for later in [now + 600, now + 601, now + 86_400] {
            assert_eq!(codec.verify_at(&token, later), Err(TokenError::Expired));
        }
        // Issued long ago against the real clock
        assert_eq!(codec.verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn zero_ttl_is_rejected() {
        assert_eq!(
            codec().issue(&subject(), Duration::ZERO),
            Err(TokenError::InvalidTtl)
        );
    }

    #[test]
    fn altering_any_payload_or_signature_character_fails_signature() {
        let codec = codec();
        let now = Utc::now().timestamp();
        let token = codec.issue_at(&subject(), TTL, now).unwrap();
        let header_len = token.find('.').unwrap() + 1;

        for i in header_len..token.len() {
            let original = token.as_bytes()[i];
            if original == b'.' {
                continue;
            }
            let replacement = if original == b'A' { 'B' } else { 'A' };
            let mut tampered = token.clone();
            tampered.replace_range(i..i + 1, &replacement.to_string());

            assert_eq!(
                codec.verify_at(&tampered, now),
                Err(TokenError::BadSignature),
                "position {i} accepted"
            );
        }
    }

    #[test]
    fn elevated_role_payload_fails_signature() {
        let codec = codec();
        let now = Utc::now().timestamp();
        let token = codec.issue_at(&subject(), TTL, now).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        let mut claims: serde_json::Value =
            serde_json::from_slice(&Base64UrlUnpadded::decode_vec(parts[1]).unwrap()).unwrap();
        claims["role"] = "admin".into();
        let forged_payload = Base64UrlUnpadded::encode_string(claims.to_string().as_bytes());
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert_eq!(codec.verify_at(&forged, now), Err(TokenError::BadSignature));
    }

    #[test]
    fn foreign_signing_material_is_rejected() {
        let ours = codec();
        let theirs = TokenCodec::new(ISSUER, &key("k1", "other-secret-other-secret-other-secret"), None);
        let token = theirs.issue(&subject(), TTL).unwrap();
        assert_eq!(ours.verify(&token), Err(TokenError::BadSignature));
    }

    #[test]
    fn previous_key_still_verifies_after_rotation() {
        let old = key("k1", "first-secret-first-secret-first-secret");
        let new = key("k2", "second-secret-second-secret-second-secret");
        let before = TokenCodec::new(ISSUER, &old, None);
        let token = before.issue(&subject(), TTL).unwrap();

        let after = TokenCodec::new(ISSUER, &new, Some(&old));
        assert!(after.verify(&token).is_ok());

        let retired = TokenCodec::new(ISSUER, &new, None);
        assert_eq!(retired.verify(&token), Err(TokenError::BadSignature));
    }

    #[test]
    fn wrong_issuer_is_rejected() {
        let secret = key("k1", "first-secret-first-secret-first-secret");
        let other = TokenCodec::new("https://elsewhere.example.com", &secret, None);
        let token = other.issue(&subject(), TTL).unwrap();
        assert_eq!(codec().verify(&token), Err(TokenError::Malformed));
    }

    #[test]
    fn garbage_is_malformed() {
        assert_eq!(codec().verify("not-a-token"), Err(TokenError::Malformed));
        assert_eq!(codec().verify(""), Err(TokenError::Malformed));
    }
}
