// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment once at startup and frozen
//! into [`AppConfig`]. Everything auth-related defaults to the restrictive
//! setting: an unknown environment is production, dev sign-in is off unless
//! explicitly enabled in a development or test environment.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `APP_ENV` | `development`, `test`, `staging` or `production` | `production` |
//! | `DEV_AUTH_ENABLED` | Enables role-scoped local sign-in (dev/test only) | `false` |
//! | `TOKEN_ISSUER` | `iss`/`aud` claim of issued tokens | `http://localhost:8080` |
//! | `TOKEN_SIGNING_SECRET` | HS256 signing secret (>= 32 bytes) | Required in production |
//! | `TOKEN_KEY_ID` | `kid` header of issued tokens | `primary` |
//! | `TOKEN_SIGNING_SECRET_PREVIOUS` | Previous secret, still accepted for verification | None |
//! | `TOKEN_KEY_ID_PREVIOUS` | `kid` of the previous secret | `previous` |
//! | `ACCESS_TOKEN_TTL_SECS` | Access token lifetime | `900` |
//! | `REFRESH_TOKEN_TTL_SECS` | Refresh credential lifetime | `1209600` |
//! | `ROLE_HIERARCHY` | `name:priority[:protected],...` | see [`DEFAULT_ROLE_HIERARCHY`] |
//! | `DEFAULT_ROLE` | Role given to first-time OAuth identities | lowest role |
//! | `DATA_DIR` | Directory holding the auth database | `./data` |
//! | `HOST` / `PORT` | Server bind address | `0.0.0.0` / `8080` |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM files; both set enables HTTPS | None |
//! | `OAUTH_ISSUER` | Expected `iss` of the provider's ID token | None |
//! | `OAUTH_AUTHORIZE_URL` | Provider authorization endpoint | None |
//! | `OAUTH_TOKEN_URL` | Provider token endpoint | None |
//! | `OAUTH_JWKS_URL` | Provider JWKS endpoint | None |
//! | `OAUTH_CLIENT_ID` / `OAUTH_CLIENT_SECRET` | Provider client credentials | None |
//! | `OAUTH_REDIRECT_URI` | Redirect URI registered with the provider | None |
//! | `OAUTH_TIMEOUT_SECS` | Bound on each provider round-trip | `10` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::{fmt, path::PathBuf, time::Duration};

use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::roles::{RoleHierarchy, RoleHierarchyError};

pub const APP_ENV_ENV: &str = "APP_ENV";
pub const DEV_AUTH_ENABLED_ENV: &str = "DEV_AUTH_ENABLED";
pub const TOKEN_ISSUER_ENV: &str = "TOKEN_ISSUER";
pub const TOKEN_SIGNING_SECRET_ENV: &str = "TOKEN_SIGNING_SECRET";
pub const TOKEN_KEY_ID_ENV: &str = "TOKEN_KEY_ID";
pub const TOKEN_SIGNING_SECRET_PREVIOUS_ENV: &str = "TOKEN_SIGNING_SECRET_PREVIOUS";
pub const TOKEN_KEY_ID_PREVIOUS_ENV: &str = "TOKEN_KEY_ID_PREVIOUS";
pub const ACCESS_TOKEN_TTL_ENV: &str = "ACCESS_TOKEN_TTL_SECS";
pub const REFRESH_TOKEN_TTL_ENV: &str = "REFRESH_TOKEN_TTL_SECS";
pub const ROLE_HIERARCHY_ENV: &str = "ROLE_HIERARCHY";
pub const DEFAULT_ROLE_ENV: &str = "DEFAULT_ROLE";
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";
pub const OAUTH_ISSUER_ENV: &str = "OAUTH_ISSUER";
pub const OAUTH_AUTHORIZE_URL_ENV: &str = "OAUTH_AUTHORIZE_URL";
pub const OAUTH_TOKEN_URL_ENV: &str = "OAUTH_TOKEN_URL";
pub const OAUTH_JWKS_URL_ENV: &str = "OAUTH_JWKS_URL";
pub const OAUTH_CLIENT_ID_ENV: &str = "OAUTH_CLIENT_ID";
pub const OAUTH_CLIENT_SECRET_ENV: &str = "OAUTH_CLIENT_SECRET";
pub const OAUTH_REDIRECT_URI_ENV: &str = "OAUTH_REDIRECT_URI";
pub const OAUTH_TIMEOUT_ENV: &str = "OAUTH_TIMEOUT_SECS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Role hierarchy used when `ROLE_HIERARCHY` is not set.
pub const DEFAULT_ROLE_HIERARCHY: &str =
    "admin:100:protected,manager:75,dispatcher:50,technician:25,viewer:10";

const DEFAULT_ISSUER: &str = "http://localhost:8080";
const DEFAULT_KEY_ID: &str = "primary";
const DEFAULT_PREVIOUS_KEY_ID: &str = "previous";
const DEFAULT_ACCESS_TTL_SECS: u64 = 15 * 60;
const DEFAULT_REFRESH_TTL_SECS: u64 = 14 * 24 * 60 * 60;
const DEFAULT_OAUTH_TIMEOUT_SECS: u64 = 10;
const MIN_SECRET_LEN: usize = 32;

/// Configuration errors. Any of these aborts startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required in this environment")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("{0} must be at least 32 bytes")]
    WeakSecret(&'static str),

    #[error("role hierarchy is invalid: {0}")]
    Roles(#[from] RoleHierarchyError),

    #[error("failed to generate ephemeral signing key")]
    Entropy,
}

/// Deployment environment.
///
/// Only used for fail-secure defaulting; anything not recognised is treated
/// as production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Test,
    Staging,
    Production,
}

impl Environment {
    /// Parse an environment name. Unknown, empty or missing values map to
    /// [`Environment::Production`].
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("development") | Some("dev") | Some("local") => Environment::Development,
            Some("test") | Some("testing") => Environment::Test,
            Some("staging") => Environment::Staging,
            _ => Environment::Production,
        }
    }

    /// Whether local (role-scoped, secretless) sign-in may be reachable at all.
    pub fn permits_dev_auth(self) -> bool {
        matches!(self, Environment::Development | Environment::Test)
    }

    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Symmetric signing material. Never printed.
#[derive(Clone)]
pub struct SigningSecret(Vec<u8>);

impl SigningSecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    fn generate() -> Result<Self, ConfigError> {
        let mut bytes = vec![0u8; 48];
        SystemRandom::new()
            .fill(&mut bytes)
            .map_err(|_| ConfigError::Entropy)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningSecret(<{} bytes>)", self.0.len())
    }
}

/// A signing key and the `kid` it is published under.
#[derive(Debug, Clone)]
pub struct SigningKey {
    pub key_id: String,
    pub secret: SigningSecret,
}

/// Token issuance settings.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub issuer: String,
    pub current: SigningKey,
    pub previous: Option<SigningKey>,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

/// External OAuth2/OIDC provider settings.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub issuer: String,
    pub authorize_url: Option<String>,
    pub token_url: String,
    pub jwks_url: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Fully validated application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    /// Effective flag: requested AND permitted by the environment.
    pub dev_auth_enabled: bool,
    pub token: TokenConfig,
    pub roles: RoleHierarchy,
    pub default_role: String,
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub json_logs: bool,
    pub tls: Option<TlsPaths>,
    pub oauth: Option<OAuthConfig>,
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let environment = Environment::parse(get(APP_ENV_ENV).as_deref());
        let dev_auth_requested = parse_flag(get(DEV_AUTH_ENABLED_ENV).as_deref());
        let dev_auth_enabled = dev_auth_requested && environment.permits_dev_auth();
        if dev_auth_requested && !dev_auth_enabled {
            tracing::warn!(
                %environment,
                "DEV_AUTH_ENABLED ignored: local sign-in is only permitted in development or test"
            );
        }

        let current_secret = match get(TOKEN_SIGNING_SECRET_ENV) {
            Some(secret) => {
                if secret.len() < MIN_SECRET_LEN {
                    return Err(ConfigError::WeakSecret(TOKEN_SIGNING_SECRET_ENV));
                }
                SigningSecret::new(secret.into_bytes())
            }
            None if environment.is_production() || environment == Environment::Staging => {
                return Err(ConfigError::Missing(TOKEN_SIGNING_SECRET_ENV));
            }
            None => {
                tracing::warn!("TOKEN_SIGNING_SECRET not set; using an ephemeral signing key");
                SigningSecret::generate()?
            }
        };

        let previous = match get(TOKEN_SIGNING_SECRET_PREVIOUS_ENV) {
            Some(secret) if secret.len() < MIN_SECRET_LEN => {
                return Err(ConfigError::WeakSecret(TOKEN_SIGNING_SECRET_PREVIOUS_ENV));
            }
            Some(secret) => Some(SigningKey {
                key_id: get(TOKEN_KEY_ID_PREVIOUS_ENV)
                    .unwrap_or_else(|| DEFAULT_PREVIOUS_KEY_ID.to_string()),
                secret: SigningSecret::new(secret.into_bytes()),
            }),
            None => None,
        };

        let current = SigningKey {
            key_id: get(TOKEN_KEY_ID_ENV).unwrap_or_else(|| DEFAULT_KEY_ID.to_string()),
            secret: current_secret,
        };
        if previous.as_ref().is_some_and(|p| p.key_id == current.key_id) {
            return Err(ConfigError::Invalid {
                var: TOKEN_KEY_ID_PREVIOUS_ENV,
                reason: "must differ from TOKEN_KEY_ID".to_string(),
            });
        }

        let token = TokenConfig {
            issuer: get(TOKEN_ISSUER_ENV).unwrap_or_else(|| DEFAULT_ISSUER.to_string()),
            current,
            previous,
            access_ttl: parse_secs(&get, ACCESS_TOKEN_TTL_ENV, DEFAULT_ACCESS_TTL_SECS)?,
            refresh_ttl: parse_secs(&get, REFRESH_TOKEN_TTL_ENV, DEFAULT_REFRESH_TTL_SECS)?,
        };

        let roles = RoleHierarchy::parse(
            get(ROLE_HIERARCHY_ENV)
                .as_deref()
                .unwrap_or(DEFAULT_ROLE_HIERARCHY),
        )?;
        let default_role = match get(DEFAULT_ROLE_ENV) {
            Some(name) => {
                let name = name.trim().to_ascii_lowercase();
                if roles.get(&name).is_none() {
                    return Err(ConfigError::Invalid {
                        var: DEFAULT_ROLE_ENV,
                        reason: format!("unknown role '{name}'"),
                    });
                }
                name
            }
            None => roles.lowest().name.clone(),
        };

        let port = match get(PORT_ENV) {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                var: PORT_ENV,
                reason: format!("'{raw}' is not a port number"),
            })?,
            None => 8080,
        };

        let tls = match (get(TLS_CERT_PATH_ENV), get(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Invalid {
                    var: TLS_CERT_PATH_ENV,
                    reason: "TLS_CERT_PATH and TLS_KEY_PATH must be set together".to_string(),
                })
            }
        };

        let oauth = load_oauth(&get, environment)?;

        Ok(Self {
            environment,
            dev_auth_enabled,
            token,
            roles,
            default_role,
            data_dir: get(DATA_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            host: get(HOST_ENV).unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            json_logs: get(LOG_FORMAT_ENV).is_some_and(|f| f.eq_ignore_ascii_case("json")),
            tls,
            oauth,
        })
    }

    /// Path of the embedded auth database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("auth.redb")
    }
}

/// Only an explicit truthy value enables a flag.
pub fn parse_flag(raw: Option<&str>) -> bool {
    matches!(
        raw.map(|s| s.trim().to_ascii_lowercase()).as_deref(),
        Some("true") | Some("1") | Some("yes") | Some("on")
    )
}

fn parse_secs<G>(get: &G, var: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let secs = match get(var) {
        Some(raw) => raw.trim().parse::<u64>().map_err(|_| ConfigError::Invalid {
            var,
            reason: format!("'{raw}' is not a number of seconds"),
        })?,
        None => default,
    };
    if secs == 0 {
        return Err(ConfigError::Invalid {
            var,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

fn load_oauth<G>(get: &G, environment: Environment) -> Result<Option<OAuthConfig>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let (Some(issuer), Some(token_url), Some(jwks_url), Some(client_id)) = (
        get(OAUTH_ISSUER_ENV),
        get(OAUTH_TOKEN_URL_ENV),
        get(OAUTH_JWKS_URL_ENV),
        get(OAUTH_CLIENT_ID_ENV),
    ) else {
        return Ok(None);
    };

    check_url(OAUTH_TOKEN_URL_ENV, &token_url, environment)?;
    check_url(OAUTH_JWKS_URL_ENV, &jwks_url, environment)?;
    let authorize_url = get(OAUTH_AUTHORIZE_URL_ENV);
    if let Some(ref url) = authorize_url {
        check_url(OAUTH_AUTHORIZE_URL_ENV, url, environment)?;
    }

    Ok(Some(OAuthConfig {
        issuer,
        authorize_url,
        token_url,
        jwks_url,
        client_id,
        client_secret: get(OAUTH_CLIENT_SECRET_ENV),
        redirect_uri: get(OAUTH_REDIRECT_URI_ENV),
        timeout: parse_secs(get, OAUTH_TIMEOUT_ENV, DEFAULT_OAUTH_TIMEOUT_SECS)?,
    }))
}

/// Provider endpoints must parse, and must be HTTPS outside development/test.
fn check_url(var: &'static str, raw: &str, environment: Environment) -> Result<(), ConfigError> {
    let url = url::Url::parse(raw).map_err(|e| ConfigError::Invalid {
        var,
        reason: e.to_string(),
    })?;
    if url.scheme() != "https" && !environment.permits_dev_auth() {
        return Err(ConfigError::Invalid {
            var,
            reason: "must use https".to_string(),
        });
    }
    Ok(())
}
