// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names, default values, and the
//! immutable configuration values built from them. Configuration is loaded
//! once at startup and captured by the components that need it; nothing on
//! the request path reads the environment.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `BKAPI_GATEWAY_NAME` | Gateway this application is registered against | Required |
//! | `BKAPI_DEFAULT_ISSUER` | Issuer used when a caller omits one | `bk-apigateway` |
//! | `BKAPI_JWT_ALGORITHMS` | Comma separated RSA algorithms | `RS256,RS512` |
//! | `BKAPI_JWT_CLOCK_SKEW_SECONDS` | Tolerance applied to `exp` | `0` |
//! | `BKAPI_JWT_MAX_TOKEN_BYTES` | Token size cap | `8192` |
//! | `BKAPI_JWT_EXEMPT` | Development-only authentication bypass | `false` |
//! | `BKAPI_KEY_LOOKUP_TIMEOUT_MS` | Deadline for public key lookups | `3000` |
//! | `BKAPI_KEY_STORE` | `table` or `secret` | `table` |
//! | `BKAPI_KEY_DB_PATH` | redb file for the table store | `/data/public_keys.redb` |
//! | `BKAPI_KEY_CACHE_TTL_SECONDS` | Key cache TTL, `0` disables | `10` |
//! | `BKAPI_KEY_CACHE_CAPACITY` | Key cache capacity | `1024` |
//! | `BKAPI_SECRET_NAMESPACE` | Namespace holding key secrets | Required for `secret` |
//! | `BKAPI_ISSUER_SECRETS` | `issuer=secret_name` pairs, comma separated | Required for `secret` |
//! | `KUBERNETES_API_URL` | Cluster API base URL | `https://kubernetes.default.svc` |
//! | `KUBERNETES_TOKEN_PATH` | Service account token | in-cluster path |
//! | `KUBERNETES_CA_PATH` | Cluster CA bundle | in-cluster path |
//! | `BKAPI_GATEWAY_API_URL` | Gateway API base URL, enables key refresh | Optional |
//! | `BKAPI_APP_CODE` | App code sent by the key refresher | empty |
//! | `BKAPI_APP_SECRET` | App secret sent by the key refresher | empty |
//! | `BKAPI_KEY_REFRESH_INTERVAL_SECONDS` | Key refresh period | `300` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::auth::algorithm::AllowedAlgorithms;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const GATEWAY_NAME_ENV: &str = "BKAPI_GATEWAY_NAME";
pub const DEFAULT_ISSUER_ENV: &str = "BKAPI_DEFAULT_ISSUER";
pub const ALGORITHMS_ENV: &str = "BKAPI_JWT_ALGORITHMS";
pub const CLOCK_SKEW_ENV: &str = "BKAPI_JWT_CLOCK_SKEW_SECONDS";
pub const MAX_TOKEN_BYTES_ENV: &str = "BKAPI_JWT_MAX_TOKEN_BYTES";
pub const EXEMPT_ENV: &str = "BKAPI_JWT_EXEMPT";
pub const KEY_LOOKUP_TIMEOUT_ENV: &str = "BKAPI_KEY_LOOKUP_TIMEOUT_MS";
pub const KEY_STORE_ENV: &str = "BKAPI_KEY_STORE";
pub const KEY_DB_PATH_ENV: &str = "BKAPI_KEY_DB_PATH";
pub const KEY_CACHE_TTL_ENV: &str = "BKAPI_KEY_CACHE_TTL_SECONDS";
pub const KEY_CACHE_CAPACITY_ENV: &str = "BKAPI_KEY_CACHE_CAPACITY";
pub const SECRET_NAMESPACE_ENV: &str = "BKAPI_SECRET_NAMESPACE";
pub const ISSUER_SECRETS_ENV: &str = "BKAPI_ISSUER_SECRETS";
pub const KUBERNETES_API_URL_ENV: &str = "KUBERNETES_API_URL";
pub const KUBERNETES_TOKEN_PATH_ENV: &str = "KUBERNETES_TOKEN_PATH";
pub const KUBERNETES_CA_PATH_ENV: &str = "KUBERNETES_CA_PATH";
pub const GATEWAY_API_URL_ENV: &str = "BKAPI_GATEWAY_API_URL";
pub const APP_CODE_ENV: &str = "BKAPI_APP_CODE";
pub const APP_SECRET_ENV: &str = "BKAPI_APP_SECRET";
pub const KEY_REFRESH_INTERVAL_ENV: &str = "BKAPI_KEY_REFRESH_INTERVAL_SECONDS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_ISSUER: &str = "bk-apigateway";
pub const DEFAULT_MAX_TOKEN_BYTES: usize = 8 * 1024;
pub const DEFAULT_KEY_LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_KEY_DB_PATH: &str = "/data/public_keys.redb";
pub const DEFAULT_KEY_CACHE_TTL: Duration = Duration::from_secs(10);
pub const DEFAULT_KEY_CACHE_CAPACITY: usize = 1024;
pub const DEFAULT_KUBERNETES_API_URL: &str = "https://kubernetes.default.svc";
pub const DEFAULT_KUBERNETES_TOKEN_PATH: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/token";
pub const DEFAULT_KUBERNETES_CA_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";
pub const DEFAULT_KEY_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

impl ConfigError {
    fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            name,
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Filter configuration
// =============================================================================

/// Settings captured by the authentication filter.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Gateway this application is registered against (trusted, not from the token)
    pub gateway_name: String,
    /// Permitted `alg` header values
    pub allowed_algorithms: AllowedAlgorithms,
    /// Tolerance applied to `exp`
    pub clock_skew_seconds: u64,
    /// Tokens larger than this are rejected before parsing
    pub max_token_bytes: usize,
    /// Development-only bypass installing an anonymous result
    pub exemption_enabled: bool,
    /// Deadline for the key store call on the request path
    pub key_lookup_timeout: Duration,
}

impl AuthConfig {
    /// Create a configuration with defaults for everything but the gateway name.
    pub fn new(gateway_name: impl Into<String>) -> Self {
        Self {
            gateway_name: gateway_name.into(),
            allowed_algorithms: AllowedAlgorithms::default(),
            clock_skew_seconds: 0,
            max_token_bytes: DEFAULT_MAX_TOKEN_BYTES,
            exemption_enabled: false,
            key_lookup_timeout: DEFAULT_KEY_LOOKUP_TIMEOUT,
        }
    }

    pub fn with_allowed_algorithms(mut self, algorithms: AllowedAlgorithms) -> Self {
        self.allowed_algorithms = algorithms;
        self
    }

    pub fn with_clock_skew(mut self, seconds: u64) -> Self {
        self.clock_skew_seconds = seconds;
        self
    }

    pub fn with_max_token_bytes(mut self, bytes: usize) -> Self {
        self.max_token_bytes = bytes;
        self
    }

    pub fn with_exemption(mut self, enabled: bool) -> Self {
        self.exemption_enabled = enabled;
        self
    }

    pub fn with_key_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.key_lookup_timeout = timeout;
        self
    }
}

// =============================================================================
// Key store configuration
// =============================================================================

/// Which key store backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStoreVariant {
    Table,
    Secret,
}

impl FromStr for KeyStoreVariant {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "table" => Ok(KeyStoreVariant::Table),
            "secret" => Ok(KeyStoreVariant::Secret),
            other => Err(ConfigError::invalid(
                KEY_STORE_ENV,
                format!("expected 'table' or 'secret', got '{other}'"),
            )),
        }
    }
}

impl std::fmt::Display for KeyStoreVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyStoreVariant::Table => write!(f, "table"),
            KeyStoreVariant::Secret => write!(f, "secret"),
        }
    }
}

/// Cluster secret store settings.
#[derive(Debug, Clone)]
pub struct SecretStoreConfig {
    pub api_url: Url,
    pub namespace: String,
    pub issuer_to_secret_name: HashMap<String, String>,
    pub token_path: PathBuf,
    pub ca_path: PathBuf,
}

#[derive(Debug, Clone)]
pub enum KeyStoreBackendConfig {
    Table { db_path: PathBuf },
    Secret(SecretStoreConfig),
}

#[derive(Debug, Clone)]
pub struct KeyStoreConfig {
    pub backend: KeyStoreBackendConfig,
    /// Issuer used when a key store caller omits one
    pub default_issuer: String,
    /// Zero disables caching
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
}

impl KeyStoreConfig {
    pub fn variant(&self) -> KeyStoreVariant {
        match self.backend {
            KeyStoreBackendConfig::Table { .. } => KeyStoreVariant::Table,
            KeyStoreBackendConfig::Secret(_) => KeyStoreVariant::Secret,
        }
    }
}

// =============================================================================
// Key refresh configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub gateway_api_url: Url,
    pub gateway_name: String,
    pub default_issuer: String,
    pub app_code: String,
    pub app_secret: String,
    pub interval: Duration,
}

// =============================================================================
// Process settings
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Everything the binary needs, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub key_store: KeyStoreConfig,
    /// `None` when `BKAPI_GATEWAY_API_URL` is unset
    pub refresh: Option<RefreshConfig>,
    pub log_format: LogFormat,
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let gateway_name = env.required(GATEWAY_NAME_ENV)?;
        let default_issuer = env.or_default(DEFAULT_ISSUER_ENV, DEFAULT_ISSUER);

        let allowed_algorithms = match env.get(ALGORITHMS_ENV) {
            Some(list) => AllowedAlgorithms::parse(&list)?,
            None => AllowedAlgorithms::default(),
        };

        let auth = AuthConfig {
            gateway_name: gateway_name.clone(),
            allowed_algorithms,
            clock_skew_seconds: env.parsed(CLOCK_SKEW_ENV, 0)?,
            max_token_bytes: env.parsed(MAX_TOKEN_BYTES_ENV, DEFAULT_MAX_TOKEN_BYTES)?,
            exemption_enabled: env.flag(EXEMPT_ENV)?,
            key_lookup_timeout: Duration::from_millis(env.parsed(
                KEY_LOOKUP_TIMEOUT_ENV,
                DEFAULT_KEY_LOOKUP_TIMEOUT.as_millis() as u64,
            )?),
        };

        let variant = match env.get(KEY_STORE_ENV) {
            Some(raw) => raw.parse()?,
            None => KeyStoreVariant::Table,
        };
        let backend = match variant {
            KeyStoreVariant::Table => KeyStoreBackendConfig::Table {
                db_path: PathBuf::from(env.or_default(KEY_DB_PATH_ENV, DEFAULT_KEY_DB_PATH)),
            },
            KeyStoreVariant::Secret => KeyStoreBackendConfig::Secret(SecretStoreConfig {
                api_url: env.url(KUBERNETES_API_URL_ENV, DEFAULT_KUBERNETES_API_URL)?,
                namespace: env.required(SECRET_NAMESPACE_ENV)?,
                issuer_to_secret_name: parse_issuer_secrets(&env.required(ISSUER_SECRETS_ENV)?)?,
                token_path: PathBuf::from(
                    env.or_default(KUBERNETES_TOKEN_PATH_ENV, DEFAULT_KUBERNETES_TOKEN_PATH),
                ),
                ca_path: PathBuf::from(
                    env.or_default(KUBERNETES_CA_PATH_ENV, DEFAULT_KUBERNETES_CA_PATH),
                ),
            }),
        };
        let key_store = KeyStoreConfig {
            backend,
            default_issuer: default_issuer.clone(),
            cache_ttl: Duration::from_secs(
                env.parsed(KEY_CACHE_TTL_ENV, DEFAULT_KEY_CACHE_TTL.as_secs())?,
            ),
            cache_capacity: env.parsed(KEY_CACHE_CAPACITY_ENV, DEFAULT_KEY_CACHE_CAPACITY)?,
        };

        let refresh = match env.get(GATEWAY_API_URL_ENV) {
            Some(raw) => Some(RefreshConfig {
                gateway_api_url: Url::parse(&raw)
                    .map_err(|e| ConfigError::invalid(GATEWAY_API_URL_ENV, e.to_string()))?,
                gateway_name,
                default_issuer,
                app_code: env.or_default(APP_CODE_ENV, ""),
                app_secret: env.or_default(APP_SECRET_ENV, ""),
                interval: Duration::from_secs(env.parsed(
                    KEY_REFRESH_INTERVAL_ENV,
                    DEFAULT_KEY_REFRESH_INTERVAL.as_secs(),
                )?),
            }),
            None => None,
        };

        let log_format = match env.get(LOG_FORMAT_ENV).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            server: ServerConfig {
                host: env.or_default(HOST_ENV, "0.0.0.0"),
                port: env.parsed(PORT_ENV, 8080)?,
            },
            auth,
            key_store,
            refresh,
            log_format,
        })
    }
}

/// Parse `issuer=secret_name` pairs separated by commas.
pub fn parse_issuer_secrets(raw: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut mapping = HashMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (issuer, secret) = pair.split_once('=').ok_or_else(|| {
            ConfigError::invalid(ISSUER_SECRETS_ENV, format!("expected issuer=name, got '{pair}'"))
        })?;
        let (issuer, secret) = (issuer.trim(), secret.trim());
        if issuer.is_empty() || secret.is_empty() {
            return Err(ConfigError::invalid(
                ISSUER_SECRETS_ENV,
                format!("empty issuer or secret name in '{pair}'"),
            ));
        }
        mapping.insert(issuer.to_string(), secret.to_string());
    }
    if mapping.is_empty() {
        return Err(ConfigError::invalid(ISSUER_SECRETS_ENV, "no issuer mappings"));
    }
    Ok(mapping)
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Empty values count as unset.
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.get(name).ok_or(ConfigError::Missing(name))
    }

    fn or_default(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            Some(raw) => raw
                .parse()
                .map_err(|e: T::Err| ConfigError::invalid(name, e.to_string())),
            None => Ok(default),
        }
    }

    fn flag(&self, name: &'static str) -> Result<bool, ConfigError> {
        match self.get(name).map(|v| v.to_lowercase()).as_deref() {
            None | Some("0" | "false" | "no" | "off") => Ok(false),
            Some("1" | "true" | "yes" | "on") => Ok(true),
            Some(other) => Err(ConfigError::invalid(
                name,
                format!("expected a boolean, got '{other}'"),
            )),
        }
    }

    fn url(&self, name: &'static str, default: &str) -> Result<Url, ConfigError> {
        Url::parse(&self.or_default(name, default))
            .map_err(|e| ConfigError::invalid(name, e.to_string()))
    }
}
