// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication filter for Axum.
//!
//! Reads `X-Bkapi-JWT`, verifies it, and stores the resulting
//! [`AuthResult`] in request extensions before any handler runs. Handlers
//! either see a fully populated result or never execute.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let filter = AuthFilter::new(config, key_store);
//!
//! let app = Router::new()
//!     .route("/protected", get(protected_handler))
//!     .route_layer(axum::middleware::from_fn_with_state(
//!         filter,
//!         jwt_auth_middleware,
//!     ));
//! ```

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, error, warn};

use super::decoder::TokenDecoder;
use super::principal::{build_auth_result, AuthResult};
use super::AuthError;
use crate::config::AuthConfig;
use crate::keystore::KeyStore;

/// Header carrying the gateway token. Lookup is case-insensitive.
pub const JWT_HEADER: &str = "x-bkapi-jwt";

/// Request-scoped authentication filter.
///
/// Holds no per-request state; clones share configuration and key store.
#[derive(Clone)]
pub struct AuthFilter {
    config: Arc<AuthConfig>,
    decoder: TokenDecoder,
    key_store: KeyStore,
}

impl AuthFilter {
    pub fn new(config: AuthConfig, key_store: KeyStore) -> Self {
        let config = Arc::new(config);
        Self {
            decoder: TokenDecoder::new(config.clone()),
            config,
            key_store,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn key_store(&self) -> &KeyStore {
        &self.key_store
    }

    /// Resolve the principal for a set of request headers.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthResult, AuthError> {
        let gateway_name = self.config.gateway_name.as_str();

        if self.config.exemption_enabled {
            return Ok(AuthResult::exempt(gateway_name));
        }

        let token = extract_token(headers)?;
        let claims = self.decoder.decode(token, &self.key_store).await?;
        let result = build_auth_result(claims, gateway_name);

        debug!(
            gateway_name,
            bk_app_code = %result.app.bk_app_code,
            app_verified = result.app.verified,
            username = %result.user.username,
            user_verified = result.user.verified,
            "Gateway token verified"
        );
        Ok(result)
    }

    /// Authenticate `request` and attach the result to its extensions.
    pub async fn apply(&self, mut request: Request) -> Result<Request, AuthError> {
        let result = self.authenticate(request.headers()).await?;
        request.extensions_mut().insert(result);
        Ok(request)
    }
}

/// Read the token from `X-Bkapi-JWT`, tolerating a `Bearer ` prefix.
fn extract_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers.get(JWT_HEADER).ok_or(AuthError::MissingToken)?;
    let value = value
        .to_str()
        .map_err(|_| AuthError::MalformedToken("header is not visible ASCII".into()))?
        .trim();

    // `value` is already trimmed, so an empty `Bearer ` arrives as bare `Bearer`.
    let token = match (value.get(..6), value.get(6..)) {
        (Some(scheme), Some(rest))
            if scheme.eq_ignore_ascii_case("bearer")
                && (rest.is_empty() || rest.starts_with(|c: char| c.is_ascii_whitespace())) =>
        {
            rest.trim_start()
        }
        _ => value,
    };

    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(token)
}

/// Authentication middleware function.
pub async fn jwt_auth_middleware(
    State(filter): State<AuthFilter>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    match filter.apply(request).await {
        Ok(request) => next.run(request).await,
        Err(e) => {
            if e.is_retryable() {
                error!(path = %path, reason = e.reason(), error = %e, "Gateway token check failed");
            } else {
                warn!(path = %path, reason = e.reason(), error = %e, "Gateway token rejected");
            }
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MAX_TOKEN_BYTES;
    use crate::testutil::{
        now, sign, table_store_with_gateway_key, test_config, GATEWAY, GATEWAY_PRIVATE_KEY_PEM,
        ISSUER,
    };
    use axum::http::HeaderValue;
    use jsonwebtoken::Algorithm;
    use serde_json::json;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("X-Bkapi-JWT", HeaderValue::from_str(value).unwrap());
        headers
    }

    fn token() -> String {
        sign(
            &json!({ "iss": ISSUER, "exp": now() + 60, "user": { "username": "alice", "verified": true } }),
            Algorithm::RS256,
            GATEWAY_PRIVATE_KEY_PEM,
        )
    }

    #[test]
    fn extract_token_handles_bearer_prefix() {
        assert_eq!(extract_token(&headers("abc.def.ghi")).unwrap(), "abc.def.ghi");
        assert_eq!(extract_token(&headers("Bearer abc.def.ghi")).unwrap(), "abc.def.ghi");
        assert_eq!(extract_token(&headers("bearer  abc.def.ghi")).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn extract_token_requires_header() {
        assert!(matches!(extract_token(&HeaderMap::new()), Err(AuthError::MissingToken)));
        assert!(matches!(extract_token(&headers("")), Err(AuthError::MissingToken)));
        assert!(matches!(extract_token(&headers("Bearer ")), Err(AuthError::MissingToken)));
        assert!(matches!(extract_token(&headers("Bearer")), Err(AuthError::MissingToken)));
        assert!(matches!(extract_token(&headers("  bearer   ")), Err(AuthError::MissingToken)));
    }

    #[test]
    fn scheme_must_be_a_separate_word() {
        assert_eq!(extract_token(&headers("Bearerabc.def.ghi")).unwrap(), "Bearerabc.def.ghi");
        assert_eq!(extract_token(&headers("BEARER\tabc.def.ghi")).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut map = HeaderMap::new();
        map.insert("x-BKAPI-jwt", HeaderValue::from_static("abc.def.ghi"));
        assert_eq!(extract_token(&map).unwrap(), "abc.def.ghi");
    }

    #[tokio::test]
    async fn authenticate_builds_principal() {
        let (store, _dir) = table_store_with_gateway_key();
        let filter = AuthFilter::new(test_config(), store);

        let result = filter.authenticate(&headers(&token())).await.unwrap();
        assert_eq!(result.gateway.name, "foo");
        assert_eq!(result.user.username, "alice");
        assert!(!result.user.anonymous);
        assert!(!result.app.verified);
    }

    #[tokio::test]
    async fn exemption_ignores_header_content() {
        let (store, _dir) = table_store_with_gateway_key();
        let filter = AuthFilter::new(test_config().with_exemption(true), store);

        for h in [HeaderMap::new(), headers("garbage"), headers(&token())] {
            let result = filter.authenticate(&h).await.unwrap();
            assert!(result.user.anonymous);
            assert!(!result.app.verified);
            assert!(result.payload.is_empty());
        }
    }

    /// RS256 token padded so its compact form is as close to `target` bytes
    /// as the base64 length steps allow, without exceeding it.
    fn token_near(target: usize) -> String {
        let mint = |pad: usize| {
            sign(
                &json!({ "iss": ISSUER, "exp": now() + 60, "pad": "x".repeat(pad) }),
                Algorithm::RS256,
                GATEWAY_PRIVATE_KEY_PEM,
            )
        };
        let base = mint(0).len();
        let mut pad = (target - base) * 3 / 4;
        while mint(pad + 1).len() <= target {
            pad += 1;
        }
        while mint(pad).len() > target {
            pad -= 1;
        }
        mint(pad)
    }

    #[tokio::test]
    async fn default_size_cap_is_eight_kib() {
        let (store, _dir) = table_store_with_gateway_key();
        let filter = AuthFilter::new(AuthConfig::new(GATEWAY), store);
        assert_eq!(filter.config().max_token_bytes, DEFAULT_MAX_TOKEN_BYTES);
        assert_eq!(DEFAULT_MAX_TOKEN_BYTES, 8192);

        let fits = token_near(DEFAULT_MAX_TOKEN_BYTES);
        assert!(fits.len() >= DEFAULT_MAX_TOKEN_BYTES - 2);
        let result = filter.authenticate(&headers(&fits)).await.unwrap();
        assert_eq!(result.gateway.name, GATEWAY);

        let oversized = token_near(DEFAULT_MAX_TOKEN_BYTES + 3);
        assert!(oversized.len() > DEFAULT_MAX_TOKEN_BYTES);
        let err = filter.authenticate(&headers(&oversized)).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenTooLarge { limit: 8192, .. }));
        assert_eq!(err.reason(), "malformed_token");
    }

    #[tokio::test]
    async fn apply_attaches_result_to_extensions() {
        let (store, _dir) = table_store_with_gateway_key();
        let filter = AuthFilter::new(test_config(), store);
        let request = Request::builder()
            .uri("/v1/whoami")
            .header("X-Bkapi-JWT", token())
            .body(axum::body::Body::empty())
            .unwrap();

        let request = filter.apply(request).await.unwrap();
        let result = request.extensions().get::<AuthResult>().unwrap();
        assert_eq!(result.user.username, "alice");
    }
}
