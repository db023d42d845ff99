// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Gateway token verification.
//!
//! ## Pipeline
//!
//! 1. Reject tokens above `max_token_bytes`.
//! 2. Split the compact token and read the unverified header and payload.
//! 3. Require `alg`; read `iss` (untrusted, used only to pick a key).
//! 4. Resolve `alg` against the allow-list before any I/O.
//! 5. Fetch the issuer's key for the configured gateway, under a deadline.
//! 6. Verify the signature with exactly the resolved algorithm.
//! 7. Enforce `exp` against the wall clock with the configured skew.
//!
//! The decoder is stateless and caches nothing; key caching belongs to the
//! key store.

use std::collections::HashSet;
use std::sync::Arc;

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::algorithm::SigningAlgorithm;
use super::claims::ValidatedClaims;
use super::error::AuthError;
use crate::config::AuthConfig;
use crate::keystore::KeyStore;

/// Header fields read before verification.
#[derive(Debug, Deserialize)]
struct UnverifiedHeader {
    #[serde(default)]
    alg: Option<String>,
    #[serde(default)]
    kid: Option<String>,
}

/// A token split into its parts; nothing here is trusted.
struct UnverifiedToken {
    header: UnverifiedHeader,
    payload: Map<String, Value>,
}

impl UnverifiedToken {
    fn parse(token: &str) -> Result<Self, AuthError> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(_signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::MalformedToken(
                "expected three dot-separated segments".into(),
            ));
        };

        let header: UnverifiedHeader = serde_json::from_slice(&decode_segment(header, "header")?)
            .map_err(|e| AuthError::MalformedToken(format!("header is not a JSON object: {e}")))?;
        let payload: Map<String, Value> =
            serde_json::from_slice(&decode_segment(payload, "payload")?).map_err(|e| {
                AuthError::MalformedToken(format!("payload is not a JSON object: {e}"))
            })?;

        Ok(Self { header, payload })
    }

    fn issuer(&self) -> Option<&str> {
        self.payload
            .get("iss")
            .and_then(Value::as_str)
            .filter(|iss| !iss.is_empty())
    }
}

fn decode_segment(segment: &str, name: &str) -> Result<Vec<u8>, AuthError> {
    Base64UrlUnpadded::decode_vec(segment)
        .map_err(|_| AuthError::MalformedToken(format!("{name} is not base64url")))
}

/// Verifies gateway tokens against keys from a [`KeyStore`].
#[derive(Clone)]
pub struct TokenDecoder {
    config: Arc<AuthConfig>,
}

impl TokenDecoder {
    pub fn new(config: Arc<AuthConfig>) -> Self {
        Self { config }
    }

    /// Verify `token` against the current wall clock.
    pub async fn decode(
        &self,
        token: &str,
        key_store: &KeyStore,
    ) -> Result<ValidatedClaims, AuthError> {
        self.decode_at(token, key_store, Utc::now().timestamp()).await
    }

    /// Verify `token` as of `now` (seconds since the epoch).
    pub async fn decode_at(
        &self,
        token: &str,
        key_store: &KeyStore,
        now: i64,
    ) -> Result<ValidatedClaims, AuthError> {
        if token.len() > self.config.max_token_bytes {
            return Err(AuthError::TokenTooLarge {
                size: token.len(),
                limit: self.config.max_token_bytes,
            });
        }

        let unverified = UnverifiedToken::parse(token)?;
        let alg_name = unverified
            .header
            .alg
            .as_deref()
            .ok_or_else(|| AuthError::MalformedToken("header has no alg".into()))?;
        let issuer = unverified.issuer().ok_or(AuthError::MissingIssuer)?;

        let algorithm = self
            .config
            .allowed_algorithms
            .permit(alg_name)
            .ok_or_else(|| AuthError::AlgorithmNotAllowed(alg_name.to_string()))?;

        let pem = self.lookup_key(key_store, issuer).await?;
        let decoding_key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AuthError::KeyLookup(format!("stored key for '{issuer}' is unusable: {e}")))?;

        let payload = verify_signature(token, &decoding_key, algorithm)?;
        let claims =
            ValidatedClaims::from_verified(payload, algorithm, unverified.header.kid.clone())?;

        let skew = i64::try_from(self.config.clock_skew_seconds).unwrap_or(i64::MAX);
        if now > claims.exp.saturating_add(skew) {
            return Err(AuthError::TokenExpired);
        }

        Ok(claims)
    }

    async fn lookup_key(&self, key_store: &KeyStore, issuer: &str) -> Result<String, AuthError> {
        let gateway_name = self.config.gateway_name.as_str();
        let lookup = key_store.get(gateway_name, Some(issuer));

        match tokio::time::timeout(self.config.key_lookup_timeout, lookup).await {
            Ok(Ok(Some(pem))) => Ok(pem),
            Ok(Ok(None)) => Err(AuthError::UnknownIssuer {
                issuer: issuer.to_string(),
            }),
            Ok(Err(e)) => Err(AuthError::KeyLookup(e.to_string())),
            Err(_) => Err(AuthError::KeyLookup(format!(
                "timed out after {} ms",
                self.config.key_lookup_timeout.as_millis()
            ))),
        }
    }
}

/// Signature check only; claim checks happen on the returned payload.
fn verify_signature(
    token: &str,
    key: &DecodingKey,
    algorithm: SigningAlgorithm,
) -> Result<Map<String, Value>, AuthError> {
    let mut validation = Validation::new(algorithm.to_jwt());
    validation.algorithms = vec![algorithm.to_jwt()];
    validation.required_spec_claims = HashSet::new();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.leeway = 0;

    decode::<Map<String, Value>>(token, key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => AuthError::BadSignature,
            ErrorKind::InvalidAlgorithm => AuthError::AlgorithmNotAllowed(algorithm.to_string()),
            ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidKeyFormat => {
                AuthError::KeyLookup(format!("stored key is unusable: {e}"))
            }
            _ => AuthError::MalformedToken(e.to_string()),
        })
}
