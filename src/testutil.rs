// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fixtures for unit tests: RSA key pairs, token minting, and
//! pre-loaded key stores.

use std::collections::HashMap;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::Value;
use tempfile::TempDir;
use url::Url;
use wiremock::MockServer;

use crate::auth::algorithm::SigningAlgorithm;
use crate::config::AuthConfig;
use crate::keystore::{KeyStore, SecretKeyStore, TableKeyStore};

pub const ISSUER: &str = "bk-apigateway";
pub const GATEWAY: &str = "foo";

pub const GATEWAY_PRIVATE_KEY_PEM: &str = include_str!("../testdata/gateway_rsa_private.pem");
pub const GATEWAY_PUBLIC_KEY_PEM: &str = include_str!("../testdata/gateway_rsa_public.pem");
/// Signs tokens the stored key must reject
pub const ROGUE_PRIVATE_KEY_PEM: &str = include_str!("../testdata/rogue_rsa_private.pem");

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// `gateway_name = "foo"`, RS256 only, no skew.
pub fn test_config() -> AuthConfig {
    AuthConfig::new(GATEWAY)
        .with_allowed_algorithms(SigningAlgorithm::RS256.into())
        .with_clock_skew(0)
}

/// Sign `claims` with an RSA private key, `kid` set to the gateway name.
pub fn sign(claims: &Value, alg: Algorithm, private_pem: &str) -> String {
    let mut header = Header::new(alg);
    header.kid = Some(GATEWAY.to_string());
    let key = EncodingKey::from_rsa_pem(private_pem.as_bytes()).expect("fixture key");
    jsonwebtoken::encode(&header, claims, &key).expect("signing failed")
}

/// Hand-assemble a token with an arbitrary header and a junk signature.
pub fn encode_unsigned(header: &Value, claims: &Value) -> String {
    format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string()),
        URL_SAFE_NO_PAD.encode(b"not-a-signature"),
    )
}

/// Table store holding `(bk-apigateway, foo) -> GATEWAY_PUBLIC_KEY_PEM`.
pub fn table_store_with_gateway_key() -> (KeyStore, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let table = TableKeyStore::open(&dir.path().join("keys.redb"), ISSUER).expect("open table");
    table
        .upsert(GATEWAY, GATEWAY_PUBLIC_KEY_PEM, ISSUER)
        .expect("seed key");
    (KeyStore::table(table), dir)
}

/// Secret store pointed at a mock API, mapping the test issuer.
pub fn secret_store(server: &MockServer) -> KeyStore {
    let mapping = HashMap::from([(ISSUER.to_string(), "apigw-public-keys".to_string())]);
    let store = SecretKeyStore::new(
        Url::parse(&server.uri()).expect("mock url"),
        "apigw",
        mapping,
        ISSUER,
    )
    .expect("secret store");
    KeyStore::secret(store)
}
