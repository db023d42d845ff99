// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Public Key Refresher
//!
//! Background task that keeps the key store in sync with the gateway.
//!
//! ## Strategy
//!
//! Every `interval` (default 300 s) the refresher:
//! 1. Calls `GET {gateway_api_url}/api/v1/apis/{gateway_name}/public_key/`,
//!    authenticating with the application's code and secret.
//! 2. Upserts the returned PEM under the returned issuer, or the default
//!    issuer when the gateway does not say.
//!
//! Failures are logged and retried on the next tick; the previously stored
//! key stays in place.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use super::{KeyStore, KeyStoreError};
use crate::config::RefreshConfig;

const AUTHORIZATION_HEADER: &str = "X-Bkapi-Authorization";

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("gateway request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("gateway returned HTTP {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("gateway response was invalid: {0}")]
    InvalidResponse(String),

    #[error("storing public key failed: {0}")]
    Store(#[from] KeyStoreError),
}

#[derive(Debug, Deserialize)]
struct PublicKeyResponse {
    data: Option<PublicKeyData>,
}

#[derive(Debug, Deserialize)]
struct PublicKeyData {
    public_key: Option<String>,
    #[serde(default)]
    issuer: Option<String>,
}

/// A key fetched and stored by one refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedKey {
    pub issuer: String,
    pub gateway_name: String,
}

/// Pulls the gateway's public key and upserts it into the key store.
pub struct KeyRefresher {
    config: RefreshConfig,
    key_store: KeyStore,
    http: Client,
}

impl KeyRefresher {
    pub fn new(config: RefreshConfig, key_store: KeyStore) -> Result<Self, RefreshError> {
        let http = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            config,
            key_store,
            http,
        })
    }

    fn endpoint(&self) -> Result<Url, RefreshError> {
        let mut url = self.config.gateway_api_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                RefreshError::InvalidResponse(format!(
                    "'{}' cannot be a base URL",
                    self.config.gateway_api_url
                ))
            })?
            .pop_if_empty()
            .extend(["api", "v1", "apis", self.config.gateway_name.as_str(), "public_key", ""]);
        Ok(url)
    }

    /// Fetch and store the key once.
    pub async fn refresh_once(&self) -> Result<RefreshedKey, RefreshError> {
        let credentials = json!({
            "bk_app_code": self.config.app_code,
            "bk_app_secret": self.config.app_secret,
        });

        let response = self
            .http
            .get(self.endpoint()?)
            .header(AUTHORIZATION_HEADER, credentials.to_string())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RefreshError::UnexpectedStatus { status, body });
        }

        let body: PublicKeyResponse = response
            .json()
            .await
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;
        let data = body
            .data
            .ok_or_else(|| RefreshError::InvalidResponse("missing data".to_string()))?;
        let public_key = data
            .public_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| RefreshError::InvalidResponse("missing public_key".to_string()))?;
        let issuer = data
            .issuer
            .filter(|i| !i.is_empty())
            .unwrap_or_else(|| self.config.default_issuer.clone());

        self.key_store
            .set(&self.config.gateway_name, &public_key, Some(&issuer))
            .await?;

        Ok(RefreshedKey {
            issuer,
            gateway_name: self.config.gateway_name.clone(),
        })
    }

    /// Run the refresh loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(refresher.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            gateway_name = %self.config.gateway_name,
            interval_secs = self.config.interval.as_secs(),
            "Public key refresher starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Public key refresher shutting down");
                return;
            }

            match self.refresh_once().await {
                Ok(key) => info!(
                    issuer = %key.issuer,
                    gateway_name = %key.gateway_name,
                    "Public key refreshed"
                ),
                Err(e) => warn!(
                    gateway_name = %self.config.gateway_name,
                    error = %e,
                    "Public key refresh failed, will retry"
                ),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Public key refresher shutting down");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::TableKeyStore;
    use crate::testutil::{GATEWAY_PUBLIC_KEY_PEM, ISSUER};
    use tempfile::TempDir;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn refresher(server: &MockServer, store: KeyStore) -> KeyRefresher {
        let config = RefreshConfig {
            gateway_api_url: Url::parse(&format!("{}/prod", server.uri())).unwrap(),
            gateway_name: "foo".into(),
            default_issuer: ISSUER.into(),
            app_code: "demo".into(),
            app_secret: "s3cret".into(),
            interval: Duration::from_millis(10),
        };
        KeyRefresher::new(config, store).unwrap()
    }

    fn table_store(dir: &TempDir) -> KeyStore {
        KeyStore::table(TableKeyStore::open(&dir.path().join("keys.redb"), ISSUER).unwrap())
    }

    #[tokio::test]
    async fn refresh_upserts_under_default_issuer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/prod/api/v1/apis/foo/public_key/"))
            .and(header_exists(AUTHORIZATION_HEADER))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "public_key": GATEWAY_PUBLIC_KEY_PEM }
            })))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let store = table_store(&dir);
        let key = refresher(&server, store.clone()).refresh_once().await.unwrap();

        assert_eq!(key.issuer, ISSUER);
        assert_eq!(
            store.get("foo", None).await.unwrap().as_deref(),
            Some(GATEWAY_PUBLIC_KEY_PEM)
        );

        let requests = server.received_requests().await.unwrap();
        let credentials: serde_json::Value = serde_json::from_slice(
            requests[0].headers[AUTHORIZATION_HEADER].as_bytes(),
        )
        .unwrap();
        assert_eq!(
            credentials,
            json!({ "bk_app_code": "demo", "bk_app_secret": "s3cret" })
        );
    }

    #[tokio::test]
    async fn refresh_honors_returned_issuer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "public_key": GATEWAY_PUBLIC_KEY_PEM, "issuer": "apigw-v2" }
            })))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let store = table_store(&dir);
        let key = refresher(&server, store.clone()).refresh_once().await.unwrap();

        assert_eq!(key.issuer, "apigw-v2");
        assert!(store.get("foo", Some("apigw-v2")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn gateway_error_keeps_existing_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let store = table_store(&dir);
        store.set("foo", GATEWAY_PUBLIC_KEY_PEM, None).await.unwrap();

        let err = refresher(&server, store.clone()).refresh_once().await.unwrap_err();
        assert!(matches!(err, RefreshError::UnexpectedStatus { status: 502, .. }));
        assert!(store.get("foo", None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn missing_public_key_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": {} })))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let err = refresher(&server, table_store(&dir))
            .refresh_once()
            .await
            .unwrap_err();
        assert!(matches!(err, RefreshError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn run_stops_on_cancellation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "public_key": GATEWAY_PUBLIC_KEY_PEM }
            })))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let store = table_store(&dir);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(refresher(&server, store.clone()).run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("refresher did not stop")
            .unwrap();

        assert!(store.get("foo", None).await.unwrap().is_some());
    }
}
