// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Public keys held in cluster secrets.
//!
//! ## Layout
//!
//! ```text
//! namespace/<secret name for issuer>
//!   data:
//!     <gateway_name>: base64(PEM)
//! ```
//!
//! The issuer → secret name mapping comes from configuration. A 404 from the
//! API, an issuer without a mapping, or a secret without the gateway's entry
//! all mean "not found". Every other failure is a [`KeyStoreError`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64ct::{Base64, Encoding};
use reqwest::{header::CONTENT_TYPE, Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::{validate_public_key_pem, KeyStoreError};
use crate::config::SecretStoreConfig;

const MERGE_PATCH: &str = "application/merge-patch+json";

#[derive(Debug, Deserialize)]
struct SecretObject {
    #[serde(default)]
    data: HashMap<String, String>,
}

/// Public key store on the cluster Secret API.
#[derive(Clone)]
pub struct SecretKeyStore {
    http: Client,
    api_url: Url,
    namespace: String,
    issuer_to_secret_name: Arc<HashMap<String, String>>,
    bearer_token: Option<String>,
    default_issuer: String,
}

impl SecretKeyStore {
    pub fn new(
        api_url: Url,
        namespace: impl Into<String>,
        issuer_to_secret_name: HashMap<String, String>,
        default_issuer: impl Into<String>,
    ) -> Result<Self, KeyStoreError> {
        let http = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self::with_client(
            http,
            api_url,
            namespace,
            issuer_to_secret_name,
            default_issuer,
        ))
    }

    fn with_client(
        http: Client,
        api_url: Url,
        namespace: impl Into<String>,
        issuer_to_secret_name: HashMap<String, String>,
        default_issuer: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_url,
            namespace: namespace.into(),
            issuer_to_secret_name: Arc::new(issuer_to_secret_name),
            bearer_token: None,
            default_issuer: default_issuer.into(),
        }
    }

    /// Build from configuration, loading the service account token and CA
    /// bundle when they exist on disk.
    pub fn from_config(
        config: &SecretStoreConfig,
        default_issuer: impl Into<String>,
    ) -> Result<Self, KeyStoreError> {
        let mut builder = Client::builder().timeout(Duration::from_secs(10));
        if let Ok(ca) = std::fs::read(&config.ca_path) {
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&ca)?);
        }
        let mut store = Self::with_client(
            builder.build()?,
            config.api_url.clone(),
            config.namespace.clone(),
            config.issuer_to_secret_name.clone(),
            default_issuer,
        );
        match std::fs::read_to_string(&config.token_path) {
            Ok(token) => store.bearer_token = Some(token.trim().to_string()),
            Err(e) => tracing::warn!(
                path = %config.token_path.display(),
                error = %e,
                "No service account token; secret API calls will be anonymous"
            ),
        }
        Ok(store)
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn default_issuer(&self) -> &str {
        &self.default_issuer
    }

    pub fn secret_name(&self, issuer: &str) -> Option<&str> {
        self.issuer_to_secret_name.get(issuer).map(String::as_str)
    }

    fn url(&self, segments: &[&str]) -> Result<Url, KeyStoreError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| KeyStoreError::InvalidConfig(format!("'{}' cannot be a base URL", self.api_url)))?
            .pop_if_empty()
            .extend(["api", "v1", "namespaces", self.namespace.as_str(), "secrets"])
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    pub(crate) async fn get(
        &self,
        gateway_name: &str,
        issuer: &str,
    ) -> Result<Option<String>, KeyStoreError> {
        let Some(secret_name) = self.secret_name(issuer) else {
            tracing::debug!(issuer, "No secret mapped for issuer");
            return Ok(None);
        };

        let response = self
            .authorize(self.http.get(self.url(&[secret_name])?))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(unexpected(response).await);
        }

        let secret: SecretObject = response.json().await?;
        let Some(encoded) = secret.data.get(gateway_name) else {
            return Ok(None);
        };
        let bytes = Base64::decode_vec(encoded.trim())
            .map_err(|e| KeyStoreError::InvalidKey(format!("secret data is not base64: {e}")))?;
        let pem = String::from_utf8(bytes)
            .map_err(|e| KeyStoreError::InvalidKey(format!("secret data is not UTF-8: {e}")))?;
        Ok(Some(pem))
    }

    /// Merge the key into the issuer's secret, creating the secret if needed.
    pub(crate) async fn set(
        &self,
        gateway_name: &str,
        public_key: &str,
        issuer: &str,
    ) -> Result<(), KeyStoreError> {
        validate_public_key_pem(public_key)?;
        let secret_name = self
            .secret_name(issuer)
            .ok_or_else(|| KeyStoreError::UnmappedIssuer(issuer.to_string()))?;
        let encoded = Base64::encode_string(public_key.as_bytes());

        let patch = json!({ "data": { gateway_name: encoded } });
        let response = self
            .authorize(self.http.patch(self.url(&[secret_name])?))
            .header(CONTENT_TYPE, MERGE_PATCH)
            .body(serde_json::to_vec(&patch)?)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            let secret = json!({
                "apiVersion": "v1",
                "kind": "Secret",
                "type": "Opaque",
                "metadata": { "name": secret_name, "namespace": self.namespace },
                "data": { gateway_name: encoded },
            });
            let response = self
                .authorize(self.http.post(self.url(&[])?))
                .json(&secret)
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(unexpected(response).await);
            }
        } else if !response.status().is_success() {
            return Err(unexpected(response).await);
        }

        tracing::info!(
            issuer,
            gateway_name,
            secret = secret_name,
            namespace = %self.namespace,
            "Stored gateway public key in secret"
        );
        Ok(())
    }
}

async fn unexpected(response: reqwest::Response) -> KeyStoreError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    KeyStoreError::UnexpectedStatus { status, body }
}
