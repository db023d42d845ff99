// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Public Key Store
//!
//! Resolves `(issuer, gateway_name)` to the PEM-encoded RSA public key the
//! gateway signs with.
//!
//! ## Backends
//!
//! - [`TableKeyStore`] - durable embedded table (redb)
//! - [`SecretKeyStore`] - cluster secrets, one secret per issuer
//!
//! The backend is chosen once from configuration. [`KeyStore`] adds an
//! optional short-lived cache in front of either.
//!
//! ## Semantics
//!
//! - A missing key is `Ok(None)`, never an error.
//! - Transport and storage failures are `Err(KeyStoreError)`; the request
//!   path turns those into 500 responses.
//! - Only the key refresher writes; the request path only reads.

pub mod cache;
pub mod refresh;
pub mod secret;
pub mod table;

use std::sync::Arc;
use std::time::Duration;

pub use cache::KeyCache;
pub use refresh::KeyRefresher;
pub use secret::SecretKeyStore;
pub use table::{PublicKeyRecord, TableKeyStore};

use crate::config::{KeyStoreBackendConfig, KeyStoreConfig, KeyStoreVariant};

/// Key store errors.
#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("secret API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("secret API returned HTTP {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("invalid public key: {0}")]
    InvalidKey(String),

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("no secret is mapped for issuer '{0}'")]
    UnmappedIssuer(String),

    #[error("invalid key store configuration: {0}")]
    InvalidConfig(String),

    #[error("operation not supported by the {0} key store")]
    Unsupported(KeyStoreVariant),

    #[error("key store task failed: {0}")]
    Task(String),
}

#[derive(Clone)]
enum Backend {
    Table(TableKeyStore),
    Secret(SecretKeyStore),
}

/// Public key lookup capability shared by the filter and the refresher.
///
/// Cheap to clone; clones share the backend and the cache.
#[derive(Clone)]
pub struct KeyStore {
    backend: Backend,
    cache: Option<Arc<KeyCache>>,
}

impl KeyStore {
    pub fn table(store: TableKeyStore) -> Self {
        Self {
            backend: Backend::Table(store),
            cache: None,
        }
    }

    pub fn secret(store: SecretKeyStore) -> Self {
        Self {
            backend: Backend::Secret(store),
            cache: None,
        }
    }

    /// Cache hits for `ttl`. A zero TTL disables caching.
    pub fn with_cache(mut self, ttl: Duration, capacity: usize) -> Self {
        self.cache = (!ttl.is_zero()).then(|| Arc::new(KeyCache::new(capacity, ttl)));
        self
    }

    /// Build the configured backend.
    pub fn from_config(config: &KeyStoreConfig) -> Result<Self, KeyStoreError> {
        let store = match &config.backend {
            KeyStoreBackendConfig::Table { db_path } => {
                Self::table(TableKeyStore::open(db_path, config.default_issuer.clone())?)
            }
            KeyStoreBackendConfig::Secret(secret) => Self::secret(SecretKeyStore::from_config(
                secret,
                config.default_issuer.clone(),
            )?),
        };
        Ok(store.with_cache(config.cache_ttl, config.cache_capacity))
    }

    pub fn variant(&self) -> KeyStoreVariant {
        match self.backend {
            Backend::Table(_) => KeyStoreVariant::Table,
            Backend::Secret(_) => KeyStoreVariant::Secret,
        }
    }

    pub fn default_issuer(&self) -> &str {
        match &self.backend {
            Backend::Table(store) => store.default_issuer(),
            Backend::Secret(store) => store.default_issuer(),
        }
    }

    /// Look up the PEM for `gateway_name` under `issuer` (or the default issuer).
    pub async fn get(
        &self,
        gateway_name: &str,
        issuer: Option<&str>,
    ) -> Result<Option<String>, KeyStoreError> {
        let issuer = issuer.unwrap_or_else(|| self.default_issuer());

        if let Some(pem) = self.cache.as_ref().and_then(|c| c.get(issuer, gateway_name)) {
            return Ok(Some(pem));
        }

        let pem = match &self.backend {
            Backend::Table(store) => store.get(gateway_name, issuer).await?,
            Backend::Secret(store) => store.get(gateway_name, issuer).await?,
        };

        // Misses are not cached so a freshly stored key shows up immediately.
        if let (Some(cache), Some(pem)) = (&self.cache, &pem) {
            cache.put(issuer, gateway_name, pem);
        }
        Ok(pem)
    }

    /// Upsert the PEM for `gateway_name` under `issuer` (or the default issuer).
    pub async fn set(
        &self,
        gateway_name: &str,
        public_key: &str,
        issuer: Option<&str>,
    ) -> Result<(), KeyStoreError> {
        let issuer = issuer.unwrap_or_else(|| self.default_issuer());
        let result = match &self.backend {
            Backend::Table(store) => store.set(gateway_name, public_key, issuer).await,
            Backend::Secret(store) => store.set(gateway_name, public_key, issuer).await,
        };
        if let Some(cache) = &self.cache {
            match &result {
                Ok(()) => cache.put(issuer, gateway_name, public_key),
                Err(_) => cache.invalidate(issuer, gateway_name),
            }
        }
        result
    }

    /// Every stored row. Only the table backend can enumerate.
    pub async fn list(&self) -> Result<Vec<PublicKeyRecord>, KeyStoreError> {
        match &self.backend {
            Backend::Table(store) => {
                let store = store.clone();
                tokio::task::spawn_blocking(move || store.records())
                    .await
                    .map_err(|e| KeyStoreError::Task(e.to_string()))?
            }
            Backend::Secret(_) => Err(KeyStoreError::Unsupported(KeyStoreVariant::Secret)),
        }
    }
}

/// Check that `pem` holds a single public key block.
pub fn validate_public_key_pem(pem: &str) -> Result<(), KeyStoreError> {
    let parsed = pem::parse(pem.trim()).map_err(|e| KeyStoreError::InvalidKey(e.to_string()))?;
    match parsed.tag() {
        "PUBLIC KEY" | "RSA PUBLIC KEY" => Ok(()),
        other => Err(KeyStoreError::InvalidKey(format!(
            "expected a PUBLIC KEY block, found {other}"
        ))),
    }
}
