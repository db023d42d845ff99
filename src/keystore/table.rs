// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Durable public key table backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `public_keys`: `(issuer, gateway_name)` → serialized [`PublicKeyRecord`]
//!
//! The composite key is unique. Rows are upserted by the key refresher and
//! never deleted here. A write transaction replaces a row atomically, so
//! concurrent readers see either the old or the new PEM.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use super::{validate_public_key_pem, KeyStoreError};

/// `(issuer, gateway_name)` → PublicKeyRecord (JSON bytes).
const PUBLIC_KEYS: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("public_keys");

/// Column width of `issuer` and `gateway_name`.
pub const MAX_KEY_FIELD_LEN: usize = 128;

/// One stored public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyRecord {
    pub issuer: String,
    pub gateway_name: String,
    /// PEM-encoded RSA public key
    pub public_key: String,
    /// Advances on every upsert
    pub updated_at: DateTime<Utc>,
}

/// Public key store on an embedded table.
#[derive(Clone)]
pub struct TableKeyStore {
    db: Arc<Database>,
    default_issuer: String,
}

impl TableKeyStore {
    /// Open (or create) the key table at the given path.
    pub fn open(path: &Path, default_issuer: impl Into<String>) -> Result<Self, KeyStoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create the table so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(PUBLIC_KEYS)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(db),
            default_issuer: default_issuer.into(),
        })
    }

    pub fn default_issuer(&self) -> &str {
        &self.default_issuer
    }

    /// Point lookup of one row.
    pub fn get_record(
        &self,
        gateway_name: &str,
        issuer: &str,
    ) -> Result<Option<PublicKeyRecord>, KeyStoreError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PUBLIC_KEYS)?;
        match table.get((issuer, gateway_name))? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Insert or replace the row for `(issuer, gateway_name)`.
    ///
    /// `updated_at` never moves backwards for a row, even if the wall clock does.
    pub fn upsert(
        &self,
        gateway_name: &str,
        public_key: &str,
        issuer: &str,
    ) -> Result<PublicKeyRecord, KeyStoreError> {
        check_field("issuer", issuer)?;
        check_field("gateway_name", gateway_name)?;
        validate_public_key_pem(public_key)?;

        let write_txn = self.db.begin_write()?;
        let record = {
            let mut table = write_txn.open_table(PUBLIC_KEYS)?;
            let previous: Option<PublicKeyRecord> = match table.get((issuer, gateway_name))? {
                Some(value) => Some(serde_json::from_slice(value.value())?),
                None => None,
            };

            let now = Utc::now();
            let updated_at = match previous {
                Some(prev) if prev.updated_at >= now => prev.updated_at + Duration::microseconds(1),
                _ => now,
            };

            let record = PublicKeyRecord {
                issuer: issuer.to_string(),
                gateway_name: gateway_name.to_string(),
                public_key: public_key.to_string(),
                updated_at,
            };
            let json = serde_json::to_vec(&record)?;
            table.insert((issuer, gateway_name), json.as_slice())?;
            record
        };
        write_txn.commit()?;

        tracing::info!(
            issuer = %record.issuer,
            gateway_name = %record.gateway_name,
            updated_at = %record.updated_at,
            "Stored gateway public key"
        );
        Ok(record)
    }

    /// All stored rows, ordered by `(issuer, gateway_name)`.
    pub fn records(&self) -> Result<Vec<PublicKeyRecord>, KeyStoreError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PUBLIC_KEYS)?;
        let mut records = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            records.push(serde_json::from_slice(value.value())?);
        }
        Ok(records)
    }

    pub(crate) async fn get(
        &self,
        gateway_name: &str,
        issuer: &str,
    ) -> Result<Option<String>, KeyStoreError> {
        let store = self.clone();
        let (gateway_name, issuer) = (gateway_name.to_string(), issuer.to_string());
        let record = tokio::task::spawn_blocking(move || store.get_record(&gateway_name, &issuer))
            .await
            .map_err(|e| KeyStoreError::Task(e.to_string()))??;
        Ok(record.map(|r| r.public_key))
    }

    pub(crate) async fn set(
        &self,
        gateway_name: &str,
        public_key: &str,
        issuer: &str,
    ) -> Result<(), KeyStoreError> {
        let store = self.clone();
        let (gateway_name, public_key, issuer) = (
            gateway_name.to_string(),
            public_key.to_string(),
            issuer.to_string(),
        );
        tokio::task::spawn_blocking(move || store.upsert(&gateway_name, &public_key, &issuer))
            .await
            .map_err(|e| KeyStoreError::Task(e.to_string()))??;
        Ok(())
    }
}

fn check_field(name: &'static str, value: &str) -> Result<(), KeyStoreError> {
    if value.is_empty() || value.chars().count() > MAX_KEY_FIELD_LEN {
        return Err(KeyStoreError::InvalidField {
            field: name,
            reason: format!("must be 1 to {MAX_KEY_FIELD_LEN} characters"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{GATEWAY_PUBLIC_KEY_PEM, ISSUER};
    use tempfile::TempDir;

    fn open_store() -> (TableKeyStore, TempDir) {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = TableKeyStore::open(&dir.path().join("keys.redb"), ISSUER).unwrap();
        (store, dir)
    }

    #[test]
    fn missing_row_is_none() {
        let (store, _dir) = open_store();
        assert!(store.get_record("foo", ISSUER).unwrap().is_none());
    }

    #[test]
    fn upsert_then_point_lookup() {
        let (store, _dir) = open_store();
        store.upsert("foo", GATEWAY_PUBLIC_KEY_PEM, ISSUER).unwrap();

        let record = store.get_record("foo", ISSUER).unwrap().unwrap();
        assert_eq!(record.public_key, GATEWAY_PUBLIC_KEY_PEM);
        assert_eq!(record.gateway_name, "foo");
        // Same gateway under another issuer is a different row
        assert!(store.get_record("foo", "other").unwrap().is_none());
    }

    #[test]
    fn upsert_replaces_and_advances_updated_at() {
        let (store, _dir) = open_store();
        let first = store.upsert("foo", GATEWAY_PUBLIC_KEY_PEM, ISSUER).unwrap();
        let second = store.upsert("foo", GATEWAY_PUBLIC_KEY_PEM, ISSUER).unwrap();
        assert!(second.updated_at > first.updated_at);
        assert_eq!(store.records().unwrap().len(), 1);
    }

    #[test]
    fn rejects_oversized_fields_and_bad_pem() {
        let (store, _dir) = open_store();
        let long = "g".repeat(MAX_KEY_FIELD_LEN + 1);
        assert!(matches!(
            store.upsert(&long, GATEWAY_PUBLIC_KEY_PEM, ISSUER),
            Err(KeyStoreError::InvalidField { field: "gateway_name", .. })
        ));
        assert!(matches!(
            store.upsert("foo", "not a pem", ISSUER),
            Err(KeyStoreError::InvalidKey(_))
        ));
    }

    #[test]
    fn records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("keys.redb");
        {
            let store = TableKeyStore::open(&path, ISSUER).unwrap();
            store.upsert("foo", GATEWAY_PUBLIC_KEY_PEM, ISSUER).unwrap();
        }
        let store = TableKeyStore::open(&path, ISSUER).unwrap();
        assert!(store.get_record("foo", ISSUER).unwrap().is_some());
    }

    #[tokio::test]
    async fn async_get_and_set() {
        let (store, _dir) = open_store();
        assert_eq!(store.get("foo", ISSUER).await.unwrap(), None);
        store.set("foo", GATEWAY_PUBLIC_KEY_PEM, ISSUER).await.unwrap();
        assert_eq!(
            store.get("foo", ISSUER).await.unwrap().as_deref(),
            Some(GATEWAY_PUBLIC_KEY_PEM)
        );
    }
}
