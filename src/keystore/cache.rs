// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! LRU cache for public key lookups.
//!
//! Entries are keyed by `(issuer, gateway_name)` and expire lazily after a
//! short TTL, so a refreshed key becomes visible within that window.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

/// Cached entry: PEM + insertion timestamp.
struct CacheEntry {
    pem: String,
    inserted_at: Instant,
}

/// In-process LRU cache for hot public keys.
pub struct KeyCache {
    cache: Mutex<LruCache<(String, String), CacheEntry>>,
    ttl: Duration,
}

impl KeyCache {
    /// Create a new cache with the given capacity and TTL.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            ttl,
        }
    }

    /// Returns `None` if not cached or expired.
    pub fn get(&self, issuer: &str, gateway_name: &str) -> Option<String> {
        let key = (issuer.to_string(), gateway_name.to_string());
        let mut cache = self.cache.lock().ok()?;
        if let Some(entry) = cache.get(&key) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.pem.clone());
            }
            // Expired
            cache.pop(&key);
        }
        None
    }

    pub fn put(&self, issuer: &str, gateway_name: &str, pem: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(
                (issuer.to_string(), gateway_name.to_string()),
                CacheEntry {
                    pem: pem.to_string(),
                    inserted_at: Instant::now(),
                },
            );
        }
    }

    pub fn invalidate(&self, issuer: &str, gateway_name: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.pop(&(issuer.to_string(), gateway_name.to_string()));
        }
    }
}
