// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use crate::auth::AuthFilter;
use crate::keystore::KeyStore;

#[derive(Clone)]
pub struct AppState {
    pub filter: AuthFilter,
}

impl AppState {
    pub fn new(filter: AuthFilter) -> Self {
        Self { filter }
    }

    pub fn key_store(&self) -> &KeyStore {
        self.filter.key_store()
    }

    pub fn gateway_name(&self) -> &str {
        &self.filter.config().gateway_name
    }
}
