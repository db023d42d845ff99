// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! apigw-jwt-auth - Authentication for API-gateway-issued JWTs
//!
//! The gateway signs a JWT per forwarded request and passes it in
//! `X-Bkapi-JWT`. This crate verifies it against the gateway's RSA public key
//! and attaches the resolved gateway, app and user identity to the request.
//!
//! ## Modules
//!
//! - `api` - HTTP routes for the demo service (Axum)
//! - `auth` - Token verification, principal building, filter and extractors
//! - `config` - Settings loaded once from the environment
//! - `keystore` - Public key storage (embedded table or cluster secrets)

pub mod api;
pub mod auth;
pub mod config;
pub mod keystore;
pub mod state;

#[cfg(test)]
mod testutil;
