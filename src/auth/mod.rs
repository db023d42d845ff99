// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Verifies JWTs minted by the API gateway and exposes the caller identity
//! to handlers.
//!
//! ## Auth Flow
//!
//! 1. The gateway forwards the request with `X-Bkapi-JWT: <token>`
//! 2. [`AuthFilter`] reads the header (optional `Bearer ` prefix)
//! 3. [`TokenDecoder`]:
//!    - reads `iss` from the unverified payload to pick a key
//!    - checks `alg` against the RSA-only allow-list
//!    - fetches the PEM for `(iss, gateway_name)` from the key store
//!    - verifies the signature, then `exp` with the configured skew
//! 4. [`build_auth_result`] derives gateway, app and user principals
//! 5. The [`AuthResult`] is stored in request extensions; handlers read it
//!    with [`JwtAuth`]
//!
//! ## Failures
//!
//! Token problems deny with 403 and a stable `reason`. Key store failures
//! and timeouts answer 500 so the caller can retry.

pub mod algorithm;
pub mod claims;
pub mod decoder;
pub mod error;
pub mod extractor;
pub mod middleware;
pub mod principal;

pub use algorithm::{AllowedAlgorithms, SigningAlgorithm};
pub use claims::{AppClaim, UserClaim, ValidatedClaims};
pub use decoder::TokenDecoder;
pub use error::AuthError;
pub use extractor::{JwtAuth, OptionalJwtAuth};
pub use middleware::{jwt_auth_middleware, AuthFilter, JWT_HEADER};
pub use principal::{build_auth_result, App, AuthResult, Gateway, User};
