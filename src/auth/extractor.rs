// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for the attached authentication result.
//!
//! Use the `JwtAuth` extractor in handlers behind the auth filter:
//!
//! ```rust,ignore
//! async fn my_handler(JwtAuth(auth): JwtAuth) -> impl IntoResponse {
//!     // auth.app.bk_app_code, auth.user.username, ...
//! }
//! ```

use axum::{extract::FromRequestParts, http::request::Parts};

use super::{AuthError, AuthResult};

/// The [`AuthResult`] stored by the auth filter.
///
/// Rejects with `missing_token` when the filter did not run for this route.
pub struct JwtAuth(pub AuthResult);

impl<S> FromRequestParts<S> for JwtAuth
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthResult>()
            .cloned()
            .map(JwtAuth)
            .ok_or(AuthError::MissingToken)
    }
}

/// Optional variant for routes that serve anonymous callers too.
pub struct OptionalJwtAuth(pub Option<AuthResult>);

impl<S> FromRequestParts<S> for OptionalJwtAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalJwtAuth(parts.extensions.get::<AuthResult>().cloned()))
    }
}
