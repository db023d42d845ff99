// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authenticated principal attached to each request.
//!
//! Building a principal is pure: the same claims and gateway name always
//! produce an equal [`AuthResult`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use super::claims::{AppClaim, UserClaim, ValidatedClaims};

/// The gateway the application is registered against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Gateway {
    pub name: String,
}

/// The calling application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct App {
    pub bk_app_code: String,
    pub verified: bool,
}

/// The end user, possibly anonymous.
///
/// `verified` and `anonymous` are independent: a token may carry a username
/// the gateway did not verify. Handlers decide whether to trust it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub username: String,
    pub verified: bool,
    pub anonymous: bool,
}

impl User {
    pub fn anonymous() -> Self {
        Self {
            username: String::new(),
            verified: false,
            anonymous: true,
        }
    }
}

impl Default for User {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl From<Option<&AppClaim>> for App {
    fn from(claim: Option<&AppClaim>) -> Self {
        claim
            .map(|c| App {
                bk_app_code: c.bk_app_code.clone(),
                verified: c.verified,
            })
            .unwrap_or_default()
    }
}

impl From<Option<&UserClaim>> for User {
    fn from(claim: Option<&UserClaim>) -> Self {
        match claim {
            Some(c) => User {
                username: c.username.clone(),
                verified: c.verified,
                anonymous: c.username.is_empty(),
            },
            None => User::anonymous(),
        }
    }
}

/// Normalized authentication result, stored in request extensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AuthResult {
    pub gateway: Gateway,
    pub app: App,
    pub user: User,
    /// Full decoded claim set
    #[schema(value_type = Object)]
    pub payload: Map<String, Value>,
}

impl AuthResult {
    /// Result installed when the exemption switch is on: unverified app,
    /// anonymous user, no claims.
    pub fn exempt(gateway_name: &str) -> Self {
        Self {
            gateway: Gateway {
                name: gateway_name.to_string(),
            },
            app: App::default(),
            user: User::anonymous(),
            payload: Map::new(),
        }
    }
}

/// Build the principal from verified claims.
///
/// The gateway name comes from configuration, never from the token's `iss`.
pub fn build_auth_result(claims: ValidatedClaims, gateway_name: &str) -> AuthResult {
    AuthResult {
        gateway: Gateway {
            name: gateway_name.to_string(),
        },
        app: App::from(claims.app.as_ref()),
        user: User::from(claims.user.as_ref()),
        payload: claims.payload,
    }
}
