// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Claims carried by gateway tokens.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::algorithm::SigningAlgorithm;
use super::error::AuthError;

/// The `app` claim: the application that called the gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppClaim {
    #[serde(default, deserialize_with = "null_as_default")]
    pub bk_app_code: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub verified: bool,
}

/// The `user` claim: the end user on whose behalf the app called, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserClaim {
    #[serde(default, deserialize_with = "null_as_default")]
    pub username: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub verified: bool,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Claims of a token whose signature has been verified.
///
/// Only [`TokenDecoder`](super::decoder::TokenDecoder) produces these from
/// wire data; nothing read from a token is exposed before that.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedClaims {
    /// Issuer (`iss`)
    pub iss: String,
    /// Expiry, seconds since the epoch (`exp`)
    pub exp: i64,
    pub app: Option<AppClaim>,
    pub user: Option<UserClaim>,
    /// Algorithm the signature was verified with
    pub algorithm: SigningAlgorithm,
    /// Header `kid`, if the gateway sent one
    pub key_id: Option<String>,
    /// Full decoded claim set, unknown claims included
    pub payload: Map<String, Value>,
}

impl ValidatedClaims {
    /// Interpret a verified payload.
    pub(crate) fn from_verified(
        payload: Map<String, Value>,
        algorithm: SigningAlgorithm,
        key_id: Option<String>,
    ) -> Result<Self, AuthError> {
        let iss = match payload.get("iss") {
            Some(Value::String(iss)) if !iss.is_empty() => iss.clone(),
            _ => return Err(AuthError::MissingIssuer),
        };

        let exp = payload
            .get("exp")
            .and_then(numeric_date)
            .ok_or_else(|| AuthError::MalformedToken("exp claim missing or not numeric".into()))?;

        let app = optional_claim::<AppClaim>(&payload, "app")?;
        let user = optional_claim::<UserClaim>(&payload, "user")?;

        Ok(Self {
            iss,
            exp,
            app,
            user,
            algorithm,
            key_id,
            payload,
        })
    }
}

/// NumericDate per RFC 7519; fractional seconds are truncated.
fn numeric_date(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
}

fn optional_claim<T>(payload: &Map<String, Value>, name: &str) -> Result<Option<T>, AuthError>
where
    T: for<'de> Deserialize<'de>,
{
    match payload.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| AuthError::MalformedToken(format!("invalid {name} claim: {e}"))),
    }
}
