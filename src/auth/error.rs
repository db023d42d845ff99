// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Authentication error type.
///
/// Every variant maps to a stable `reason` code returned to the client.
/// Only [`AuthError::KeyLookup`] produces a 5xx response.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No `X-Bkapi-JWT` header present
    #[error("gateway token header is required")]
    MissingToken,
    /// Token could not be parsed
    #[error("token is malformed: {0}")]
    MalformedToken(String),
    /// Token exceeds the configured size cap
    #[error("token is {size} bytes, limit is {limit}")]
    TokenTooLarge { size: usize, limit: usize },
    /// Token carries no `iss` claim
    #[error("token has no issuer")]
    MissingIssuer,
    /// No public key is stored for the token's issuer
    #[error("no public key for issuer '{issuer}'")]
    UnknownIssuer { issuer: String },
    /// Header `alg` is not in the allow-list
    #[error("algorithm '{0}' is not allowed")]
    AlgorithmNotAllowed(String),
    /// Signature verification failed
    #[error("token signature is invalid")]
    BadSignature,
    /// `exp` is in the past beyond the allowed skew
    #[error("token has expired")]
    TokenExpired,
    /// Key store transport failure or timeout
    #[error("public key lookup failed: {0}")]
    KeyLookup(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    reason: &'static str,
}

impl AuthError {
    /// Stable reason code for client logs.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing_token",
            AuthError::MalformedToken(_) | AuthError::TokenTooLarge { .. } => "malformed_token",
            AuthError::MissingIssuer | AuthError::UnknownIssuer { .. } => "unknown_issuer",
            AuthError::AlgorithmNotAllowed(_) => "algorithm_not_allowed",
            AuthError::BadSignature => "bad_signature",
            AuthError::TokenExpired => "expired_token",
            AuthError::KeyLookup(_) => "key_lookup_failed",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::KeyLookup(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::FORBIDDEN,
        }
    }

    /// Whether the client may retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::KeyLookup(_))
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = Json(AuthErrorBody {
            reason: self.reason(),
        });
        (self.status_code(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(err: AuthError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn missing_token_returns_403_with_reason() {
        let (status, body) = body_of(AuthError::MissingToken).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, serde_json::json!({ "reason": "missing_token" }));
    }

    #[tokio::test]
    async fn key_lookup_returns_500_without_detail() {
        let (status, body) =
            body_of(AuthError::KeyLookup("connection refused at 10.0.0.1".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, serde_json::json!({ "reason": "key_lookup_failed" }));
    }

    #[test]
    fn reason_taxonomy_is_stable() {
        let cases = [
            (AuthError::MissingToken, "missing_token"),
            (AuthError::MalformedToken("x".into()), "malformed_token"),
            (AuthError::TokenTooLarge { size: 9000, limit: 8192 }, "malformed_token"),
            (AuthError::MissingIssuer, "unknown_issuer"),
            (AuthError::UnknownIssuer { issuer: "x".into() }, "unknown_issuer"),
            (AuthError::AlgorithmNotAllowed("HS256".into()), "algorithm_not_allowed"),
            (AuthError::BadSignature, "bad_signature"),
            (AuthError::TokenExpired, "expired_token"),
        ];
        for (err, reason) in cases {
            assert_eq!(err.reason(), reason);
            assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn only_key_lookup_is_retryable() {
        assert!(AuthError::KeyLookup("timeout".into()).is_retryable());
    }
}
