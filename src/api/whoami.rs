// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::Json;

use crate::auth::{AuthResult, JwtAuth};

/// Echo the identity resolved from the gateway token.
#[utoipa::path(
    get,
    path = "/v1/whoami",
    tag = "Identity",
    params(
        ("X-Bkapi-JWT" = String, Header, description = "Gateway-issued JWT")
    ),
    responses(
        (status = 200, description = "Resolved caller identity", body = AuthResult),
        (status = 403, description = "Token rejected; body is {\"reason\": code}"),
        (status = 500, description = "Public key lookup failed")
    )
)]
pub async fn whoami(JwtAuth(auth): JwtAuth) -> Json<AuthResult> {
    Json(auth)
}
